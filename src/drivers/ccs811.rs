//! CCS811 air-quality sensor over I2C.
//!
//! ## Registers
//!
//! | Reg  | Name      | Len | Dir | Contents                                   |
//! |------|-----------|-----|-----|--------------------------------------------|
//! | 0x00 | STATUS    | 1   | R   | fw_mode b7, app_valid b4, ready b3, err b0 |
//! | 0x01 | MEAS_MODE | 1   | R/W | drive mode b6..4, interrupt b3             |
//! | 0x02 | ALG_DATA  | 8   | R   | eCO2, TVOC, status, error id, raw          |
//! | 0x05 | ENV_DATA  | 4   | W   | humidity, temperature (1/512 units)        |
//! | 0xE0 | ERROR_ID  | 1   | R   | error bits 0..5                            |
//! | 0xF4 | APP_START | 0   | W   | leave boot mode                            |
//! | 0xFF | SW_RESET  | 4   | W   | magic sequence returns to boot mode        |

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::app::ports::{AirQualitySensor, AirSample};
use crate::error::HalError;

/// Addresses the sensor can strap to (ADDR pin low / high).
pub const ADDRESSES: [u8; 2] = [0x5A, 0x5B];

const REG_STATUS: u8 = 0x00;
const REG_MEAS_MODE: u8 = 0x01;
const REG_ALG_DATA: u8 = 0x02;
const REG_ENV_DATA: u8 = 0x05;
const REG_ERROR_ID: u8 = 0xE0;
const REG_APP_START: u8 = 0xF4;
const REG_SW_RESET: u8 = 0xFF;

const RESET_SEQUENCE: [u8; 4] = [0x11, 0xE5, 0x72, 0x8A];

/// Settle time after every register write.
const SETTLE_MS: u32 = 100;

pub struct Ccs811<I, D> {
    i2c: I,
    address: u8,
    delay: D,
}

impl<I: I2c, D: DelayNs> Ccs811<I, D> {
    /// Find the sensor on the bus and software-reset it.
    pub fn probe(mut i2c: I, mut delay: D) -> Result<Self, HalError> {
        delay.delay_ms(SETTLE_MS);
        let mut status = [0u8; 1];
        let address = ADDRESSES
            .into_iter()
            .find(|addr| i2c.write_read(*addr, &[REG_STATUS], &mut status).is_ok())
            .ok_or(HalError::NotFound)?;
        log::debug!("CCS811 found at {:#04x}", address);

        let mut sensor = Self { i2c, address, delay };
        sensor.write(REG_SW_RESET, &RESET_SEQUENCE)?;
        Ok(sensor)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn read<const N: usize>(&mut self, reg: u8) -> Result<[u8; N], HalError> {
        let mut buf = [0u8; N];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(|e| bus_error(reg, &e))?;
        Ok(buf)
    }

    fn write(&mut self, reg: u8, data: &[u8]) -> Result<(), HalError> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(data);
        self.i2c.write(self.address, &frame).map_err(|e| bus_error(reg, &e))?;
        self.delay.delay_ms(SETTLE_MS);
        Ok(())
    }
}

impl<I: I2c, D: DelayNs> AirQualitySensor for Ccs811<I, D> {
    fn sample(&mut self) -> Result<AirSample, HalError> {
        let raw: [u8; 8] = self.read(REG_ALG_DATA)?;
        Ok(AirSample {
            eco2: u16::from_be_bytes([raw[0], raw[1]]),
            tvoc: u16::from_be_bytes([raw[2], raw[3]]),
            status: raw[4],
            error_id: raw[5],
        })
    }

    fn status(&mut self) -> Result<u8, HalError> {
        Ok(self.read::<1>(REG_STATUS)?[0])
    }

    fn error_id(&mut self) -> Result<u8, HalError> {
        Ok(self.read::<1>(REG_ERROR_ID)?[0])
    }

    fn measure_mode(&mut self) -> Result<u8, HalError> {
        Ok(self.read::<1>(REG_MEAS_MODE)?[0])
    }

    fn set_measure_mode(&mut self, raw: u8) -> Result<(), HalError> {
        self.write(REG_MEAS_MODE, &[raw])
    }

    fn start_app(&mut self) -> Result<(), HalError> {
        self.write(REG_APP_START, &[])
    }

    fn set_environment(&mut self, humidity: f32, temperature: f32) -> Result<(), HalError> {
        self.write(REG_ENV_DATA, &encode_environment(humidity, temperature))
    }
}

/// Humidity and temperature in 1/512 units; temperature offset by 25 °C.
pub fn encode_environment(humidity: f32, temperature: f32) -> [u8; 4] {
    let hum = (humidity * 512.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    let temp = ((temperature + 25.0) * 512.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    let [h0, h1] = hum.to_be_bytes();
    let [t0, t1] = temp.to_be_bytes();
    [h0, h1, t0, t1]
}

fn bus_error<E: embedded_hal::i2c::Error>(reg: u8, e: &E) -> HalError {
    HalError::Bus(format!("ccs811 register {reg:#04x}: {:?}", e.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    /// Register file answering at one address.
    struct FakeBus {
        address: u8,
        regs: [u8; 256],
        alg: [u8; 8],
        writes: Vec<Vec<u8>>,
    }

    impl FakeBus {
        fn at(address: u8) -> Self {
            Self { address, regs: [0; 256], alg: [0; 8], writes: Vec::new() }
        }
    }

    impl ErrorType for FakeBus {
        type Error = ErrorKind;
    }

    impl I2c for FakeBus {
        fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
            if address != self.address {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            let mut reg = 0u8;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        reg = bytes[0];
                        if bytes.len() > 1 {
                            self.regs[reg as usize] = bytes[1];
                        }
                        self.writes.push(bytes.to_vec());
                    }
                    Operation::Read(buf) if reg == REG_ALG_DATA => {
                        buf.copy_from_slice(&self.alg[..buf.len()]);
                    }
                    Operation::Read(buf) => buf[0] = self.regs[reg as usize],
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn probe_finds_alternate_address_and_resets() {
        let sensor = Ccs811::probe(FakeBus::at(0x5B), NoDelay).unwrap();
        assert_eq!(sensor.address(), 0x5B);
        assert_eq!(sensor.i2c.writes.last().unwrap(), &vec![0xFF, 0x11, 0xE5, 0x72, 0x8A]);
    }

    #[test]
    fn probe_without_sensor_fails() {
        assert!(matches!(Ccs811::probe(FakeBus::at(0x40), NoDelay), Err(HalError::NotFound)));
    }

    #[test]
    fn sample_decodes_big_endian_words() {
        let mut bus = FakeBus::at(0x5A);
        bus.alg = [0x01, 0x90, 0x00, 0x2A, 0x98, 0x00, 0, 0];
        let mut sensor = Ccs811::probe(bus, NoDelay).unwrap();
        let s = sensor.sample().unwrap();
        assert_eq!(s.eco2, 400);
        assert_eq!(s.tvoc, 42);
        assert_eq!(s.status, 0x98);
    }

    #[test]
    fn environment_is_offset_and_scaled() {
        // 50 %RH -> 25600 = 0x6400; 25 °C -> 50 * 512 = 25600
        assert_eq!(encode_environment(50.0, 25.0), [0x64, 0x00, 0x64, 0x00]);
        assert_eq!(encode_environment(0.0, -25.0), [0, 0, 0, 0]);
    }
}
