//! Port traits: the boundary between the device runtime and the hardware.
//!
//! ```text
//!   Device kind ──▶ Port trait ◀── Adapter (ESP-IDF driver / host sim)
//! ```
//!
//! Each peripheral family gets the narrowest interface its device kind
//! needs.  Bit-level protocols (LED-strip framing, display bus timing,
//! sensor registers) live behind these traits, never in the device code.
//! A [`Hardware`] factory hands out port objects by pin or bus id, so
//! every [`Device`](crate::devices::Device) exclusively owns its handles.
//!
//! Any `embedded-hal` 1.0 pin or PWM channel can be used as a port through
//! the [`HalInput`], [`HalOutput`] and [`HalPwm`] wrappers.

use core::future::Future;
use core::pin::Pin;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use crate::error::HalError;

/// Boxed, non-`Send` future; everything runs on one executor thread.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

// ───────────────────────────────────────────────────────────────
// Digital I/O
// ───────────────────────────────────────────────────────────────

/// Pull resistor applied to an input pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

pub trait DigitalInput {
    fn is_high(&mut self) -> Result<bool, HalError>;
}

pub trait DigitalOutput {
    fn set_level(&mut self, high: bool) -> Result<(), HalError>;
}

/// PWM output with a 16-bit duty scale (0 = always low, 65535 = always high).
pub trait PwmOutput {
    fn set_duty_u16(&mut self, duty: u16) -> Result<(), HalError>;
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn is_high(&mut self) -> Result<bool, HalError> {
        (**self).is_high()
    }
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn set_level(&mut self, high: bool) -> Result<(), HalError> {
        (**self).set_level(high)
    }
}

// ───────────────────────────────────────────────────────────────
// Composite peripherals
// ───────────────────────────────────────────────────────────────

/// 8-bit-per-channel colour as written to a pixel strip.
pub type Rgb = (u8, u8, u8);

/// Addressable LED strip (WS2812-style).  `write` latches the whole frame.
pub trait PixelStrip {
    fn write(&mut self, pixels: &[Rgb]) -> Result<(), HalError>;
}

/// Character display controller (HD44780-style instruction set).
pub trait CharacterDisplay {
    /// Run the power-on initialisation sequence.
    fn initialise(&mut self, two_line: bool, show_cursor: bool, blink_cursor: bool) -> Result<(), HalError>;
    fn clear(&mut self) -> Result<(), HalError>;
    /// Move the DDRAM address to `(column, row)`.
    fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), HalError>;
    fn write_char(&mut self, ch: u8) -> Result<(), HalError>;
}

/// Source of raw 5-byte DHT frames: humidity (2), temperature (2), checksum.
pub trait ClimateSensor {
    fn read_frame(&mut self) -> Result<[u8; 5], HalError>;
}

/// Raw algorithm-result block of an air-quality sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AirSample {
    pub eco2: u16,
    pub tvoc: u16,
    pub status: u8,
    pub error_id: u8,
}

/// CCS811-style register interface.
pub trait AirQualitySensor {
    fn sample(&mut self) -> Result<AirSample, HalError>;
    fn status(&mut self) -> Result<u8, HalError>;
    fn error_id(&mut self) -> Result<u8, HalError>;
    fn measure_mode(&mut self) -> Result<u8, HalError>;
    fn set_measure_mode(&mut self, raw: u8) -> Result<(), HalError>;
    fn start_app(&mut self) -> Result<(), HalError>;
    /// Push humidity (%RH) and temperature (°C) compensation data.
    fn set_environment(&mut self, humidity: f32, temperature: f32) -> Result<(), HalError>;
}

/// UART line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartSettings {
    pub uart_id: u8,
    pub baudrate: u32,
    pub tx_pin: Option<u8>,
    pub rx_pin: Option<u8>,
    pub bits: u8,
    pub parity: Option<u8>,
    pub stop_bits: u8,
    pub timeout_ms: u32,
}

pub trait SerialPort {
    /// Returns the number of bytes accepted by the driver.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, HalError>;
}

// ───────────────────────────────────────────────────────────────
// Hardware factory
// ───────────────────────────────────────────────────────────────

/// Hands out exclusively-owned port objects by pin or bus id.
pub trait Hardware {
    fn input(&self, pin: u8, pull: Pull) -> Result<Box<dyn DigitalInput>, HalError>;
    fn output(&self, pin: u8) -> Result<Box<dyn DigitalOutput>, HalError>;
    fn pwm(&self, pin: u8, freq_hz: u32) -> Result<Box<dyn PwmOutput>, HalError>;
    fn pixel_strip(&self, pin: u8, count: usize) -> Result<Box<dyn PixelStrip>, HalError>;
    fn character_display(
        &self,
        register_select: u8,
        enable: u8,
        data: [u8; 4],
    ) -> Result<Box<dyn CharacterDisplay>, HalError>;
    fn climate_sensor(&self, pin: u8) -> Result<Box<dyn ClimateSensor>, HalError>;
    fn air_quality(&self, sda: u8, scl: u8) -> Result<Box<dyn AirQualitySensor>, HalError>;
    fn serial(&self, settings: &UartSettings) -> Result<Box<dyn SerialPort>, HalError>;
    /// The board's status LED, driven by the builtin heartbeat device.
    fn onboard_led(&self) -> Result<Box<dyn DigitalOutput>, HalError>;
}

// ───────────────────────────────────────────────────────────────
// Outbound notifications
// ───────────────────────────────────────────────────────────────

/// Transport for best-effort remote notifications (plain HTTP GET).
pub trait Notifier {
    fn get<'a>(&'a self, host: &'a str, port: u16, path: &'a str) -> LocalBoxFuture<'a, std::io::Result<()>>;
}

// ───────────────────────────────────────────────────────────────
// embedded-hal adapters
// ───────────────────────────────────────────────────────────────

/// Wraps an `embedded-hal` input pin as a [`DigitalInput`].
pub struct HalInput<P> {
    pin: P,
    number: u8,
}

impl<P> HalInput<P> {
    pub fn new(pin: P, number: u8) -> Self {
        Self { pin, number }
    }
}

impl<P: InputPin> DigitalInput for HalInput<P> {
    fn is_high(&mut self) -> Result<bool, HalError> {
        self.pin
            .is_high()
            .map_err(|e| pin_error(self.number, &e))
    }
}

/// Wraps an `embedded-hal` output pin as a [`DigitalOutput`].
pub struct HalOutput<P> {
    pin: P,
    number: u8,
}

impl<P> HalOutput<P> {
    pub fn new(pin: P, number: u8) -> Self {
        Self { pin, number }
    }
}

impl<P: OutputPin> DigitalOutput for HalOutput<P> {
    fn set_level(&mut self, high: bool) -> Result<(), HalError> {
        let res = if high { self.pin.set_high() } else { self.pin.set_low() };
        res.map_err(|e| pin_error(self.number, &e))
    }
}

/// Wraps an `embedded-hal` PWM channel, rescaling the 16-bit duty to the
/// channel's native resolution.
pub struct HalPwm<P> {
    channel: P,
    number: u8,
}

impl<P> HalPwm<P> {
    pub fn new(channel: P, number: u8) -> Self {
        Self { channel, number }
    }
}

impl<P: SetDutyCycle> PwmOutput for HalPwm<P> {
    fn set_duty_u16(&mut self, duty: u16) -> Result<(), HalError> {
        let max = u32::from(self.channel.max_duty_cycle());
        let scaled = (u32::from(duty) * max + u32::from(u16::MAX) / 2) / u32::from(u16::MAX);
        self.channel
            .set_duty_cycle(scaled as u16)
            .map_err(|e| {
                use embedded_hal::pwm::Error as _;
                HalError::Bus(format!("pwm on pin {}: {:?}", self.number, e.kind()))
            })
    }
}

fn pin_error<E: embedded_hal::digital::Error>(pin: u8, e: &E) -> HalError {
    let code = match e.kind() {
        embedded_hal::digital::ErrorKind::Other => -1,
        _ => -2,
    };
    HalError::Pin { pin, code }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    struct FakeChannel {
        max: u16,
        last: u16,
    }

    impl embedded_hal::pwm::ErrorType for FakeChannel {
        type Error = Infallible;
    }

    impl SetDutyCycle for FakeChannel {
        fn max_duty_cycle(&self) -> u16 {
            self.max
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
            self.last = duty;
            Ok(())
        }
    }

    #[test]
    fn pwm_duty_is_rescaled_to_channel_resolution() {
        let mut pwm = HalPwm::new(FakeChannel { max: 255, last: 0 }, 4);
        pwm.set_duty_u16(u16::MAX).unwrap();
        assert_eq!(pwm.channel.last, 255);
        pwm.set_duty_u16(0).unwrap();
        assert_eq!(pwm.channel.last, 0);
        pwm.set_duty_u16(32768).unwrap();
        assert_eq!(pwm.channel.last, 128);
    }
}
