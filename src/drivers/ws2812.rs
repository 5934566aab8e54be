//! WS2812 pixel strip over the RMT peripheral.
//!
//! Each pixel is sent as 24 bits, green first, MSB first.  A bit is one
//! high/low pulse pair:
//!
//! | Bit | High   | Low    |
//! |-----|--------|--------|
//! | 0   | 350 ns | 800 ns |
//! | 1   | 700 ns | 600 ns |
//!
//! The bit encoding is target-independent; only the transmitter is gated
//! on ESP-IDF.

use crate::app::ports::Rgb;

pub const T0H_NS: u64 = 350;
pub const T0L_NS: u64 = 800;
pub const T1H_NS: u64 = 700;
pub const T1L_NS: u64 = 600;

/// The 24-bit wire word of one pixel.
pub fn grb_word((r, g, b): Rgb) -> u32 {
    (u32::from(g) << 16) | (u32::from(r) << 8) | u32::from(b)
}

/// Bits of a whole frame in transmission order.
pub fn frame_bits(pixels: &[Rgb]) -> impl Iterator<Item = bool> + '_ {
    pixels
        .iter()
        .flat_map(|px| {
            let word = grb_word(*px);
            (0..24).rev().map(move |i| (word >> i) & 1 == 1)
        })
}

#[cfg(target_os = "espidf")]
pub use esp::Ws2812;

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_hal::gpio::AnyOutputPin;
    use esp_idf_hal::rmt::config::TransmitConfig;
    use esp_idf_hal::rmt::{
        CHANNEL0, CHANNEL1, CHANNEL2, CHANNEL3, PinState, Pulse, TxRmtDriver, VariableLengthSignal,
    };

    use super::{T0H_NS, T0L_NS, T1H_NS, T1L_NS, frame_bits};
    use crate::app::ports::{PixelStrip, Rgb};
    use crate::error::HalError;

    fn rmt_error(pin: u8, e: impl core::fmt::Display) -> HalError {
        HalError::Bus(format!("rmt on pin {pin}: {e}"))
    }

    pub struct Ws2812 {
        tx: TxRmtDriver<'static>,
        pin: u8,
        count: usize,
        pulses: [(Pulse, Pulse); 2],
    }

    impl Ws2812 {
        /// Claim RMT channel `channel` (0..=3) for the strip on `pin`.
        pub fn new(channel: u8, pin: u8, count: usize) -> Result<Self, HalError> {
            let config = TransmitConfig::new().clock_divider(1);
            // SAFETY: the caller hands out each channel number once, and the
            // pin is claimed by this strip for the process lifetime.
            let tx = unsafe {
                let out = AnyOutputPin::new(i32::from(pin));
                match channel {
                    0 => TxRmtDriver::new(CHANNEL0::new(), out, &config),
                    1 => TxRmtDriver::new(CHANNEL1::new(), out, &config),
                    2 => TxRmtDriver::new(CHANNEL2::new(), out, &config),
                    3 => TxRmtDriver::new(CHANNEL3::new(), out, &config),
                    _ => return Err(HalError::Bus(format!("no free RMT channel for pin {pin}"))),
                }
            }
            .map_err(|e| rmt_error(pin, e))?;

            let hz = tx.counter_clock().map_err(|e| rmt_error(pin, e))?;
            let pulse = |state, ns| {
                Pulse::new_with_duration(hz, state, &Duration::from_nanos(ns)).map_err(|e| rmt_error(pin, e))
            };
            let zero = (pulse(PinState::High, T0H_NS)?, pulse(PinState::Low, T0L_NS)?);
            let one = (pulse(PinState::High, T1H_NS)?, pulse(PinState::Low, T1L_NS)?);
            Ok(Self { tx, pin, count, pulses: [zero, one] })
        }
    }

    impl PixelStrip for Ws2812 {
        fn write(&mut self, pixels: &[Rgb]) -> Result<(), HalError> {
            let mut signal = VariableLengthSignal::new();
            for bit in frame_bits(&pixels[..pixels.len().min(self.count)]) {
                let (high, low) = &self.pulses[usize::from(bit)];
                signal.push([high, low]).map_err(|e| rmt_error(self.pin, e))?;
            }
            self.tx.start_blocking(&signal).map_err(|e| rmt_error(self.pin, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn green_is_sent_first() {
        assert_eq!(grb_word((0x12, 0x34, 0x56)), 0x34_12_56);
    }

    #[test]
    fn frame_is_msb_first_per_pixel() {
        let bits: Vec<bool> = frame_bits(&[(0, 0x80, 0), (0, 0, 1)]).collect();
        assert_eq!(bits.len(), 48);
        assert!(bits[0]);
        assert_eq!(bits.iter().filter(|b| **b).count(), 2);
        assert!(bits[47]);
    }
}
