//! HD44780 character display driver, 4-bit bus.
//!
//! ## Wiring
//!
//! | Signal | Use                                  |
//! |--------|--------------------------------------|
//! | RS     | 0 = instruction, 1 = data            |
//! | E      | falling edge latches the nibble      |
//! | DB4-7  | high nibble first, then low nibble   |
//!
//! Only the 4-bit interface is implemented; the device layer rejects any
//! other pin count before a bus is built.

use embedded_hal::delay::DelayNs;

use crate::app::ports::{CharacterDisplay, DigitalOutput};
use crate::error::HalError;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x04;
const CMD_DISPLAY_CONTROL: u8 = 0x08;
const CMD_FUNCTION_SET: u8 = 0x20;
const CMD_SET_DDRAM: u8 = 0x80;

const ENTRY_INCREMENT: u8 = 0x02;
const DISPLAY_ON: u8 = 0x04;
const CURSOR_ON: u8 = 0x02;
const BLINK_ON: u8 = 0x01;
const TWO_LINES: u8 = 0x08;

/// Offset of each row in DDRAM.
const ROW_OFFSET: u8 = 0x40;

const CLEAR_DELAY_US: u32 = 1_600;

pub struct Hd44780<O, D> {
    rs: O,
    enable: O,
    /// DB4..DB7 in bus order.
    data: [O; 4],
    delay: D,
}

impl<O: DigitalOutput, D: DelayNs> Hd44780<O, D> {
    pub fn new(rs: O, enable: O, data: [O; 4], delay: D) -> Self {
        Self { rs, enable, data, delay }
    }

    fn pulse_enable(&mut self) -> Result<(), HalError> {
        self.enable.set_level(false)?;
        self.delay.delay_us(1);
        self.enable.set_level(true)?;
        self.delay.delay_us(1);
        self.enable.set_level(false)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool) -> Result<(), HalError> {
        for (bit, line) in self.data.iter_mut().enumerate() {
            line.set_level((nibble >> bit) & 1 == 1)?;
        }
        self.rs.set_level(rs)?;
        self.pulse_enable()
    }

    fn write_byte(&mut self, byte: u8, rs: bool) -> Result<(), HalError> {
        self.write_nibble(byte >> 4, rs)?;
        self.write_nibble(byte & 0x0F, rs)
    }

    fn command(&mut self, cmd: u8) -> Result<(), HalError> {
        self.write_byte(cmd, false)
    }
}

impl<O: DigitalOutput, D: DelayNs> CharacterDisplay for Hd44780<O, D> {
    fn initialise(&mut self, two_line: bool, show_cursor: bool, blink_cursor: bool) -> Result<(), HalError> {
        // Power-on settling is awaited by the caller.
        // Reset by instruction: three 8-bit function sets, then switch to 4-bit.
        for wait_us in [4_100, 100, 100] {
            self.write_nibble(0x03, false)?;
            self.delay.delay_us(wait_us);
        }
        self.write_nibble(0x02, false)?;

        let lines = if two_line { TWO_LINES } else { 0 };
        self.command(CMD_FUNCTION_SET | lines)?;

        let mut control = CMD_DISPLAY_CONTROL | DISPLAY_ON;
        if show_cursor {
            control |= CURSOR_ON;
        }
        if blink_cursor {
            control |= BLINK_ON;
        }
        self.command(control)?;
        self.clear()?;
        self.command(CMD_ENTRY_MODE | ENTRY_INCREMENT)
    }

    fn clear(&mut self) -> Result<(), HalError> {
        self.command(CMD_CLEAR)?;
        self.delay.delay_us(CLEAR_DELAY_US);
        Ok(())
    }

    fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), HalError> {
        self.command(CMD_SET_DDRAM | (column + ROW_OFFSET * row))
    }

    fn write_char(&mut self, ch: u8) -> Result<(), HalError> {
        self.write_byte(ch, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared log of `(rs, nibble)` latched on each enable falling edge.
    #[derive(Clone, Default)]
    struct Bus {
        lines: Rc<RefCell<[bool; 6]>>,
        latched: Rc<RefCell<Vec<(bool, u8)>>>,
    }

    struct Line {
        bus: Bus,
        index: usize,
    }

    impl DigitalOutput for Line {
        fn set_level(&mut self, high: bool) -> Result<(), HalError> {
            let mut lines = self.bus.lines.borrow_mut();
            let was_high = lines[self.index];
            lines[self.index] = high;
            // index 1 is E; latch on the falling edge
            if self.index == 1 && was_high && !high {
                let nibble = (0..4).fold(0u8, |acc, b| acc | (u8::from(lines[2 + b]) << b));
                self.bus.latched.borrow_mut().push((lines[0], nibble));
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn display(bus: &Bus) -> Hd44780<Line, NoDelay> {
        let line = |index| Line { bus: bus.clone(), index };
        Hd44780::new(line(0), line(1), [line(2), line(3), line(4), line(5)], NoDelay)
    }

    #[test]
    fn data_byte_is_sent_high_nibble_first() {
        let bus = Bus::default();
        let mut lcd = display(&bus);
        lcd.write_char(b'A').unwrap();
        assert_eq!(*bus.latched.borrow(), vec![(true, 0x4), (true, 0x1)]);
    }

    #[test]
    fn cursor_address_includes_row_offset() {
        let bus = Bus::default();
        let mut lcd = display(&bus);
        lcd.set_cursor(3, 1).unwrap();
        // 0x80 | 0x43 = 0xC3
        assert_eq!(*bus.latched.borrow(), vec![(false, 0xC), (false, 0x3)]);
    }

    #[test]
    fn initialise_switches_to_four_bit_mode() {
        let bus = Bus::default();
        let mut lcd = display(&bus);
        lcd.initialise(true, false, false).unwrap();
        let latched = bus.latched.borrow();
        assert_eq!(&latched[..4], &[(false, 3), (false, 3), (false, 3), (false, 2)]);
        // function set, 2 lines: 0x28
        assert_eq!(&latched[4..6], &[(false, 0x2), (false, 0x8)]);
    }
}
