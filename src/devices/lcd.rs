//! HD44780U character LCD on a 4-bit bus.
//!
//! The controller auto-increments its address after each character, so
//! the device only tracks the cursor to know when to wrap: past the last
//! column it moves to the next row, and past the last row back to the
//! top.

use core::cell::{Cell, RefCell};
use core::time::Duration;

use log::{debug, error};

use super::BuildContext;
use crate::app::device::{Args, Operation, Param, Reply};
use crate::app::ports::CharacterDisplay;
use crate::config::Params;
use crate::error::{DeviceError, OperationError, PreconditionError};
use crate::scheduler::Clock;

/// Time for VCC to rise before the reset sequence.
pub const POWER_ON_WAIT: Duration = Duration::from_millis(40);

pub const OPERATIONS: &[Operation] = &[
    Operation::new("clear", "Clear the display.", &[]),
    Operation::new(
        "write",
        "Write a string to the display at the cursor.",
        &[Param::required("string", "The text to write.")],
    ),
];

pub struct Lcd {
    name: String,
    display: RefCell<Box<dyn CharacterDisplay>>,
    columns: u8,
    rows: u8,
    show_cursor: bool,
    blink_cursor: bool,
    default_string: Option<String>,
    cursor: Cell<(u8, u8)>,
}

impl Lcd {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let rs: u8 = match params.get("register_select_pin")? {
            Some(pin) => pin,
            None => params
                .get("register_shift_pin")?
                .ok_or(DeviceError::MissingParam("register_select_pin"))?,
        };
        let enable: u8 = params.require("enable_pin")?;
        let data_pins: Vec<u8> = params.require("data_pins")?;
        let data: [u8; 4] = data_pins.as_slice().try_into().map_err(|_| {
            DeviceError::Unsupported(format!("only 4-bit mode is supported, got {} data pins", data_pins.len()))
        })?;
        let columns: u8 = params.or("columns", 16)?;
        let rows: u8 = params.or("rows", 2)?;
        if columns == 0 || rows == 0 {
            return Err(DeviceError::InvalidParam {
                param: if columns == 0 { "columns" } else { "rows" },
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            name: params.device().to_owned(),
            display: RefCell::new(ctx.hardware.character_display(rs, enable, data)?),
            columns,
            rows,
            show_cursor: params.or("show_cursor", true)?,
            blink_cursor: params.or("blink_cursor", false)?,
            default_string: params.get("default_string")?,
            cursor: Cell::new((0, 0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cursor(&self) -> (u8, u8) {
        self.cursor.get()
    }

    /// Move the cursor to `(x, y)`.
    pub fn move_to(&self, x: u8, y: u8) -> Result<(), OperationError> {
        if x >= self.columns || y >= self.rows {
            return Err(PreconditionError::Unsupported(format!(
                "coordinates must be within (0, 0) -> ({}, {})",
                self.columns - 1,
                self.rows - 1
            ))
            .into());
        }
        self.display.borrow_mut().set_cursor(x, y)?;
        self.cursor.set((x, y));
        Ok(())
    }

    fn write_char(&self, ch: u8) -> Result<(), OperationError> {
        self.display.borrow_mut().write_char(ch)?;
        let (x, y) = self.cursor.get();
        if x + 1 < self.columns {
            self.cursor.set((x + 1, y));
            return Ok(());
        }
        let y = if y + 1 < self.rows { y + 1 } else { 0 };
        self.move_to(0, y)
    }

    pub fn write(&self, text: &str) -> Result<(), OperationError> {
        for ch in text.chars() {
            self.write_char(u8::try_from(ch).unwrap_or(b'?'))?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), OperationError> {
        self.display.borrow_mut().clear()?;
        self.cursor.set((0, 0));
        Ok(())
    }

    fn reset(&self) -> Result<(), OperationError> {
        self.display
            .borrow_mut()
            .initialise(self.rows > 1, self.show_cursor, self.blink_cursor)?;
        self.cursor.set((0, 0));
        if let Some(text) = &self.default_string {
            self.write(text)?;
        }
        debug!("`{}`: display initialised", self.name);
        Ok(())
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        match op {
            "clear" => self.clear()?,
            "write" => self.write(&args.text("string").unwrap_or_default())?,
            _ => return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        }
        Ok(Reply::empty())
    }

    /// One-shot reset once power has settled.
    pub async fn run(&self, clock: &Clock) {
        clock.sleep(POWER_ON_WAIT).await;
        if let Err(e) = self.reset() {
            error!("`{}`: reset failed: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::SimBoard;
    use crate::scheduler::Runtime;
    use serde_json::{Map, Value, json};
    use std::rc::Rc;

    fn lcd(board: &SimBoard, clock: &Clock, extra: Value) -> Result<Lcd, DeviceError> {
        let ctx = BuildContext { hardware: board, clock };
        let mut m: Map<String, Value> = json!({
            "register_select_pin": 12, "enable_pin": 13, "data_pins": [14, 15, 16, 17],
            "columns": 4, "rows": 2
        })
        .as_object()
        .cloned()
        .unwrap();
        if let Value::Object(extra) = extra {
            m.extend(extra);
        }
        Lcd::build(&Params::new("panel", &m), &ctx)
    }

    #[test]
    fn eight_bit_bus_is_unsupported() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let err = lcd(&board, &clock, json!({"data_pins": [1, 2, 3, 4, 5, 6, 7, 8]})).err();
        assert!(matches!(err, Some(DeviceError::Unsupported(_))));
    }

    #[test]
    fn text_wraps_across_rows_and_back_to_top() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let panel = lcd(&board, &clock, json!({})).unwrap();

        panel.write("abcdef").unwrap();
        let d = board.display(12).unwrap();
        assert_eq!(d.row_text(0, 4), "abcd");
        assert_eq!(d.row_text(1, 4), "ef  ");
        assert_eq!(panel.cursor(), (2, 1));

        panel.write("gh").unwrap();
        assert_eq!(panel.cursor(), (0, 0));
    }

    #[test]
    fn out_of_range_move_is_a_precondition_error() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let panel = lcd(&board, &clock, json!({})).unwrap();
        assert!(matches!(
            panel.move_to(4, 0),
            Err(OperationError::Precondition(PreconditionError::Unsupported(_)))
        ));
        assert!(panel.move_to(3, 1).is_ok());
    }

    #[test]
    fn run_initialises_after_power_on_wait() {
        let board = SimBoard::new();
        let rt = Runtime::simulated();
        let panel = Rc::new(lcd(&board, rt.clock(), json!({"default_string": "hi"})).unwrap());
        let task = panel.clone();
        let clock = rt.clock().clone();
        rt.spawn(async move { task.run(&clock).await });

        rt.run_for(Duration::from_millis(39));
        assert!(board.display(12).is_none_or(|d| !d.initialised));
        rt.run_for(Duration::from_millis(1));
        let d = board.display(12).unwrap();
        assert!(d.initialised);
        assert_eq!(d.row_text(0, 4), "hi  ");
    }

    #[test]
    fn accepts_legacy_register_pin_name() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m: Map<String, Value> = json!({"register_shift_pin": 2, "enable_pin": 3, "data_pins": [4, 5, 6, 7]})
            .as_object()
            .cloned()
            .unwrap();
        assert!(Lcd::build(&Params::new("panel", &m), &ctx).is_ok());
    }
}
