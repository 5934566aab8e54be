//! Button matrix scanned column by column.
//!
//! Columns are outputs, rows are pulled-down inputs.  A scan drives each
//! column high in turn and reads the rows; the first active row names the
//! pressed key as `<column>_<row>`.  No active row is the state `None`.

use core::cell::RefCell;

use super::BuildContext;
use crate::app::device::{PollTiming, StateMachine, Stateful};
use crate::app::ports::{DigitalInput, DigitalOutput, Pull};
use crate::config::Params;
use crate::error::{DeviceError, HalError, OperationError};

pub const IDLE_STATE: &str = "None";
pub const DEFAULT_POLL_SECS: f32 = 0.05;
pub const DEFAULT_DEBOUNCE_SECS: f32 = 0.125;

struct Lines {
    rows: Vec<Box<dyn DigitalInput>>,
    columns: Vec<Box<dyn DigitalOutput>>,
}

impl Lines {
    /// `(column, row)` of the first pressed key.
    fn scan(&mut self) -> Result<Option<(usize, usize)>, HalError> {
        for (c, column) in self.columns.iter_mut().enumerate() {
            column.set_level(true)?;
            let mut hit = None;
            for (r, row) in self.rows.iter_mut().enumerate() {
                if row.is_high()? {
                    hit = Some(r);
                    break;
                }
            }
            column.set_level(false)?;
            if let Some(r) = hit {
                return Ok(Some((c, r)));
            }
        }
        Ok(None)
    }
}

pub struct Matrix {
    name: String,
    lines: RefCell<Lines>,
    row_count: usize,
    timing: PollTiming,
    state: StateMachine,
}

impl Matrix {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let row_pins: Vec<u8> = params.require("row_pins")?;
        let column_pins: Vec<u8> = params.require("column_pins")?;
        let interval = params.seconds_or("poll_sleep", DEFAULT_POLL_SECS)?;
        let debounce = params.seconds_or("button_debounce", DEFAULT_DEBOUNCE_SECS)?;

        let rows = row_pins
            .iter()
            .map(|&pin| ctx.hardware.input(pin, Pull::Down))
            .collect::<Result<Vec<_>, _>>()?;
        let columns = column_pins
            .iter()
            .map(|&pin| ctx.hardware.output(pin))
            .collect::<Result<Vec<_>, _>>()?;

        let keys = (0..columns.len()).flat_map(|c| (0..rows.len()).map(move |r| format!("{c}_{r}")));
        let state = StateMachine::new(params.device(), core::iter::once(IDLE_STATE.to_owned()).chain(keys));
        state.set_index(0);

        Ok(Self {
            name: params.device().to_owned(),
            row_count: rows.len(),
            lines: RefCell::new(Lines { rows, columns }),
            timing: PollTiming {
                interval,
                debounce: Some(debounce),
            },
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Stateful for Matrix {
    fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    fn recompute_state(&self) -> Result<bool, OperationError> {
        let idx = match self.lines.borrow_mut().scan()? {
            Some((c, r)) => 1 + c * self.row_count + r,
            None => 0,
        };
        Ok(self.state.set_index(idx))
    }

    fn poll_timing(&self) -> Option<PollTiming> {
        Some(self.timing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::SimBoard;
    use crate::scheduler::Clock;
    use serde_json::{Map, Value, json};

    fn keypad(board: &SimBoard) -> Matrix {
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: board, clock: &clock };
        let m: Map<String, Value> = json!({"row_pins": [10, 11], "column_pins": [20, 21, 22]})
            .as_object()
            .cloned()
            .unwrap();
        Matrix::build(&Params::new("keypad", &m), &ctx).unwrap()
    }

    #[test]
    fn enumerates_idle_and_every_key() {
        let board = SimBoard::new();
        let m = keypad(&board);
        let states = m.state_machine().states();
        assert_eq!(states.len(), 1 + 3 * 2);
        assert_eq!(states[0], "None");
        assert_eq!(states[1], "0_0");
        assert_eq!(states[6], "2_1");
        assert_eq!(m.state_machine().state().unwrap(), "None");
    }

    #[test]
    fn pressed_key_is_column_then_row() {
        let board = SimBoard::new();
        let m = keypad(&board);

        board.connect(21, 11);
        assert!(m.recompute_state().unwrap());
        assert_eq!(m.state_machine().state().unwrap(), "1_1");
        assert!(!board.level(21), "column released after the scan");

        board.disconnect(11);
        assert!(m.recompute_state().unwrap());
        assert_eq!(m.state_machine().state().unwrap(), "None");
    }

    #[test]
    fn timing_defaults() {
        let board = SimBoard::new();
        let m = keypad(&board);
        let t = m.poll_timing().unwrap();
        assert_eq!(t.interval, core::time::Duration::from_millis(50));
        assert_eq!(t.debounce, Some(core::time::Duration::from_millis(125)));
    }
}
