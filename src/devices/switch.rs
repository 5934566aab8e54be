//! Multi-position selector switch.
//!
//! `state_pin_mapping` maps each position's state name to the input pin
//! that is high in that position, and exactly one name to `"off"`: the
//! position with no active pin.

use core::cell::RefCell;

use serde_json::Value;

use super::BuildContext;
use crate::app::device::{PollTiming, StateMachine, Stateful};
use crate::app::ports::{DigitalInput, Pull};
use crate::config::Params;
use crate::error::{DeviceError, OperationError};

pub const OFF_PIN: &str = "off";
pub const DEFAULT_POLL_SECS: f32 = 0.1;

struct Position {
    input: Box<dyn DigitalInput>,
    state: usize,
}

pub struct Switch {
    name: String,
    /// Pinned positions, in declaration order.
    positions: RefCell<Vec<Position>>,
    off_state: usize,
    timing: PollTiming,
    state: StateMachine,
}

fn invalid(reason: impl Into<String>) -> DeviceError {
    DeviceError::InvalidParam {
        param: "state_pin_mapping",
        reason: reason.into(),
    }
}

impl Switch {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let mapping = match params.raw("state_pin_mapping") {
            Some(Value::Object(mapping)) => mapping,
            Some(_) => return Err(invalid("expected an object of state → pin")),
            None => return Err(DeviceError::MissingParam("state_pin_mapping")),
        };
        let interval = params.seconds_or("poll_sleep", DEFAULT_POLL_SECS)?;

        let mut states = Vec::with_capacity(mapping.len());
        let mut positions = Vec::new();
        let mut off_state = None;
        let mut active = None;
        for (idx, (state, pin)) in mapping.iter().enumerate() {
            states.push(state.clone());
            match pin {
                Value::String(s) if s == OFF_PIN => {
                    if off_state.replace(idx).is_some() {
                        return Err(invalid("more than one state is mapped to \"off\""));
                    }
                }
                _ => {
                    let pin = pin
                        .as_u64()
                        .and_then(|p| u8::try_from(p).ok())
                        .ok_or_else(|| invalid(format!("`{state}` must map to a pin number or \"off\"")))?;
                    let mut input = ctx.hardware.input(pin, Pull::Down)?;
                    if input.is_high()? && active.replace(idx).is_some() {
                        return Err(DeviceError::Unsupported(format!(
                            "multiple states active on `{}`",
                            params.device()
                        )));
                    }
                    positions.push(Position { input, state: idx });
                }
            }
        }
        let off_state = off_state.ok_or_else(|| invalid("one state must be mapped to \"off\""))?;

        let state = StateMachine::new(params.device(), states);
        state.set_index(active.unwrap_or(off_state));

        Ok(Self {
            name: params.device().to_owned(),
            positions: RefCell::new(positions),
            off_state,
            timing: PollTiming { interval, debounce: None },
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Stateful for Switch {
    fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    /// First active pin wins; none active is the off position.
    fn recompute_state(&self) -> Result<bool, OperationError> {
        let mut next = self.off_state;
        for position in self.positions.borrow_mut().iter_mut() {
            if position.input.is_high()? {
                next = position.state;
                break;
            }
        }
        Ok(self.state.set_index(next))
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
    use serde_json::{Map, json};

    fn build(board: &SimBoard, v: Value) -> Result<Switch, DeviceError> {
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: board, clock: &clock };
        let m: Map<String, Value> = v.as_object().cloned().unwrap();
        Switch::build(&Params::new("selector", &m), &ctx)
    }

    #[test]
    fn states_come_from_mapping_in_order() {
        let board = SimBoard::new();
        let s = build(&board, json!({"state_pin_mapping": {"low": 3, "off": "off", "high": 5}})).unwrap();
        assert_eq!(s.state_machine().states(), ["low", "off", "high"]);
        assert_eq!(s.state_machine().state().unwrap(), "off");
    }

    #[test]
    fn first_active_pin_wins() {
        let board = SimBoard::new();
        let s = build(&board, json!({"state_pin_mapping": {"low": 3, "idle": "off", "high": 5}})).unwrap();

        board.set_input(5, true);
        assert!(s.recompute_state().unwrap());
        assert_eq!(s.state_machine().state().unwrap(), "high");
        board.set_input(3, true);
        assert!(s.recompute_state().unwrap());
        assert_eq!(s.state_machine().state().unwrap(), "low");
        board.set_input(3, false);
        board.set_input(5, false);
        assert!(s.recompute_state().unwrap());
        assert_eq!(s.state_machine().state().unwrap(), "idle");
    }

    #[test]
    fn mapping_needs_exactly_one_off() {
        let board = SimBoard::new();
        assert!(build(&board, json!({"state_pin_mapping": {"a": 3}})).is_err());
        assert!(build(&board, json!({"state_pin_mapping": {"a": "off", "b": "off"}})).is_err());
    }

    #[test]
    fn two_active_pins_at_construction_fail() {
        let board = SimBoard::new();
        board.set_input(3, true);
        board.set_input(5, true);
        assert!(matches!(
            build(&board, json!({"state_pin_mapping": {"a": 3, "b": 5, "c": "off"}})),
            Err(DeviceError::Unsupported(_))
        ));
    }
}
