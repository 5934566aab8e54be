//! Buttons: physical toggle and momentary buttons, and a virtual toggle
//! driven through the API.
//!
//! Physical buttons share one struct; the transition rule is a
//! [`ButtonMode`] fixed at construction.
//!
//! | Mode        | Kind            | Rule                                  |
//! |-------------|-----------------|---------------------------------------|
//! | `Follow`    | ToggleButton    | state = level (high = `on`)           |
//! | `Toggle`    | MomentaryButton | each rising edge flips the state      |
//! | `Momentary` | MomentaryButton | state = level                         |

use core::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Deserialize;

use super::BuildContext;
use crate::app::device::{Args, Operation, PollTiming, Reply, StateMachine, Stateful};
use crate::app::events::{EventLink, EventTable};
use crate::app::ports::{DigitalInput, DigitalOutput, Pull};
use crate::config::Params;
use crate::error::{DeviceError, OperationError};

pub const STATES: [&str; 2] = ["off", "on"];

pub const DEFAULT_POLL_SECS: f32 = 0.1;
pub const DEFAULT_DEBOUNCE_SECS: f32 = 0.5;

// ── Physical buttons ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonMode {
    /// The state follows the input level.
    #[serde(skip)]
    Follow,
    /// Each press flips the state.
    Toggle,
    /// The state follows the input level while held.
    Momentary,
}

pub struct Button {
    name: String,
    input: RefCell<Box<dyn DigitalInput>>,
    mode: ButtonMode,
    last_level: Cell<bool>,
    timing: PollTiming,
    state: StateMachine,
}

impl Button {
    pub fn build(mode: ButtonMode, params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let pin: u8 = params.require("pin")?;
        let interval = params.seconds_or("poll_sleep", DEFAULT_POLL_SECS)?;
        let debounce = match mode {
            ButtonMode::Follow => None,
            ButtonMode::Toggle | ButtonMode::Momentary => {
                Some(params.seconds_or("button_debounce", DEFAULT_DEBOUNCE_SECS)?)
            }
        };

        let mut input = ctx.hardware.input(pin, Pull::Down)?;
        let level = input.is_high()?;
        let state = StateMachine::new(params.device(), STATES);
        state.set_index(usize::from(level));

        Ok(Self {
            name: params.device().to_owned(),
            input: RefCell::new(input),
            mode,
            last_level: Cell::new(level),
            timing: PollTiming { interval, debounce },
            state,
        })
    }

    /// MomentaryButton: `mode` is required and picks the strategy.
    pub fn build_momentary(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let mode: ButtonMode = params.require("mode")?;
        Self::build(mode, params, ctx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ButtonMode {
        self.mode
    }
}

impl Stateful for Button {
    fn state_machine(&self) -> &StateMachine {
        &self.state
    }

    fn recompute_state(&self) -> Result<bool, OperationError> {
        let level = self.input.borrow_mut().is_high()?;
        let rising = level && !self.last_level.get();
        self.last_level.set(level);

        let changed = match self.mode {
            ButtonMode::Follow | ButtonMode::Momentary => self.state.set_index(usize::from(level)),
            ButtonMode::Toggle if rising => {
                let next = if self.state.state()? == STATES[0] { 1 } else { 0 };
                self.state.set_index(next)
            }
            ButtonMode::Toggle => false,
        };
        Ok(changed)
    }

    fn poll_timing(&self) -> Option<PollTiming> {
        Some(self.timing)
    }
}

// ── Virtual toggle ────────────────────────────────────────────

pub const VIRTUAL_OPERATIONS: &[Operation] = &[
    Operation::new("on", "Turn on the virtual button.", &[]),
    Operation::new("off", "Turn off the virtual button.", &[]),
];

/// A button with no physical input.  `on`/`off` drive a signal pin and,
/// on change, run the actions bound to the new state.
pub struct VirtualToggleButton {
    name: String,
    output: RefCell<Box<dyn DigitalOutput>>,
    events: EventLink,
    state: StateMachine,
}

impl VirtualToggleButton {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let pin: u8 = params.require("pin")?;
        let default: String = params.or("default_value", STATES[0].to_owned())?;
        let state = StateMachine::new(params.device(), STATES);
        state.set(&default).map_err(|_| DeviceError::InvalidParam {
            param: "default_value",
            reason: format!("must be one of {STATES:?}, got `{default}`"),
        })?;

        Ok(Self {
            name: params.device().to_owned(),
            output: RefCell::new(ctx.hardware.output(pin)?),
            events: EventLink::new(),
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keep a handle on the event table for API-triggered transitions.
    pub fn attach(&self, events: &Rc<EventTable>) {
        self.events.attach(&self.name, events);
    }

    pub async fn call(&self, op: &str, _args: &Args) -> Result<Reply, OperationError> {
        let on = match op {
            "on" => true,
            "off" => false,
            _ => return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        };
        self.output.borrow_mut().set_level(on)?;
        let changed = self.state.set_index(usize::from(on));

        let state = self.state.state()?.to_owned();
        if changed {
            self.events.emit(&self.name, &state).await;
        }
        Ok(Reply::state(&state))
    }
}

impl Stateful for VirtualToggleButton {
    fn state_machine(&self) -> &StateMachine {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::hardware::SimBoard;
    use crate::scheduler::Clock;
    use futures_lite::future::block_on;
    use serde_json::{Map, Value, json};

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn initial_state_follows_level() {
        let board = SimBoard::new();
        board.set_input(4, true);
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 4}));
        let b = Button::build(ButtonMode::Follow, &Params::new("lid", &m), &ctx).unwrap();
        assert_eq!(b.state_machine().state().unwrap(), "on");
        assert_eq!(b.poll_timing().unwrap().interval, core::time::Duration::from_millis(100));
        assert_eq!(b.poll_timing().unwrap().debounce, None);
    }

    #[test]
    fn follow_mode_tracks_level() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 4}));
        let b = Button::build(ButtonMode::Follow, &Params::new("lid", &m), &ctx).unwrap();

        assert!(!b.recompute_state().unwrap());
        board.set_input(4, true);
        assert!(b.recompute_state().unwrap());
        assert_eq!(b.state_machine().state().unwrap(), "on");
        board.set_input(4, false);
        assert!(b.recompute_state().unwrap());
        assert_eq!(b.state_machine().state().unwrap(), "off");
    }

    #[test]
    fn toggle_mode_flips_once_per_press() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 6, "mode": "toggle"}));
        let b = Button::build_momentary(&Params::new("door", &m), &ctx).unwrap();
        assert_eq!(b.mode(), ButtonMode::Toggle);

        board.set_input(6, true);
        assert!(b.recompute_state().unwrap());
        assert!(!b.recompute_state().unwrap(), "holding does not flip again");
        assert_eq!(b.state_machine().state().unwrap(), "on");
        board.set_input(6, false);
        assert!(!b.recompute_state().unwrap());
        board.set_input(6, true);
        assert!(b.recompute_state().unwrap());
        assert_eq!(b.state_machine().state().unwrap(), "off");
    }

    #[test]
    fn momentary_requires_a_known_mode() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 6}));
        assert_eq!(
            Button::build_momentary(&Params::new("door", &m), &ctx).err(),
            Some(DeviceError::MissingParam("mode"))
        );
        let m = map(json!({"pin": 6, "mode": "follow"}));
        assert!(Button::build_momentary(&Params::new("door", &m), &ctx).is_err());
    }

    #[test]
    fn virtual_button_drives_its_pin() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 12}));
        let v = VirtualToggleButton::build(&Params::new("vbtn", &m), &ctx).unwrap();
        assert_eq!(v.state_machine().state().unwrap(), "off");

        let reply = block_on(v.call("on", &Args::new())).unwrap();
        assert_eq!(reply, Reply::state("on"));
        assert!(board.level(12));
        block_on(v.call("off", &Args::new())).unwrap();
        assert!(!board.level(12));
    }

    #[test]
    fn virtual_button_rejects_unknown_default() {
        let board = SimBoard::new();
        let clock = Clock::manual();
        let ctx = BuildContext { hardware: &board, clock: &clock };
        let m = map(json!({"pin": 12, "default_value": "maybe"}));
        assert!(matches!(
            VirtualToggleButton::build(&Params::new("vbtn", &m), &ctx),
            Err(DeviceError::InvalidParam { param: "default_value", .. })
        ));
    }
}
