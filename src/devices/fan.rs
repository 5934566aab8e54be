//! 4-pin PWM fan.
//!
//! The fan's PWM input is inverted: a 0 % request is driven as the
//! configured maximum duty.  `max_duty_cycle` can be lowered below
//! 65535 for fans that do not stop at full duty.
//!
//! A call that moves the fan between `off` and `on` runs the actions
//! bound to the new state.

use core::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;
use serde_json::json;

use super::BuildContext;
use crate::app::device::{Args, Operation, Param, Reply, StateMachine, Stateful};
use crate::app::events::{EventLink, EventTable};
use crate::app::ports::PwmOutput;
use crate::config::Params;
use crate::error::{DeviceError, OperationError};

pub const DEFAULT_FREQ_HZ: u32 = 25_000;
pub const DEFAULT_IDLE: u8 = 25;
pub const DEFAULT_MAX_DUTY: u16 = 65_530;

pub const STATES: [&str; 2] = ["off", "on"];

pub const OPERATIONS: &[Operation] = &[
    Operation::new("on", "Turn the fan on at the last set speed.", &[]),
    Operation::new("off", "Turn the fan off.", &[]),
    Operation::new(
        "set",
        "Set the speed of the fan.",
        &[Param::required("value", "Speed as a percentage (0-100).")],
    ),
];

/// Duty for a speed percentage on the inverted fan input.
pub fn duty_for(percent: u8, max_duty: u16) -> u16 {
    let inverted = f32::from(100 - percent.min(100)) / 100.0;
    (inverted * f32::from(max_duty)).round() as u16
}

pub struct Fan {
    name: String,
    pwm: RefCell<Box<dyn PwmOutput>>,
    max_duty: u16,
    /// Speed restored by `on`.
    speed: Cell<u8>,
    /// Speed currently applied.
    applied: Cell<u8>,
    state: StateMachine,
    events: EventLink,
}

impl Fan {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let pin: u8 = params.require("pin")?;
        let freq: u32 = params.or("freq", DEFAULT_FREQ_HZ)?;
        let idle: u8 = params.or("idle", DEFAULT_IDLE)?;
        let max_duty: u16 = params.or("max_duty_cycle", DEFAULT_MAX_DUTY)?;
        if idle > 100 {
            return Err(DeviceError::InvalidParam {
                param: "idle",
                reason: format!("must be a percentage (0-100), got {idle}"),
            });
        }

        let fan = Self {
            name: params.device().to_owned(),
            pwm: RefCell::new(ctx.hardware.pwm(pin, freq)?),
            max_duty,
            speed: Cell::new(idle),
            applied: Cell::new(0),
            state: StateMachine::new(params.device(), STATES),
            events: EventLink::new(),
        };
        fan.apply(idle).map_err(|e| match e {
            OperationError::Hardware(h) => DeviceError::Hardware(h),
            other => DeviceError::Unsupported(other.to_string()),
        })?;
        Ok(fan)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn speed(&self) -> u8 {
        self.applied.get()
    }

    pub fn attach(&self, events: &Rc<EventTable>) {
        self.events.attach(&self.name, events);
    }

    /// Drive `percent`.  Returns whether the on/off state changed.
    fn apply(&self, percent: u8) -> Result<bool, OperationError> {
        debug!("Fan `{}`: speed {}%", self.name, percent);
        self.pwm.borrow_mut().set_duty_u16(duty_for(percent, self.max_duty))?;
        self.applied.set(percent);
        Ok(self.state.set_index(usize::from(percent > 0)))
    }

    fn reply(&self) -> Reply {
        Reply::Json(json!({
            "speed": self.applied.get(),
            "state": STATES[usize::from(self.applied.get() > 0)],
        }))
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        let changed = match op {
            "on" => self.apply(self.speed.get())?,
            "off" => self.apply(0)?,
            "set" => {
                let value = args.int_in("value", 0..=100)?.unwrap_or_default() as u8;
                let changed = self.apply(value)?;
                self.speed.set(value);
                changed
            }
            _ => return Err(OperationError::bad_request(format!("fan has no operation `{op}`"))),
        };
        let reply = self.reply();
        if changed {
            self.events.emit(&self.name, STATES[usize::from(self.applied.get() > 0)]).await;
        }
        Ok(reply)
    }
}

impl Stateful for Fan {
    fn state_machine(&self) -> &StateMachine {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_is_inverted() {
        assert_eq!(duty_for(0, DEFAULT_MAX_DUTY), DEFAULT_MAX_DUTY);
        assert_eq!(duty_for(100, DEFAULT_MAX_DUTY), 0);
        assert_eq!(duty_for(25, 65_530), 49_148);
    }

    #[test]
    fn duty_clamps_above_full_speed() {
        assert_eq!(duty_for(150, 1000), 0);
    }
}
