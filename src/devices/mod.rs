//! Device kinds and the closed kind → factory table.
//!
//! ```text
//!   DeviceEntry {name, type, params}
//!        │  DeviceKind::from_type_name
//!        ▼
//!   try_build ──(error: logged, no device)──▶ None
//!        │
//!        ▼
//!   Device (tagged union) ── operations() ─▶ routes, bindings
//!        │                └─ call(op, args) ─▶ Reply
//!        └── run_loop(events, clock)           one task per device
//! ```
//!
//! | Kind                 | State            | Loop                          |
//! |----------------------|------------------|-------------------------------|
//! | Fan                  | off / on         | none                          |
//! | NeoPixel, RGBNeoPixel| none             | none                          |
//! | CCS811               | none             | compensation push             |
//! | DHT11, DHT22/AM2302  | none             | sample every `rest_time`      |
//! | VirtualToggleButton  | off / on         | captures the event table      |
//! | ToggleButton         | off / on         | poll 0.1 s                    |
//! | MomentaryButton      | off / on         | poll 0.1 s, debounce 0.5 s    |
//! | Switch               | mapping keys     | poll 0.1 s                    |
//! | Matrix               | None, `<c>_<r>`  | poll 0.05 s, debounce 0.125 s |
//! | Serial               | none             | none                          |
//! | HD44780U_LCD         | none             | reset once, then idle         |
//! | `_OnboardLED`        | none             | blink 1 s / 1 s               |

pub mod button;
pub mod colors;
pub mod environment;
pub mod fan;
pub mod lcd;
pub mod led;
pub mod matrix;
pub mod serial;
pub mod switch;

use std::rc::Rc;

use log::{debug, error};
use serde_json::{Map, Value};

use crate::app::device::{Args, Operation, PollTiming, Reply, STATE_OPERATION, Stateful};
use crate::app::events::EventTable;
use crate::app::ports::Hardware;
use crate::config::{DeviceEntry, Params};
use crate::error::{ConfigError, DeviceError, OperationError};
use crate::scheduler::Clock;

use self::button::{Button, ButtonMode, VirtualToggleButton};
use self::environment::{AirSensor, Dht, DhtModel};
use self::fan::Fan;
use self::lcd::Lcd;
use self::led::{NeoPixel, OnboardLed, RgbNeoPixel};
use self::matrix::Matrix;
use self::serial::Serial;
use self::switch::Switch;

/// Name the builtin heartbeat device is registered under.
pub const ONBOARD_LED_NAME: &str = "_OnboardLED";

// ───────────────────────────────────────────────────────────────
// Kinds
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Fan,
    NeoPixel,
    RgbNeoPixel,
    Ccs811,
    Dht11,
    Dht22,
    VirtualToggleButton,
    ToggleButton,
    MomentaryButton,
    Switch,
    Matrix,
    Serial,
    Hd44780Lcd,
    OnboardLed,
}

impl DeviceKind {
    /// Resolve a configured `type` string.  `AM2302` is a DHT22.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "Fan" => Self::Fan,
            "NeoPixel" => Self::NeoPixel,
            "RGBNeoPixel" => Self::RgbNeoPixel,
            "CCS811" => Self::Ccs811,
            "DHT11" => Self::Dht11,
            "DHT22" | "AM2302" => Self::Dht22,
            "VirtualToggleButton" => Self::VirtualToggleButton,
            "ToggleButton" => Self::ToggleButton,
            "MomentaryButton" => Self::MomentaryButton,
            "Switch" => Self::Switch,
            "Matrix" => Self::Matrix,
            "Serial" => Self::Serial,
            "HD44780U_LCD" => Self::Hd44780Lcd,
            _ => return None,
        })
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Fan => "Fan",
            Self::NeoPixel => "NeoPixel",
            Self::RgbNeoPixel => "RGBNeoPixel",
            Self::Ccs811 => "CCS811",
            Self::Dht11 => "DHT11",
            Self::Dht22 => "DHT22",
            Self::VirtualToggleButton => "VirtualToggleButton",
            Self::ToggleButton => "ToggleButton",
            Self::MomentaryButton => "MomentaryButton",
            Self::Switch => "Switch",
            Self::Matrix => "Matrix",
            Self::Serial => "Serial",
            Self::Hd44780Lcd => "HD44780U_LCD",
            Self::OnboardLed => ONBOARD_LED_NAME,
        }
    }
}

/// What a factory may touch while constructing a device.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub hardware: &'a dyn Hardware,
    pub clock: &'a Clock,
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

/// One constructed device.  Every variant exclusively owns its ports.
pub enum Device {
    Fan(Fan),
    NeoPixel(NeoPixel),
    RgbNeoPixel(RgbNeoPixel),
    AirSensor(AirSensor),
    Dht(Dht),
    VirtualToggleButton(VirtualToggleButton),
    Button(Button),
    Switch(Switch),
    Matrix(Matrix),
    Serial(Serial),
    Lcd(Lcd),
    OnboardLed(OnboardLed),
}

impl Device {
    /// Construct a device of `kind`.  Parameters the kind never reads are
    /// logged and ignored.
    pub fn build(
        kind: DeviceKind,
        name: &str,
        params: &Map<String, Value>,
        ctx: &BuildContext<'_>,
    ) -> Result<Self, DeviceError> {
        let p = Params::new(name, params);
        let device = match kind {
            DeviceKind::Fan => Self::Fan(Fan::build(&p, ctx)?),
            DeviceKind::NeoPixel => Self::NeoPixel(NeoPixel::build(&p, ctx)?),
            DeviceKind::RgbNeoPixel => Self::RgbNeoPixel(RgbNeoPixel::build(&p, ctx)?),
            DeviceKind::Ccs811 => Self::AirSensor(AirSensor::build(&p, ctx)?),
            DeviceKind::Dht11 => Self::Dht(Dht::build(DhtModel::Dht11, &p, ctx)?),
            DeviceKind::Dht22 => Self::Dht(Dht::build(DhtModel::Dht22, &p, ctx)?),
            DeviceKind::VirtualToggleButton => Self::VirtualToggleButton(VirtualToggleButton::build(&p, ctx)?),
            DeviceKind::ToggleButton => Self::Button(Button::build(ButtonMode::Follow, &p, ctx)?),
            DeviceKind::MomentaryButton => Self::Button(Button::build_momentary(&p, ctx)?),
            DeviceKind::Switch => Self::Switch(Switch::build(&p, ctx)?),
            DeviceKind::Matrix => Self::Matrix(Matrix::build(&p, ctx)?),
            DeviceKind::Serial => Self::Serial(Serial::build(&p, ctx)?),
            DeviceKind::Hd44780Lcd => Self::Lcd(Lcd::build(&p, ctx)?),
            DeviceKind::OnboardLed => Self::OnboardLed(OnboardLed::build(name, ctx)?),
        };
        p.warn_unused(kind.type_name());
        Ok(device)
    }

    /// Tolerant factory: resolve the entry's type and build it, logging
    /// the kind and name of any failure instead of propagating it.
    pub fn try_build(entry: &DeviceEntry, ctx: &BuildContext<'_>) -> Option<Self> {
        let Some(kind) = DeviceKind::from_type_name(&entry.kind) else {
            let e = ConfigError::UnknownDeviceKind {
                name: entry.name.clone(),
                kind: entry.kind.clone(),
            };
            error!("{e}");
            return None;
        };
        match Self::build(kind, &entry.name, &entry.params, ctx) {
            Ok(device) => {
                debug!("{} `{}` ready", kind.type_name(), entry.name);
                Some(device)
            }
            Err(e) => {
                error!("{} `{}` could not be constructed: {}", kind.type_name(), entry.name, e);
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Fan(d) => d.name(),
            Self::NeoPixel(d) => d.name(),
            Self::RgbNeoPixel(d) => d.name(),
            Self::AirSensor(d) => d.name(),
            Self::Dht(d) => d.name(),
            Self::VirtualToggleButton(d) => d.name(),
            Self::Button(d) => d.name(),
            Self::Switch(d) => d.name(),
            Self::Matrix(d) => d.name(),
            Self::Serial(d) => d.name(),
            Self::Lcd(d) => d.name(),
            Self::OnboardLed(d) => d.name(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Fan(_) => DeviceKind::Fan,
            Self::NeoPixel(_) => DeviceKind::NeoPixel,
            Self::RgbNeoPixel(_) => DeviceKind::RgbNeoPixel,
            Self::AirSensor(_) => DeviceKind::Ccs811,
            Self::Dht(d) => match d.model() {
                DhtModel::Dht11 => DeviceKind::Dht11,
                DhtModel::Dht22 => DeviceKind::Dht22,
            },
            Self::VirtualToggleButton(_) => DeviceKind::VirtualToggleButton,
            Self::Button(d) => match d.mode() {
                ButtonMode::Follow => DeviceKind::ToggleButton,
                ButtonMode::Toggle | ButtonMode::Momentary => DeviceKind::MomentaryButton,
            },
            Self::Switch(_) => DeviceKind::Switch,
            Self::Matrix(_) => DeviceKind::Matrix,
            Self::Serial(_) => DeviceKind::Serial,
            Self::Lcd(_) => DeviceKind::Hd44780Lcd,
            Self::OnboardLed(_) => DeviceKind::OnboardLed,
        }
    }

    /// One-line description used on the docs page.
    pub fn description(&self) -> &'static str {
        match self.kind() {
            DeviceKind::Fan => "A 4-pin PWM fan.",
            DeviceKind::NeoPixel => "A single colour NeoPixel strip.",
            DeviceKind::RgbNeoPixel => "An RGB NeoPixel strip.",
            DeviceKind::Ccs811 => "CCS811: measure VOCs and eCO2.",
            DeviceKind::Dht11 => "DHT11: measure temperature and humidity.",
            DeviceKind::Dht22 => "DHT22/AM2302: measure temperature and humidity.",
            DeviceKind::VirtualToggleButton => "A virtual toggle button, driven through the API.",
            DeviceKind::ToggleButton => "A physical toggle button.",
            DeviceKind::MomentaryButton => "A physical momentary button.",
            DeviceKind::Switch => "A physical switch with multiple states.",
            DeviceKind::Matrix => "A button matrix.",
            DeviceKind::Serial => "A UART serial device.",
            DeviceKind::Hd44780Lcd => "An HD44780U-based character LCD.",
            DeviceKind::OnboardLed => "The board's heartbeat LED.",
        }
    }

    /// The stateful capability, for kinds that carry a state machine.
    pub fn as_stateful(&self) -> Option<&dyn Stateful> {
        match self {
            Self::Fan(d) => Some(d),
            Self::VirtualToggleButton(d) => Some(d),
            Self::Button(d) => Some(d),
            Self::Switch(d) => Some(d),
            Self::Matrix(d) => Some(d),
            _ => None,
        }
    }

    /// The kind's operation table, plus `state` for stateful kinds.
    pub fn operations(&self) -> Vec<Operation> {
        let own: &[Operation] = match self {
            Self::Fan(_) => fan::OPERATIONS,
            Self::NeoPixel(_) => led::NEOPIXEL_OPERATIONS,
            Self::RgbNeoPixel(_) => led::RGB_OPERATIONS,
            Self::AirSensor(d) => d.operations(),
            Self::Dht(_) => environment::DHT_OPERATIONS,
            Self::VirtualToggleButton(_) => button::VIRTUAL_OPERATIONS,
            Self::Serial(_) => serial::OPERATIONS,
            Self::Lcd(_) => lcd::OPERATIONS,
            Self::Button(_) | Self::Switch(_) | Self::Matrix(_) | Self::OnboardLed(_) => &[],
        };
        let mut ops = own.to_vec();
        if self.as_stateful().is_some() {
            ops.push(STATE_OPERATION);
        }
        ops
    }

    pub fn operation(&self, name: &str) -> Option<Operation> {
        self.operations().into_iter().find(|op| op.name == name)
    }

    /// Operation also served at the bare `/<device>` path.
    pub fn default_operation(&self) -> Option<&'static str> {
        match self {
            Self::AirSensor(_) | Self::Dht(_) => Some("data"),
            _ => None,
        }
    }

    /// Run one operation.  Arguments are checked against the operation's
    /// parameter table before the kind sees them.
    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        let operation = self
            .operation(op)
            .ok_or_else(|| OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name())))?;
        operation.check_args(args)?;

        if operation.name == STATE_OPERATION.name {
            if let Some(stateful) = self.as_stateful() {
                return Ok(Reply::state(stateful.state_machine().state()?));
            }
        }

        match self {
            Self::Fan(d) => d.call(op, args).await,
            Self::NeoPixel(d) => d.call(op, args).await,
            Self::RgbNeoPixel(d) => d.call(op, args).await,
            Self::AirSensor(d) => d.call(op, args).await,
            Self::Dht(d) => d.call(op, args).await,
            Self::VirtualToggleButton(d) => d.call(op, args).await,
            Self::Serial(d) => d.call(op, args).await,
            Self::Lcd(d) => d.call(op, args).await,
            Self::Button(_) | Self::Switch(_) | Self::Matrix(_) | Self::OnboardLed(_) => Err(
                OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name())),
            ),
        }
    }

    /// The device's perpetual task.  Passive kinds return immediately.
    pub async fn run_loop(&self, events: &Rc<EventTable>, clock: &Clock) {
        match self {
            Self::VirtualToggleButton(d) => d.attach(events),
            Self::Fan(d) => d.attach(events),
            Self::Dht(d) => d.run(clock).await,
            Self::AirSensor(d) => d.run(clock).await,
            Self::Lcd(d) => d.run(clock).await,
            Self::OnboardLed(d) => d.run(clock).await,
            Self::Button(d) => poll_loop(d.name(), d, events, clock).await,
            Self::Switch(d) => poll_loop(d.name(), d, events, clock).await,
            Self::Matrix(d) => poll_loop(d.name(), d, events, clock).await,
            Self::NeoPixel(_) | Self::RgbNeoPixel(_) | Self::Serial(_) => {}
        }
    }
}

/// Shared loop of every polled stateful kind: recompute, dispatch on
/// change, debounce, sleep.
async fn poll_loop(name: &str, device: &dyn Stateful, events: &EventTable, clock: &Clock) {
    let Some(PollTiming { interval, debounce }) = device.poll_timing() else {
        return;
    };
    loop {
        match device.recompute_state() {
            Ok(true) => {
                match device.state_machine().state() {
                    Ok(state) => {
                        let state = state.to_owned();
                        debug!("`{name}` state changed to `{state}`");
                        events.dispatch(name, &state).await;
                    }
                    Err(e) => error!("`{name}`: {e}"),
                }
                if let Some(debounce) = debounce {
                    clock.sleep(debounce).await;
                }
            }
            Ok(false) => {}
            Err(e) => error!("`{name}`: state update failed: {e}"),
        }
        clock.sleep(interval).await;
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

/// The live devices, in declaration order.
#[derive(Default)]
pub struct Registry {
    devices: Vec<Rc<Device>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device.  A later device with a taken name replaces the earlier.
    pub fn insert(&mut self, device: Device) -> Rc<Device> {
        let device = Rc::new(device);
        match self.devices.iter_mut().find(|d| d.name() == device.name()) {
            Some(slot) => *slot = device.clone(),
            None => self.devices.push(device.clone()),
        }
        device
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Device>> {
        self.devices.iter().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Device>> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
