//! Environment sensors: DHTxx temperature/humidity and the CCS811 air
//! quality sensor.
//!
//! ```text
//!   CCS811 ──data──▶ {eCO2, TVOC} ⊕ compensation reading ⊕ status/error bits
//!     ▲
//!     └── run(): every rest_time, DHT reading ──set_environment──▶ sensor
//! ```

use core::cell::{Cell, RefCell};
use core::time::Duration;

use log::{debug, error, info};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::BuildContext;
use crate::app::device::{Args, Operation, Param, Reply};
use crate::app::ports::{AirQualitySensor, ClimateSensor};
use crate::config::Params;
use crate::error::{DeviceError, HalError, OperationError, PreconditionError};
use crate::scheduler::Clock;

// ═══════════════════════════════════════════════════════════════
//  DHTxx
// ═══════════════════════════════════════════════════════════════

pub const DHT_OPERATIONS: &[Operation] = &[Operation::new(
    "data",
    "Read temperature and humidity. A new measurement is taken at most once per rest time.",
    &[],
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtModel {
    Dht11,
    /// DHT22 and AM2302.
    Dht22,
}

impl DhtModel {
    /// Minimum time between two measurements.
    pub fn rest_time(self) -> Duration {
        match self {
            Self::Dht11 => Duration::from_secs(1),
            Self::Dht22 => Duration::from_secs(2),
        }
    }

    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "DHT11" => Some(Self::Dht11),
            "DHT22" | "AM2302" => Some(Self::Dht22),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// One validated measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub celsius: f64,
    pub humidity: f64,
}

impl Reading {
    pub fn temperature(&self, unit: TemperatureUnit) -> f64 {
        match unit {
            TemperatureUnit::Celsius => self.celsius,
            TemperatureUnit::Fahrenheit => ((self.celsius * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0,
        }
    }
}

/// Decode a 5-byte frame: humidity and temperature in tenths, the
/// temperature sign-magnitude, then a checksum of the first four bytes.
pub fn decode_frame(frame: [u8; 5]) -> Result<Reading, HalError> {
    let sum = frame[..4].iter().fold(0u16, |acc, b| acc + u16::from(*b)) & 0xFF;
    if u16::from(frame[4]) != sum {
        return Err(HalError::Bus(format!(
            "checksum validation failed (got {:#04x}, expected {:#04x})",
            frame[4], sum
        )));
    }
    let humidity = u16::from_be_bytes([frame[0], frame[1]]);
    let raw_temp = u16::from_be_bytes([frame[2], frame[3]]);
    let magnitude = f64::from(raw_temp & 0x7FFF) / 10.0;
    let celsius = if raw_temp & 0x8000 != 0 { -magnitude } else { magnitude };
    Ok(Reading {
        celsius,
        humidity: f64::from(humidity) / 10.0,
    })
}

pub struct Dht {
    name: String,
    model: DhtModel,
    sensor: RefCell<Box<dyn ClimateSensor>>,
    unit: TemperatureUnit,
    last_measured: Cell<Option<Duration>>,
    reading: Cell<Option<Reading>>,
    clock: Clock,
}

impl Dht {
    pub fn build(model: DhtModel, params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let pin: u8 = params.require("pin")?;
        let unit: TemperatureUnit = params.or("unit", TemperatureUnit::Celsius)?;
        Ok(Self {
            name: params.device().to_owned(),
            model,
            sensor: RefCell::new(ctx.hardware.climate_sensor(pin)?),
            unit,
            last_measured: Cell::new(None),
            reading: Cell::new(None),
            clock: ctx.clock.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> DhtModel {
        self.model
    }

    /// The latest reading, taking a new measurement only once the rest
    /// time has elapsed since the last one.
    pub fn measure(&self) -> Result<Reading, OperationError> {
        let now = self.clock.now();
        let due = self
            .last_measured
            .get()
            .is_none_or(|at| now.saturating_sub(at) >= self.model.rest_time());
        if !due {
            if let Some(reading) = self.reading.get() {
                return Ok(reading);
            }
        }

        debug!("`{}`: taking measurement", self.name);
        let frame = self.sensor.borrow_mut().read_frame()?;
        let reading = decode_frame(frame)?;
        self.reading.set(Some(reading));
        self.last_measured.set(Some(now));
        Ok(reading)
    }

    fn to_json(&self, reading: Reading) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("temperature".into(), json!(reading.temperature(self.unit)));
        out.insert("humidity".into(), json!(reading.humidity));
        out
    }

    pub async fn call(&self, op: &str, _args: &Args) -> Result<Reply, OperationError> {
        match op {
            "data" => Ok(Reply::Json(Value::Object(self.to_json(self.measure()?)))),
            _ => Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        }
    }

    /// Sample once per rest time so readings stay fresh.
    pub async fn run(&self, clock: &Clock) {
        loop {
            if let Err(e) = self.measure() {
                error!("`{}`: {}", self.name, e);
            }
            clock.sleep(self.model.rest_time()).await;
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  CCS811
// ═══════════════════════════════════════════════════════════════

pub const DEFAULT_MODE: i64 = 1;
/// Drive mode 4 (raw data every 250 ms) is not supported.
pub const UNSUPPORTED_MODE: i64 = 4;

pub const CCS811_OPERATIONS: &[Operation] = &[DATA_OPERATION];

pub const CCS811_DEBUG_OPERATIONS: &[Operation] = &[
    DATA_OPERATION,
    Operation::new(
        "mode",
        "Set the drive mode, or read the measurement mode when no mode is given. \
         Threshold interrupts are not supported.",
        &[Param::optional("mode", "Drive mode to put the sensor in (0-3).")],
    ),
    Operation::new("status", "Read the status register.", &[]),
    Operation::new("error", "Read the error register.", &[]),
];

const DATA_OPERATION: Operation = Operation::new(
    "data",
    "Read eCO2 and TVOC, merged with the compensation device's reading.",
    &[
        Param::optional("status", "Include the decoded status byte."),
        Param::optional("error", "Include the decoded error byte."),
    ],
);

/// Decoded STATUS register.
pub fn decode_status(byte: u8) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, bit) in [("fw_mode", 7), ("app_valid", 4), ("data_ready", 3), ("error", 0)] {
        out.insert(key.into(), Value::Bool(byte >> bit & 1 == 1));
    }
    out
}

/// Decoded ERROR_ID register.
pub fn decode_error(byte: u8) -> Map<String, Value> {
    const FLAGS: [&str; 6] = [
        "WRITE_REG_INVALID",
        "READ_REG_INVALID",
        "MEASMODE_INVALID",
        "MAX_RESISTANCE",
        "HEATER_FAULT",
        "HEATER_SUPPLY",
    ];
    FLAGS
        .iter()
        .enumerate()
        .map(|(bit, key)| ((*key).to_owned(), Value::Bool(byte >> bit & 1 == 1)))
        .collect()
}

/// MEAS_MODE byte for a drive mode.
pub fn mode_byte(mode: u8) -> u8 {
    (mode << 4) & 0x70
}

fn check_mode(mode: i64) -> Result<u8, PreconditionError> {
    if mode == UNSUPPORTED_MODE || !(0..=4).contains(&mode) {
        return Err(PreconditionError::Unsupported(format!("drive mode {mode} is not supported")));
    }
    Ok(mode as u8)
}

#[derive(Debug, Clone, Deserialize)]
struct CompensationSpec {
    device: String,
    #[serde(flatten)]
    params: Map<String, Value>,
}

pub struct AirSensor {
    name: String,
    sensor: RefCell<Box<dyn AirQualitySensor>>,
    compensation: Option<Dht>,
    debug_endpoints: bool,
}

impl AirSensor {
    pub fn build(params: &Params<'_>, ctx: &BuildContext<'_>) -> Result<Self, DeviceError> {
        let sda: u8 = params.require("sda")?;
        let scl: u8 = params.require("scl")?;
        let mode = check_mode(params.or("mode", DEFAULT_MODE)?).map_err(|e| DeviceError::InvalidParam {
            param: "mode",
            reason: e.to_string(),
        })?;
        let debug_endpoints: bool = params.or("show_debug_endpoints", false)?;
        let compensation = params
            .get::<CompensationSpec>("compensation_device")?
            .map(|spec| Self::build_compensation(params.device(), spec, ctx))
            .transpose()?;

        let mut sensor = ctx.hardware.air_quality(sda, scl)?;
        let status = sensor.status()?;
        let app_valid = status >> 4 & 1 == 1;
        let failed = status & 1 == 1;
        if app_valid && !failed {
            info!("CCS811 `{}`: application valid, starting", params.device());
            sensor.start_app()?;
            sensor.set_measure_mode(mode_byte(mode))?;
        } else {
            info!("CCS811 `{}`: not started (status {:#04x})", params.device(), status);
        }

        Ok(Self {
            name: params.device().to_owned(),
            sensor: RefCell::new(sensor),
            compensation,
            debug_endpoints,
        })
    }

    fn build_compensation(owner: &str, spec: CompensationSpec, ctx: &BuildContext<'_>) -> Result<Dht, DeviceError> {
        let model = DhtModel::from_type_name(&spec.device).ok_or_else(|| DeviceError::InvalidParam {
            param: "compensation_device",
            reason: format!("unsupported compensation device `{}`", spec.device),
        })?;
        let name = format!("{owner}_temp");
        let params = Params::new(&name, &spec.params);
        let dht = Dht::build(model, &params, ctx)?;
        params.warn_unused(&spec.device);
        Ok(dht)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operations(&self) -> &'static [Operation] {
        if self.debug_endpoints {
            CCS811_DEBUG_OPERATIONS
        } else {
            CCS811_OPERATIONS
        }
    }

    fn data(&self, args: &Args) -> Result<Map<String, Value>, OperationError> {
        let sample = self.sensor.borrow_mut().sample()?;
        let mut out = Map::new();
        out.insert("eCO2".into(), json!(sample.eco2));
        out.insert("TVOC".into(), json!(sample.tvoc));
        if let Some(dht) = &self.compensation {
            out.extend(dht.to_json(dht.measure()?));
        }
        if args.flag("status") {
            out.extend(decode_status(sample.status));
        }
        if args.flag("error") {
            out.extend(decode_error(sample.error_id));
        }
        Ok(out)
    }

    fn mode(&self, args: &Args) -> Result<Value, OperationError> {
        match args.int("mode")? {
            Some(mode) => {
                let mode = check_mode(mode)?;
                self.sensor.borrow_mut().set_measure_mode(mode_byte(mode))?;
                Ok(json!({ "mode": mode }))
            }
            None => {
                let raw = self.sensor.borrow_mut().measure_mode()?;
                Ok(json!({
                    "drive_mode": raw >> 4,
                    "interrupt_data_ready": raw >> 3 & 1 == 1,
                }))
            }
        }
    }

    pub async fn call(&self, op: &str, args: &Args) -> Result<Reply, OperationError> {
        let value = match op {
            "data" => Value::Object(self.data(args)?),
            "mode" => self.mode(args)?,
            "status" => Value::Object(decode_status(self.sensor.borrow_mut().status()?)),
            "error" => Value::Object(decode_error(self.sensor.borrow_mut().error_id()?)),
            _ => return Err(OperationError::bad_request(format!("`{}` has no operation `{op}`", self.name))),
        };
        Ok(Reply::Json(value))
    }

    /// Push compensation data to the sensor once per rest time.
    pub async fn run(&self, clock: &Clock) {
        let Some(dht) = &self.compensation else {
            return;
        };
        loop {
            match dht.measure() {
                Ok(r) => {
                    let pushed = self
                        .sensor
                        .borrow_mut()
                        .set_environment(r.humidity as f32, r.celsius as f32);
                    if let Err(e) = pushed {
                        error!("`{}`: compensation push failed: {}", self.name, e);
                    }
                }
                Err(e) => error!("`{}`: compensation read failed: {}", self.name, e),
            }
            clock.sleep(dht.model.rest_time()).await;
        }
    }
}
