//! Configuration document.
//!
//! One JSON object read once at startup.  Reserved top-level keys hold
//! system sections; every other key declares a device, and the key itself
//! becomes the device name:
//!
//! ```json
//! {
//!     "network": { "ssid": "workshop", "password": "hunter22", "port": 80 },
//!     "logging": { "level": "INFO" },
//!     "exhaust_fan": { "type": "Fan", "pin": 17 },
//!     "lid": { "type": "ToggleButton", "pin": 4 },
//!     "events": [
//!         { "device": "lid", "state": "on", "action": { "device": { "name": "exhaust_fan", "action": "on" } } }
//!     ],
//!     "actions": {
//!         "purge": [ { "device": "exhaust_fan", "action": "set", "value": 100 } ]
//!     }
//! }
//! ```
//!
//! Only an unreadable document aborts startup.  A malformed section or
//! device entry is recorded in [`Document::errors`] and skipped.

use core::cell::RefCell;
use core::time::Duration;

use log::warn;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConfigError, DeviceError};

/// Top-level keys that are not device declarations.
pub const RESERVED_KEYS: [&str; 6] = ["network", "actions", "chains", "context", "events", "logging"];

/// Default file the firmware reads at boot.
pub const DEFAULT_CONFIG_FILE: &str = "devices.json";

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const AP_DEFAULT_SSID: &str = "breadboard";
pub const AP_DEFAULT_PASSWORD: &str = "cheesplate";

// ───────────────────────────────────────────────────────────────
// network
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiMode {
    /// Join an existing network.
    Client,
    /// Host an access point.
    Ap,
}

/// Keys [`NetworkConfig`] reads; anything else is logged and ignored.
const NETWORK_KEYS: [&str; 8] = ["ssid", "password", "mode", "port", "host", "hosts", "docs", "logs"];

/// Connection parameters for the request server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub mode: Option<WifiMode>,
    pub port: u16,
    #[serde(alias = "hosts")]
    pub host: String,
    /// Serve `/docs`.
    pub docs: bool,
    /// Serve `/logs`.
    pub logs: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: None,
            password: None,
            mode: None,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_owned(),
            docs: true,
            logs: true,
        }
    }
}

impl NetworkConfig {
    /// Access-point mode when no SSID is given, client mode otherwise.
    pub fn effective_mode(&self) -> WifiMode {
        match (&self.ssid, self.mode) {
            (None, _) => WifiMode::Ap,
            (Some(_), Some(mode)) => mode,
            (Some(_), None) => WifiMode::Client,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ───────────────────────────────────────────────────────────────
// logging
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARNING")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn filter(self) -> log::LevelFilter {
        match self {
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warn => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
        }
    }
}

const LOGGING_KEYS: [&str; 3] = ["level", "serial", "buffer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Echo records to the serial console.
    pub serial: bool,
    /// Retain recent records for `/logs`.
    pub buffer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            serial: true,
            buffer: true,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Device entries
// ───────────────────────────────────────────────────────────────

/// One device declaration: `"name": { "type": "...", ...params }`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEntry {
    pub name: String,
    pub kind: String,
    pub params: Map<String, Value>,
}

// ───────────────────────────────────────────────────────────────
// Document
// ───────────────────────────────────────────────────────────────

/// The parsed configuration document, split into sections.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub network: Option<NetworkConfig>,
    pub logging: LoggingConfig,
    /// Reserved; carried but unused by the runtime.
    pub context: Option<Value>,
    /// Named chains in declaration order; steps are parsed when compiled.
    pub chains: Vec<(String, Vec<Value>)>,
    /// Event entries in declaration order; parsed when bindings are built.
    pub events: Vec<Value>,
    /// Device declarations in declaration order.
    pub devices: Vec<DeviceEntry>,
    /// Contained errors from malformed sections or entries.
    pub errors: Vec<ConfigError>,
}

impl Document {
    /// Parse a document.  Fails only if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(root) = value else {
            return Err(ConfigError::NotAnObject);
        };

        let mut doc = Self::default();
        for (key, value) in root {
            match key.as_str() {
                "network" => doc.network = doc.section("network", &NETWORK_KEYS, value),
                "logging" => doc.logging = doc.section("logging", &LOGGING_KEYS, value).unwrap_or_default(),
                "context" => doc.context = Some(value),
                "actions" | "chains" => doc.read_chains(value),
                "events" => doc.read_events(value),
                _ => doc.read_device(key, value),
            }
        }
        Ok(doc)
    }

    fn section<T: DeserializeOwned>(&mut self, section: &'static str, known: &[&str], value: Value) -> Option<T> {
        if value.is_null() {
            return None;
        }
        if let Value::Object(fields) = &value {
            for key in fields.keys().filter(|k| !known.contains(&k.as_str())) {
                warn!("`{section}`: unknown key `{key}` ignored");
            }
        }
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.errors.push(ConfigError::Section {
                    section,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn read_chains(&mut self, value: Value) {
        match value {
            Value::Object(chains) => {
                for (name, steps) in chains {
                    match steps {
                        Value::Array(steps) => self.chains.push((name, steps)),
                        _ => self.errors.push(ConfigError::Section {
                            section: "actions",
                            reason: format!("chain `{name}` must be a list of steps"),
                        }),
                    }
                }
            }
            Value::Null => {}
            _ => self.errors.push(ConfigError::Section {
                section: "actions",
                reason: "expected an object of named step lists".into(),
            }),
        }
    }

    fn read_events(&mut self, value: Value) {
        match value {
            Value::Array(events) => self.events.extend(events),
            Value::Null => {}
            _ => self.errors.push(ConfigError::Section {
                section: "events",
                reason: "expected a list of {device, state, action} entries".into(),
            }),
        }
    }

    fn read_device(&mut self, name: String, value: Value) {
        let Value::Object(mut params) = value else {
            self.errors.push(ConfigError::MissingType(name));
            return;
        };
        let kind = params.remove("type").or_else(|| params.remove("device"));
        match kind {
            Some(Value::String(kind)) => self.devices.push(DeviceEntry { name, kind, params }),
            _ => self.errors.push(ConfigError::MissingType(name)),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Typed parameter access
// ───────────────────────────────────────────────────────────────

/// Typed, tracked access to one device's parameters.
///
/// `null` counts as absent.  Keys never read are reported by
/// [`warn_unused`](Self::warn_unused).
pub struct Params<'a> {
    device: &'a str,
    map: &'a Map<String, Value>,
    seen: RefCell<Vec<&'static str>>,
}

impl<'a> Params<'a> {
    pub fn new(device: &'a str, map: &'a Map<String, Value>) -> Self {
        Self {
            device,
            map,
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &'a str {
        self.device
    }

    /// The raw value of `key`, if present.
    pub fn raw(&self, key: &'static str) -> Option<&'a Value> {
        self.seen.borrow_mut().push(key);
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>, DeviceError> {
        self.raw(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| DeviceError::InvalidParam {
                    param: key,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn require<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, DeviceError> {
        self.get(key)?.ok_or(DeviceError::MissingParam(key))
    }

    pub fn or<T: DeserializeOwned>(&self, key: &'static str, default: T) -> Result<T, DeviceError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// A strictly positive duration given in (fractional) seconds, at
    /// millisecond resolution.
    pub fn seconds_or(&self, key: &'static str, default: f32) -> Result<Duration, DeviceError> {
        let secs: f32 = self.or(key, default)?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(DeviceError::InvalidParam {
                param: key,
                reason: format!("must be a positive number of seconds, got {secs}"),
            });
        }
        // Millisecond resolution keeps 0.1 s an exact 100 ms.
        Ok(Duration::from_millis(((secs * 1000.0).round() as u64).max(1)))
    }

    /// Log every key the kind did not read.
    pub fn warn_unused(&self, kind: &str) {
        let seen = self.seen.borrow();
        for key in self.map.keys().filter(|k| !seen.contains(&k.as_str())) {
            warn!("{} `{}`: ignoring unknown parameter `{}`", kind, self.device, key);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
