//! Error types for the breadboard runtime.
//!
//! Every failure is contained at the smallest enclosing unit: one device,
//! one chain, one request.  The enums below mirror those boundaries.
//!
//! | Type                | Raised by                    | Contained at              |
//! |---------------------|------------------------------|---------------------------|
//! | [`ConfigError`]     | document / section parsing   | startup (whole document)  |
//! | [`DeviceError`]     | device construction          | tolerant factory          |
//! | [`BindingError`]    | event / chain resolution     | one binding or chain      |
//! | [`OperationError`]  | operations, actions, routes  | one request / action list |
//! | [`PreconditionError`] | state access, bad mode     | call site                 |
//! | [`HalError`]        | hardware ports               | wrapped by the above      |

use core::fmt;

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

/// Failure reported by a hardware port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    /// A GPIO or PWM pin could not be configured or driven.
    Pin { pin: u8, code: i32 },
    /// A bus transaction (I2C, UART, RMT) failed.
    Bus(String),
    /// No device answered on the bus.
    NotFound,
    /// The peripheral is not available on this target.
    Unsupported(&'static str),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin { pin, code } => write!(f, "pin {pin} failed (rc={code})"),
            Self::Bus(msg) => write!(f, "bus error: {msg}"),
            Self::NotFound => write!(f, "no device found on bus"),
            Self::Unsupported(what) => write!(f, "{what} is not supported on this target"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// The configuration document, or one of its sections, is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document is not valid JSON.
    Parse(String),
    /// The top level of the document is not an object.
    NotAnObject,
    /// A reserved section has the wrong shape.
    Section { section: &'static str, reason: String },
    /// A device entry has no `type` key.
    MissingType(String),
    /// A device entry names a kind with no registered factory.
    UnknownDeviceKind { name: String, kind: String },
    /// An action object uses a key other than `webhook` or `device`.
    UnknownActionKind(String),
    /// An action object is not a single-key object with an object value.
    MalformedAction(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "configuration is not valid JSON: {msg}"),
            Self::NotAnObject => write!(f, "configuration must be a JSON object"),
            Self::Section { section, reason } => write!(f, "invalid `{section}` section: {reason}"),
            Self::MissingType(name) => write!(f, "device `{name}` has no `type`"),
            Self::UnknownDeviceKind { name, kind } => {
                write!(f, "device `{name}` has unknown type `{kind}`")
            }
            Self::UnknownActionKind(kind) => write!(f, "unknown action kind `{kind}`"),
            Self::MalformedAction(reason) => write!(f, "malformed action: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Device construction errors
// ---------------------------------------------------------------------------

/// A device could not be constructed from its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// A required parameter is absent.
    MissingParam(&'static str),
    /// A parameter is present but has the wrong type or value.
    InvalidParam { param: &'static str, reason: String },
    /// The declared wiring is not supported (e.g. 8-bit LCD bus).
    Unsupported(String),
    /// The hardware refused to initialise.
    Hardware(HalError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParam(p) => write!(f, "missing required parameter `{p}`"),
            Self::InvalidParam { param, reason } => write!(f, "invalid parameter `{param}`: {reason}"),
            Self::Unsupported(msg) => write!(f, "unsupported configuration: {msg}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
        }
    }
}

impl From<HalError> for DeviceError {
    fn from(e: HalError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Binding resolution errors
// ---------------------------------------------------------------------------

/// An event or chain step references something that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    UnknownDevice(String),
    UnknownOperation { device: String, operation: String },
    UnexpectedArgument { device: String, operation: String, argument: String },
    MissingArgument { device: String, operation: String, argument: &'static str },
    InvalidUrl(String),
    /// A webhook URL with a scheme other than `http`, e.g. `https`.
    UnsupportedScheme { url: String, scheme: String },
    Config(ConfigError),
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDevice(d) => write!(f, "unknown device `{d}`"),
            Self::UnknownOperation { device, operation } => {
                write!(f, "device `{device}` has no operation `{operation}`")
            }
            Self::UnexpectedArgument { device, operation, argument } => {
                write!(f, "`{device}.{operation}` takes no argument `{argument}`")
            }
            Self::MissingArgument { device, operation, argument } => {
                write!(f, "`{device}.{operation}` requires argument `{argument}`")
            }
            Self::InvalidUrl(url) => write!(f, "could not parse address `{url}`"),
            Self::UnsupportedScheme { url, scheme } => {
                write!(f, "`{url}`: {scheme} is not supported, use http://")
            }
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for BindingError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Precondition errors
// ---------------------------------------------------------------------------

/// A programming or configuration error detected at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// The state of `device` was read before it was ever assigned.
    StateUnset(String),
    /// `state` is not a member of the device's state enumeration.
    UnknownState { device: String, state: String },
    /// A mode or coordinate outside what the hardware supports.
    Unsupported(String),
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateUnset(device) => write!(f, "a state must be set on `{device}` before it is read"),
            Self::UnknownState { device, state } => {
                write!(f, "`{state}` is not a state of `{device}`")
            }
            Self::Unsupported(msg) => write!(f, "{msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime operation errors
// ---------------------------------------------------------------------------

/// An operation, action, or route handler failed while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The caller supplied missing, unknown, or out-of-range arguments.
    BadRequest(String),
    Precondition(PreconditionError),
    Hardware(HalError),
    /// Any other runtime failure.
    Failed(String),
}

impl OperationError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Precondition(e) => write!(f, "precondition failed: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<HalError> for OperationError {
    fn from(e: HalError) -> Self {
        Self::Hardware(e)
    }
}

impl From<PreconditionError> for OperationError {
    fn from(e: PreconditionError) -> Self {
        Self::Precondition(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_device() {
        let e = PreconditionError::StateUnset("fan".into());
        assert!(e.to_string().contains("`fan`"));
    }

    #[test]
    fn hal_error_converts_into_operation_error() {
        let e: OperationError = HalError::NotFound.into();
        assert_eq!(e, OperationError::Hardware(HalError::NotFound));
    }

    #[test]
    fn binding_error_wraps_config_error() {
        let e: BindingError = ConfigError::UnknownActionKind("email".into()).into();
        assert_eq!(e.to_string(), "unknown action kind `email`");
    }
}
