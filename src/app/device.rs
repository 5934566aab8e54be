//! Device model shared by every kind: operation tables, call arguments,
//! replies, and the state machine carried by stateful devices.
//!
//! A device exposes a finite, documented table of [`Operation`]s.  Callers
//! (routes, event actions, chains) pass [`Args`], a flat keyword map, and
//! receive a [`Reply`].  Stateful kinds additionally implement
//! [`Stateful`], the capability the polling loop drives.

use core::cell::Cell;
use core::ops::RangeInclusive;
use core::time::Duration;

use serde_json::{Map, Value};

use crate::error::{BindingError, OperationError, PreconditionError};

// ───────────────────────────────────────────────────────────────
// Operation tables
// ───────────────────────────────────────────────────────────────

/// One keyword parameter of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub doc: &'static str,
    pub required: bool,
}

impl Param {
    pub const fn required(name: &'static str, doc: &'static str) -> Self {
        Self { name, doc, required: true }
    }

    pub const fn optional(name: &'static str, doc: &'static str) -> Self {
        Self { name, doc, required: false }
    }
}

/// An externally callable operation of a device kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub doc: &'static str,
    pub params: &'static [Param],
}

impl Operation {
    pub const fn new(name: &'static str, doc: &'static str, params: &'static [Param]) -> Self {
        Self { name, doc, params }
    }

    /// Reject unknown keywords and missing required ones.
    pub fn check_args(&self, args: &Args) -> Result<(), OperationError> {
        if let Some(key) = args.keys().find(|k| !self.params.iter().any(|p| p.name == *k)) {
            return Err(OperationError::bad_request(format!(
                "`{}` takes no argument `{key}`",
                self.name
            )));
        }
        if let Some(p) = self.params.iter().find(|p| p.required && args.get(p.name).is_none()) {
            return Err(OperationError::bad_request(format!(
                "`{}` requires argument `{}`",
                self.name, p.name
            )));
        }
        Ok(())
    }

    /// Load-time form of [`check_args`](Self::check_args) for bound actions.
    pub fn check_binding(&self, device: &str, args: &Args) -> Result<(), BindingError> {
        if let Some(key) = args.keys().find(|k| !self.params.iter().any(|p| p.name == *k)) {
            return Err(BindingError::UnexpectedArgument {
                device: device.to_owned(),
                operation: self.name.to_owned(),
                argument: key.to_owned(),
            });
        }
        if let Some(p) = self.params.iter().find(|p| p.required && args.get(p.name).is_none()) {
            return Err(BindingError::MissingArgument {
                device: device.to_owned(),
                operation: self.name.to_owned(),
                argument: p.name,
            });
        }
        Ok(())
    }
}

/// Operation every stateful device exposes.
pub const STATE_OPERATION: Operation = Operation::new("state", "Get the current state of the device.", &[]);

// ───────────────────────────────────────────────────────────────
// Arguments
// ───────────────────────────────────────────────────────────────

/// Flat keyword arguments for one call.
///
/// Values arrive as strings from a query string or as JSON scalars from
/// the configuration document; the accessors accept either form, so a
/// bound action and the equivalent request behave identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded query pairs.  Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Value::String(v.into())))
                .collect(),
        )
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The arguments as a JSON object, for the response envelope.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// A string argument; numbers and booleans are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// An integer argument, parsed from a number or a numeric string.
    pub fn int(&self, key: &str) -> Result<Option<i64>, OperationError> {
        let Some(v) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            }
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| OperationError::bad_request(format!("`{key}` must be an integer, got {v}")))
    }

    /// An integer argument that must fall inside `range`.  Out-of-range
    /// values are rejected, never clamped.
    pub fn int_in(&self, key: &str, range: RangeInclusive<i64>) -> Result<Option<i64>, OperationError> {
        match self.int(key)? {
            Some(v) if !range.contains(&v) => Err(OperationError::bad_request(format!(
                "`{key}` must be between {} and {}, got {v}",
                range.start(),
                range.end()
            ))),
            other => Ok(other),
        }
    }

    /// A boolean flag: `true`, `"true"`, `"1"`, `"yes"`, non-zero numbers,
    /// and a bare query key (`?status`).
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "" | "true" | "1" | "yes"),
            _ => false,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Replies
// ───────────────────────────────────────────────────────────────

/// What an operation hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Structured result, wrapped in the JSON envelope by the router.
    Json(Value),
    /// Literal body content (HTML fragment), sent as-is.
    Text(String),
}

impl Reply {
    /// An empty JSON object.
    pub fn empty() -> Self {
        Self::Json(Value::Object(Map::new()))
    }

    pub fn state(state: &str) -> Self {
        Self::Json(serde_json::json!({ "state": state }))
    }
}

// ───────────────────────────────────────────────────────────────
// State machine
// ───────────────────────────────────────────────────────────────

/// The current state of one device, drawn from its fixed enumeration.
///
/// The enumeration is fixed at construction (per kind, or per instance for
/// kinds such as `Switch` whose states come from configuration).  The
/// current value is stored as an index, so it is always a member.
#[derive(Debug)]
pub struct StateMachine {
    device: String,
    states: Vec<String>,
    current: Cell<Option<usize>>,
}

impl StateMachine {
    pub fn new<S: Into<String>>(device: &str, states: impl IntoIterator<Item = S>) -> Self {
        Self {
            device: device.to_owned(),
            states: states.into_iter().map(Into::into).collect(),
            current: Cell::new(None),
        }
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// The current state.  Fails if no state has ever been assigned.
    pub fn state(&self) -> Result<&str, PreconditionError> {
        self.current
            .get()
            .map(|i| self.states[i].as_str())
            .ok_or_else(|| PreconditionError::StateUnset(self.device.clone()))
    }

    pub fn index(&self) -> Option<usize> {
        self.current.get()
    }

    /// Assign a state by name.  Returns whether the state changed.
    pub fn set(&self, state: &str) -> Result<bool, PreconditionError> {
        let idx = self
            .states
            .iter()
            .position(|s| s == state)
            .ok_or_else(|| PreconditionError::UnknownState {
                device: self.device.clone(),
                state: state.to_owned(),
            })?;
        Ok(self.set_index(idx))
    }

    /// Assign a state by position in the enumeration.  Returns whether the
    /// state changed.  Out-of-range indexes leave the state untouched.
    pub fn set_index(&self, idx: usize) -> bool {
        if idx >= self.states.len() {
            return false;
        }
        let changed = self.current.get() != Some(idx);
        self.current.set(Some(idx));
        changed
    }
}

// ───────────────────────────────────────────────────────────────
// Stateful capability
// ───────────────────────────────────────────────────────────────

/// Poll cadence for devices that sample an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    /// Extra sleep after a detected change, to suppress flicker.
    pub debounce: Option<Duration>,
}

/// Capability of devices that carry a state machine.
pub trait Stateful {
    fn state_machine(&self) -> &StateMachine;

    /// Sample the input and apply the kind's transition rule.  Returns
    /// whether the state changed.  Devices whose state only changes through
    /// their own operations keep the default.
    fn recompute_state(&self) -> Result<bool, OperationError> {
        Ok(false)
    }

    /// `Some` for kinds that poll an input in their run loop.
    fn poll_timing(&self) -> Option<PollTiming> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SET: Operation = Operation::new(
        "set",
        "Set a value.",
        &[Param::required("value", "0-100"), Param::optional("fade", "ms")],
    );

    #[test]
    fn state_read_before_assignment_fails() {
        let sm = StateMachine::new("button", ["off", "on"]);
        assert_eq!(sm.state(), Err(PreconditionError::StateUnset("button".into())));
    }

    #[test]
    fn set_reports_change_only_on_transition() {
        let sm = StateMachine::new("button", ["off", "on"]);
        assert!(sm.set("off").unwrap());
        assert!(!sm.set("off").unwrap());
        assert!(sm.set("on").unwrap());
        assert_eq!(sm.state().unwrap(), "on");
    }

    #[test]
    fn unknown_state_is_rejected_and_state_kept() {
        let sm = StateMachine::new("button", ["off", "on"]);
        sm.set("on").unwrap();
        assert!(sm.set("blinking").is_err());
        assert_eq!(sm.state().unwrap(), "on");
    }

    #[test]
    fn int_accepts_strings_and_numbers() {
        let mut args = Args::from_pairs([("value", "42")]);
        assert_eq!(args.int("value").unwrap(), Some(42));
        args.insert("value", 17);
        assert_eq!(args.int("value").unwrap(), Some(17));
        args.insert("value", "fast");
        assert!(matches!(args.int("value"), Err(OperationError::BadRequest(_))));
        assert_eq!(args.int("missing").unwrap(), None);
    }

    #[test]
    fn int_in_rejects_out_of_range() {
        let args = Args::from_pairs([("value", "150")]);
        assert!(matches!(args.int_in("value", 0..=100), Err(OperationError::BadRequest(_))));
        let args = Args::from_pairs([("value", "100")]);
        assert_eq!(args.int_in("value", 0..=100).unwrap(), Some(100));
    }

    #[test]
    fn flag_parses_common_spellings() {
        let args = Args::from_pairs([("a", "true"), ("b", "0"), ("c", "YES"), ("e", "")]);
        assert!(args.flag("a"));
        assert!(!args.flag("b"));
        assert!(args.flag("c"));
        assert!(!args.flag("d"));
        assert!(args.flag("e"));
    }

    #[test]
    fn check_args_rejects_unknown_and_missing() {
        assert!(SET.check_args(&Args::from_pairs([("value", "1")])).is_ok());
        assert!(SET.check_args(&Args::from_pairs([("value", "1"), ("speed", "2")])).is_err());
        assert!(SET.check_args(&Args::from_pairs([("fade", "1")])).is_err());
    }

    #[test]
    fn check_binding_names_the_argument() {
        let err = SET
            .check_binding("fan", &Args::from_pairs([("value", "1"), ("colour", "red")]))
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::UnexpectedArgument {
                device: "fan".into(),
                operation: "set".into(),
                argument: "colour".into(),
            }
        );
    }
}
