//! Event and chain wiring.
//!
//! ```text
//!   "events": [{device, state, action}]        "chains": {name: [step]}
//!         │ Action::parse_many                       │ Chain::compile
//!         ▼                                          ▼
//!   EventTable  device → state → [Action]      Chain [Action] ──▶ /action/<name>
//!         │ dispatch(device, state)                  │ run()
//!         └────────────── Action::execute ◀──────────┘
//! ```
//!
//! Device-call targets are resolved against the [`Registry`] while the
//! configuration is wired, so a dangling reference is a [`BindingError`]
//! at load and never a surprise at run time.  Action lists run strictly
//! in order; the first failure ends that list and is logged.

use core::cell::OnceCell;
use core::fmt;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, error, warn};
use serde_json::{Map, Value};

use crate::app::device::{Args, Reply};
use crate::app::ports::{LocalBoxFuture, Notifier};
use crate::devices::{Device, Registry};
use crate::error::{BindingError, ConfigError, OperationError};

/// Port a webhook URL without one is sent to.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// What actions are resolved against while the configuration is wired.
#[derive(Clone)]
pub struct Binder<'a> {
    pub registry: &'a Registry,
    pub notifier: Rc<dyn Notifier>,
}

// ───────────────────────────────────────────────────────────────
// Actions
// ───────────────────────────────────────────────────────────────

/// Best-effort outbound `GET`.
pub struct Webhook {
    host: String,
    port: u16,
    path: String,
    notifier: Rc<dyn Notifier>,
}

impl Webhook {
    pub fn new(url: &str, notifier: Rc<dyn Notifier>) -> Result<Self, BindingError> {
        if let Some((scheme, _)) = url.split_once("://") {
            if !scheme.eq_ignore_ascii_case("http") {
                return Err(BindingError::UnsupportedScheme {
                    url: url.to_owned(),
                    scheme: scheme.to_ascii_lowercase(),
                });
            }
        }
        let (host, port, path) = parse_url(url).ok_or_else(|| BindingError::InvalidUrl(url.to_owned()))?;
        Ok(Self {
            host,
            port,
            path,
            notifier,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Send the request.  Failures are logged, never returned.
    pub async fn send(&self) {
        debug!("webhook: GET {} on {}:{}", self.path, self.host, self.port);
        if let Err(e) = self.notifier.get(&self.host, self.port, &self.path).await {
            error!("webhook {}:{}{} failed: {}", self.host, self.port, self.path, e);
        }
    }
}

/// Split `http://host[:port]/path`.  A missing path is `/`.
pub fn parse_url(url: &str) -> Option<(String, u16, String)> {
    let rest = url.strip_prefix("http://")?;
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (authority, DEFAULT_HTTP_PORT),
    };
    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }
    Some((host.to_owned(), port, path.to_owned()))
}

/// An operation bound to a live device with fixed keyword arguments.
pub struct DeviceCall {
    device: Rc<Device>,
    operation: &'static str,
    args: Args,
}

impl DeviceCall {
    /// Resolve `device.operation(args)` against the registry.
    pub fn bind(registry: &Registry, device: &str, operation: &str, args: Args) -> Result<Self, BindingError> {
        let target = registry
            .get(device)
            .ok_or_else(|| BindingError::UnknownDevice(device.to_owned()))?;
        let op = target.operation(operation).ok_or_else(|| BindingError::UnknownOperation {
            device: device.to_owned(),
            operation: operation.to_owned(),
        })?;
        op.check_binding(device, &args)?;
        Ok(Self {
            device: target.clone(),
            operation: op.name,
            args,
        })
    }

    pub fn device(&self) -> &str {
        self.device.name()
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub async fn invoke(&self) -> Result<Reply, OperationError> {
        self.device.call(self.operation, &self.args).await
    }
}

/// One unit of work run by an event binding or a chain.
pub enum Action {
    RemoteNotify(Webhook),
    DeviceCall(DeviceCall),
}

impl Action {
    /// Parse one single-key action object: `{"webhook": {"url": ..}}` or
    /// `{"device": {"name": .., "action": .., ...kwargs}}`.
    pub fn parse(spec: &Value, binder: &Binder<'_>) -> Result<Self, BindingError> {
        let Value::Object(obj) = spec else {
            return Err(ConfigError::MalformedAction(format!("expected an object, got {spec}")).into());
        };
        let mut keys = obj.iter();
        let (Some((kind, body)), None) = (keys.next(), keys.next()) else {
            return Err(ConfigError::MalformedAction("an action has exactly one key".into()).into());
        };
        let Value::Object(body) = body else {
            return Err(ConfigError::MalformedAction(format!("`{kind}` must map to an object")).into());
        };

        match kind.as_str() {
            "webhook" => {
                let url = body
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ConfigError::MalformedAction("`webhook` needs a `url`".into()))?;
                Ok(Self::RemoteNotify(Webhook::new(url, binder.notifier.clone())?))
            }
            "device" => {
                let mut kwargs = body.clone();
                let name = take_str(&mut kwargs, "name", "device")?;
                let action = take_str(&mut kwargs, "action", "device")?;
                Ok(Self::DeviceCall(DeviceCall::bind(
                    binder.registry,
                    &name,
                    &action,
                    Args::from_map(kwargs),
                )?))
            }
            other => Err(ConfigError::UnknownActionKind(other.to_owned()).into()),
        }
    }

    /// Parse one action object or a list of them.
    pub fn parse_many(spec: &Value, binder: &Binder<'_>) -> Result<Vec<Self>, BindingError> {
        match spec {
            Value::Array(items) => items.iter().map(|item| Self::parse(item, binder)).collect(),
            single => Ok(vec![Self::parse(single, binder)?]),
        }
    }

    /// Run the action.  Boxed because a device call may itself dispatch
    /// events that run further actions.
    pub fn execute(&self) -> LocalBoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            match self {
                Self::RemoteNotify(hook) => {
                    hook.send().await;
                    Ok(())
                }
                Self::DeviceCall(call) => call.invoke().await.map(drop),
            }
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteNotify(hook) => write!(f, "GET http://{}:{}{}", hook.host, hook.port, hook.path),
            Self::DeviceCall(call) => {
                write!(f, "{}.{}(", call.device(), call.operation)?;
                for (i, key) in call.args.keys().enumerate() {
                    let sep = if i == 0 { "" } else { ", " };
                    write!(f, "{sep}{key}={}", call.args.text(key).unwrap_or_default())?;
                }
                write!(f, ")")
            }
        }
    }
}

fn take_str(map: &mut Map<String, Value>, key: &'static str, kind: &str) -> Result<String, ConfigError> {
    match map.remove(key) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(ConfigError::MalformedAction(format!("`{kind}` needs a string `{key}`"))),
    }
}

// ───────────────────────────────────────────────────────────────
// Event table
// ───────────────────────────────────────────────────────────────

/// device → state → ordered actions.  Immutable once built.
#[derive(Default)]
pub struct EventTable {
    bindings: HashMap<String, HashMap<String, Vec<Action>>>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `events` section.  An entry that fails to resolve is
    /// logged and dropped; the rest still bind.
    pub fn build(entries: &[Value], binder: &Binder<'_>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            let (Some(device), Some(state), Some(action)) = (
                entry.get("device").and_then(Value::as_str),
                entry.get("state").and_then(Value::as_str),
                entry.get("action"),
            ) else {
                let e = ConfigError::Section {
                    section: "events",
                    reason: format!("entry {entry} needs `device`, `state` and `action`"),
                };
                error!("event dropped: {e}");
                continue;
            };

            match Action::parse_many(action, binder) {
                Ok(actions) => {
                    check_source(binder.registry, device, state);
                    table.bind(device, state, actions);
                }
                Err(e) => error!("event `{device}` → `{state}` dropped: {e}"),
            }
        }
        table
    }

    /// Append actions to a binding, after any already bound.
    pub fn bind(&mut self, device: &str, state: &str, actions: Vec<Action>) {
        self.bindings
            .entry(device.to_owned())
            .or_default()
            .entry(state.to_owned())
            .or_default()
            .extend(actions);
    }

    pub fn actions(&self, device: &str, state: &str) -> &[Action] {
        self.bindings
            .get(device)
            .and_then(|states| states.get(state))
            .map_or(&[], Vec::as_slice)
    }

    /// Number of (device, state) pairs with a binding.
    pub fn len(&self) -> usize {
        self.bindings.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the actions bound to `device` entering `state`, in order.  The
    /// first failure ends this list only.
    pub async fn dispatch(&self, device: &str, state: &str) {
        let actions = self.actions(device, state);
        for (i, action) in actions.iter().enumerate() {
            if let Err(e) = action.execute().await {
                error!(
                    "`{device}` → `{state}`: `{action}` failed, skipping {} remaining: {e}",
                    actions.len() - i - 1
                );
                return;
            }
        }
    }
}

/// Warn about bindings that can never fire.
fn check_source(registry: &Registry, device: &str, state: &str) {
    let Some(source) = registry.get(device) else {
        warn!("event source `{device}` is not a loaded device");
        return;
    };
    match source.as_stateful() {
        Some(s) if !s.state_machine().states().iter().any(|st| st == state) => {
            warn!("event for `{device}` names `{state}`, which is not one of its states");
        }
        None => warn!("event source `{device}` has no state"),
        _ => {}
    }
}

/// A device's handle on the event table, for state changes its own
/// operations cause.  Attached once, when the device's task starts.
#[derive(Default)]
pub struct EventLink {
    table: OnceCell<Weak<EventTable>>,
}

impl EventLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, device: &str, events: &Rc<EventTable>) {
        if self.table.set(Rc::downgrade(events)).is_err() {
            debug!("`{device}`: event table already attached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.table.get().is_some()
    }

    /// Run the actions bound to `device` entering `state`.
    pub async fn emit(&self, device: &str, state: &str) {
        debug!("`{device}` state changed to `{state}`");
        if let Some(events) = self.table.get().and_then(Weak::upgrade) {
            events.dispatch(device, state).await;
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Chains
// ───────────────────────────────────────────────────────────────

/// A named, externally triggered sequence of device calls.
pub struct Chain {
    name: String,
    steps: Vec<Action>,
}

impl Chain {
    /// Compile `[{device, action, ...kwargs}]`.  Any unresolved step fails
    /// the whole chain.
    pub fn compile(name: &str, steps: &[Value], binder: &Binder<'_>) -> Result<Self, BindingError> {
        let steps = steps
            .iter()
            .map(|step| {
                let Value::Object(step) = step else {
                    return Err(ConfigError::MalformedAction(format!("chain step must be an object, got {step}")).into());
                };
                let mut kwargs = step.clone();
                let device = take_str(&mut kwargs, "device", "step")?;
                let action = take_str(&mut kwargs, "action", "step")?;
                DeviceCall::bind(binder.registry, &device, &action, Args::from_map(kwargs)).map(Action::DeviceCall)
            })
            .collect::<Result<Vec<_>, BindingError>>()?;
        Ok(Self {
            name: name.to_owned(),
            steps,
        })
    }

    /// [`compile`](Self::compile), logging one error naming the chain on
    /// failure.
    pub fn try_compile(name: &str, steps: &[Value], binder: &Binder<'_>) -> Option<Self> {
        match Self::compile(name, steps, binder) {
            Ok(chain) => Some(chain),
            Err(e) => {
                error!("chain `{name}` dropped: {e}");
                None
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self) -> Result<(), OperationError> {
        for step in &self.steps {
            step.execute().await?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
