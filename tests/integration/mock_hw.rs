//! Shared rig for integration tests.
//!
//! Loads a configuration on a [`SimBoard`] with a manual clock, records
//! every outbound webhook, and captures log records per test thread so
//! tests can assert on what was reported.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Once;

use breadboard::adapters::hardware::SimBoard;
use breadboard::adapters::log_sink::LogBuffer;
use breadboard::app::device::{Args, Reply};
use breadboard::app::ports::{LocalBoxFuture, Notifier};
use breadboard::app::supervisor::{Environment, Supervisor};
use breadboard::devices::Device;
use breadboard::error::OperationError;
use breadboard::scheduler::Runtime;
use log::{Level, LevelFilter, Log, Metadata, Record};

// ── Log capture ───────────────────────────────────────────────

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct Capture;

impl Log for Capture {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.with(|r| r.borrow_mut().push((record.level(), record.args().to_string())));
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;
static INSTALL: Once = Once::new();

/// Install the capturing logger (once per process) and forget what this
/// thread logged so far.
pub fn capture_logs() {
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    RECORDS.with(|r| r.borrow_mut().clear());
}

/// Messages this thread logged at exactly `level`.
pub fn logged(level: Level) -> Vec<String> {
    RECORDS.with(|r| {
        r.borrow()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    })
}

pub fn errors_mentioning(needle: &str) -> Vec<String> {
    logged(Level::Error).into_iter().filter(|m| m.contains(needle)).collect()
}

// ── Notifier ──────────────────────────────────────────────────

/// Records every GET; refuses them all when `refuse` is set.
#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: RefCell<Vec<String>>,
    pub refuse: bool,
}

impl Notifier for RecordingNotifier {
    fn get<'a>(&'a self, host: &'a str, port: u16, path: &'a str) -> LocalBoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            self.calls.borrow_mut().push(format!("{host}:{port}{path}"));
            if self.refuse {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
            }
            Ok(())
        })
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub board: SimBoard,
    pub notifier: Rc<RecordingNotifier>,
    pub logs: LogBuffer,
    pub supervisor: Supervisor,
}

#[allow(dead_code)]
impl Rig {
    pub fn load(config: &str) -> Self {
        Self::with_notifier(config, RecordingNotifier::default())
    }

    pub fn with_notifier(config: &str, notifier: RecordingNotifier) -> Self {
        capture_logs();
        let board = SimBoard::new();
        let notifier = Rc::new(notifier);
        let logs = LogBuffer::new();
        let env = Environment {
            hardware: Rc::new(board.clone()),
            notifier: notifier.clone(),
            logs: Some(logs.clone()),
        };
        let supervisor = Supervisor::from_json(config, &env, Runtime::simulated()).expect("config parses");
        Self {
            board,
            notifier,
            logs,
            supervisor,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        self.supervisor.runtime()
    }

    pub fn device(&self, name: &str) -> Rc<Device> {
        self.supervisor
            .registry()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("`{name}` not loaded"))
    }

    pub fn state(&self, name: &str) -> String {
        let device = self.device(name);
        let stateful = device.as_stateful().expect("stateful device");
        stateful.state_machine().state().expect("state set").to_owned()
    }

    /// Call an operation directly, bypassing the router.
    pub fn call(&self, device: &str, op: &'static str, args: Args) -> Result<Reply, OperationError> {
        let device = self.device(device);
        self.runtime().block_on(async move { device.call(op, &args).await })
    }

    /// Send one raw HTTP request through the router; returns the raw reply.
    pub fn request(&self, path_and_query: &str) -> String {
        let router = self.supervisor.router().expect("network configured").clone();
        let request = format!("GET {path_and_query} HTTP/1.1\r\nHost: test\r\n\r\n");
        let out = self.runtime().block_on(async move {
            let mut out = Vec::new();
            router.handle(request.as_bytes(), &mut out, "10.0.0.9").await;
            out
        });
        String::from_utf8(out).expect("utf-8 reply")
    }
}

/// Status code of a raw reply.
pub fn status(reply: &str) -> u16 {
    reply
        .split(' ')
        .nth(1)
        .and_then(|code| code.parse().ok())
        .expect("status line")
}

/// Body of a raw reply.
pub fn body(reply: &str) -> &str {
    reply.split_once("\r\n\r\n").map_or("", |(_, body)| body)
}

pub fn json_body(reply: &str) -> serde_json::Value {
    serde_json::from_str(body(reply)).expect("JSON body")
}
