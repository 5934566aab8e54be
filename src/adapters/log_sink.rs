//! Log sink: the global `log` backend.
//!
//! Every record is rendered once as a single JSON line:
//!
//! ```text
//! {"uptime":12.503,"level":"error","target":"breadboard::api::router","message":"404 /nope from 10.0.0.7:51234"}
//! ```
//!
//! and written to the serial console (stdout, which is the UART on the
//! target) and/or a fixed-capacity ring of recent lines served on
//! `/logs`.  The ring lives behind an `Arc<Mutex<_>>` because `log::Log`
//! must be `Sync`; the executor itself is single-threaded.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use heapless::{Deque, String as HString};
use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LoggingConfig;

/// Retained lines.
pub const LOG_LINES: usize = 48;
/// Bytes kept per line; longer lines are cut at a char boundary.
pub const LINE_BYTES: usize = 192;

type Line = HString<LINE_BYTES>;

/// Shared handle to the ring of recent log lines.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<Deque<Line, LOG_LINES>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&self, text: &str) {
        let mut line = Line::new();
        for ch in text.chars() {
            if line.push(ch).is_err() {
                break;
            }
        }
        let Ok(mut ring) = self.lines.lock() else {
            return;
        };
        if ring.is_full() {
            ring.pop_front();
        }
        // cannot fail: a slot was just freed
        let _ = ring.push_back(line);
    }

    /// Retained lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|ring| ring.iter().map(|l| l.as_str().to_owned()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().map(|ring| ring.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `log::Log` implementation writing JSON lines to serial and the ring.
pub struct RingLogger {
    level: LevelFilter,
    serial: bool,
    buffer: Option<LogBuffer>,
    started: Instant,
}

impl RingLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.filter(),
            serial: config.serial,
            buffer: config.buffer.then(LogBuffer::new),
            started: Instant::now(),
        }
    }

    /// Handle to the ring, if buffering is enabled.
    pub fn buffer(&self) -> Option<LogBuffer> {
        self.buffer.clone()
    }

    /// Render one record as a JSON line.
    pub fn format(&self, record: &Record<'_>) -> String {
        serde_json::json!({
            "uptime": (self.started.elapsed().as_millis() as f64) / 1000.0,
            "level": record.level().as_str().to_ascii_lowercase(),
            "target": record.target(),
            "message": record.args().to_string(),
        })
        .to_string()
    }

    /// Install as the global logger.  Returns the ring handle.
    pub fn install(self) -> Result<Option<LogBuffer>, log::SetLoggerError> {
        let buffer = self.buffer();
        let level = self.level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(level);
        Ok(buffer)
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.format(record);
        if self.serial {
            println!("{line}");
        }
        if let Some(buffer) = &self.buffer {
            buffer.push(&line);
        }
    }

    fn flush(&self) {}
}
