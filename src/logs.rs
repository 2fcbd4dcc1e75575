//! Log streaming from the host process to UI windows.
//!
//! [`LogStreamLayer`] plugs into a `tracing_subscriber` registry next to the
//! usual formatting layer. While streaming is on, every event is also pushed
//! to open windows as a [`LogEntry`] on [`LOG_CHANNEL`].

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::host::{WindowSet, LOG_CHANNEL};

/// Severity of a streamed log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warn,
            Level::INFO => LogLevel::Info,
            _ => LogLevel::Log,
        }
    }
}

/// One log line as delivered to windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl LogEntry {
    /// Entry stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// On/off switch for log streaming, shared by the layer and the host.
#[derive(Clone)]
pub struct LogStreamer {
    streaming: Arc<AtomicBool>,
    windows: WindowSet,
}

impl LogStreamer {
    /// Streamer over `windows`, initially off.
    pub fn new(windows: WindowSet) -> Self {
        Self {
            streaming: Arc::new(AtomicBool::new(false)),
            windows,
        }
    }

    /// Turn streaming on. Returns `false` if it already was.
    pub fn start(&self) -> bool {
        !self.streaming.swap(true, Ordering::SeqCst)
    }

    /// Turn streaming off. Returns `false` if it already was.
    pub fn stop(&self) -> bool {
        self.streaming.swap(false, Ordering::SeqCst)
    }

    /// Whether log lines are currently forwarded.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Push `entry` to open windows if streaming is on.
    pub fn send(&self, entry: &LogEntry) -> usize {
        if !self.is_streaming() {
            return 0;
        }
        match serde_json::to_value(entry) {
            Ok(value) => self.windows.send_all(LOG_CHANNEL, &value),
            Err(_) => 0,
        }
    }

    /// A `tracing` layer feeding this streamer.
    pub fn layer(&self) -> LogStreamLayer {
        LogStreamLayer {
            streamer: self.clone(),
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

/// `tracing_subscriber` layer that forwards events through a [`LogStreamer`].
pub struct LogStreamLayer {
    streamer: LogStreamer,
}

impl<S: Subscriber> Layer<S> for LogStreamLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.streamer.is_streaming() {
            return;
        }
        // Delivery itself may log; do not feed those events back in.
        if FORWARDING.with(|f| f.replace(true)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let entry = LogEntry::new(
            LogLevel::from(*event.metadata().level()),
            format!("{}{}", visitor.message, visitor.fields),
        );
        self.streamer.send(&entry);

        FORWARDING.with(|f| f.set(false));
    }
}

/// Renderer-side buffer keeping the newest log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    logs: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    /// Empty buffer keeping at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `entry`, evicting the oldest past capacity.
    pub fn push(&mut self, entry: LogEntry) {
        self.logs.push_back(entry);
        while self.logs.len() > self.capacity {
            self.logs.pop_front();
        }
    }

    /// Lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter()
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.logs.clear();
    }
}
