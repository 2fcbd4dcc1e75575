//! Host-process side of the host-to-UI boundary: window delivery, setup
//! status broadcasting and the channel names both sides agree on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::connection::lock;
use crate::error::Result;
use crate::history::StatusHistory;

/// Request/response: the port the backend process listens on.
pub const PORT_CHANNEL: &str = "backend:get-port";
/// Push: setup status payloads.
pub const STATUS_CHANNEL: &str = "backend-setup:status";
/// Request/response: status history for windows opened late.
pub const STATUS_HISTORY_CHANNEL: &str = "backend-setup:get-history";
/// Push: streamed log lines.
pub const LOG_CHANNEL: &str = "backend:log";
/// Request/response: whether log streaming is on.
pub const LOG_STREAM_STATUS_CHANNEL: &str = "backend:log-stream-status";

/// Severity of a setup status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Error,
}

/// A remediation command suggested alongside a status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCommand {
    pub label: String,
    pub command: String,
}

/// Backend setup progress or failure, as pushed to UI windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub level: StatusLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<StatusCommand>>,
}

impl StatusPayload {
    /// Informational payload without commands.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            message: message.into(),
            commands: None,
        }
    }

    /// Error payload without commands.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            message: message.into(),
            commands: None,
        }
    }

    /// Attach commands the user can copy to fix the problem.
    pub fn with_commands(mut self, commands: Vec<StatusCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Equal level, message and commands, treating no commands as none listed.
    pub fn same_as(&self, other: &StatusPayload) -> bool {
        self.level == other.level
            && self.message == other.message
            && self.commands.as_deref().unwrap_or_default()
                == other.commands.as_deref().unwrap_or_default()
    }
}

/// A UI window the host process can push messages to.
pub trait HostWindow: Send + Sync {
    /// Whether the window has been closed and must not receive messages.
    fn is_destroyed(&self) -> bool;

    /// Deliver `payload` on `channel`.
    fn send(&self, channel: &str, payload: &Value) -> Result<()>;
}

/// The set of windows the host has opened. Cheap to clone.
#[derive(Clone, Default)]
pub struct WindowSet {
    windows: Arc<RwLock<Vec<Arc<dyn HostWindow>>>>,
}

impl WindowSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `window` for later sends.
    pub fn add(&self, window: Arc<dyn HostWindow>) {
        match self.windows.write() {
            Ok(mut w) => w.push(window),
            Err(poisoned) => poisoned.into_inner().push(window),
        }
    }

    /// Forget destroyed windows. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut windows = match self.windows.write() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = windows.len();
        windows.retain(|w| !w.is_destroyed());
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn HostWindow>> {
        match self.windows.read() {
            Ok(w) => w.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Send to every window that is still open. Destroyed windows are
    /// skipped; delivery failures are dropped. Returns the number of
    /// successful deliveries.
    pub fn send_all(&self, channel: &str, payload: &Value) -> usize {
        let mut delivered = 0;
        for window in self.snapshot() {
            if window.is_destroyed() {
                continue;
            }
            match window.send(channel, payload) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(channel, error = %e, "window delivery failed"),
            }
        }
        delivered
    }
}

/// Records setup status payloads and pushes them to open windows.
pub struct StatusBroadcaster {
    history: Mutex<StatusHistory>,
    windows: WindowSet,
}

impl StatusBroadcaster {
    /// Broadcaster over `windows` keeping `capacity` payloads of history.
    pub fn new(windows: WindowSet, capacity: usize) -> Self {
        Self {
            history: Mutex::new(StatusHistory::new(capacity)),
            windows,
        }
    }

    /// Append a copy of `payload` to the history without sending it.
    pub fn record(&self, payload: &StatusPayload) {
        lock(&self.history).record(payload);
    }

    /// Record, log, and push `payload` to every open window.
    ///
    /// Windows opened later do not get it from this call; they pull
    /// [`history()`](Self::history) on start.
    pub fn broadcast(&self, payload: &StatusPayload) -> Result<usize> {
        self.record(payload);

        match payload.level {
            StatusLevel::Error => error!("[Backend Setup][Error] {}", payload.message),
            StatusLevel::Info => info!("[Backend Setup][Info] {}", payload.message),
        }

        let value = serde_json::to_value(payload)?;
        Ok(self.windows.send_all(STATUS_CHANNEL, &value))
    }

    /// Snapshot of the history, oldest first, as served on
    /// [`STATUS_HISTORY_CHANNEL`].
    pub fn history(&self) -> Vec<StatusPayload> {
        lock(&self.history).to_vec()
    }

    /// Windows this broadcaster sends to.
    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }
}
