//! User-visible notifications for failures caught at call sites.
//!
//! Mutations and queries surface their errors here instead of propagating
//! them into the connection or subscription layers.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient toast-style message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(title: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
        }
    }

    /// Error notification describing `err`; HTTP errors show the response body.
    pub fn from_error(title: impl Into<String>, err: &LinkError) -> Self {
        let description = match err {
            LinkError::Http { status, body } if body.is_empty() => {
                format!("Backend returned HTTP {}", status)
            }
            LinkError::Http { body, .. } => body.clone(),
            other => other.to_string(),
        };
        Self::new(title, description, Severity::Error)
    }
}

/// Sending half of the notification queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Create a notifier and the receiver the UI drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `notification` for the UI. Dropped if nobody listens.
    pub fn notify(&self, notification: Notification) {
        // A closed receiver means no UI is listening any more.
        let _ = self.tx.send(notification);
    }

    /// Turn an error into an error notification and hand back the value
    /// on success.
    pub fn catch<T>(&self, title: &str, result: crate::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(title, error = %e, "operation failed");
                self.notify(Notification::from_error(title, &e));
                None
            }
        }
    }
}
