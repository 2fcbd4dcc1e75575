use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::host::StatusPayload;

/// Bounded, oldest-first record of broadcast status payloads.
///
/// Every recorded payload is an independent copy, so later changes to the
/// caller's value (including its command list) never reach the history.
#[derive(Debug, Clone)]
pub struct StatusHistory {
    entries: VecDeque<StatusPayload>,
    capacity: usize,
}

impl StatusHistory {
    /// Empty history keeping at most `capacity` payloads.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a copy of `payload`, evicting the oldest past capacity.
    pub fn record(&mut self, payload: &StatusPayload) {
        self.entries.push_back(payload.clone());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Borrowing read path, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &StatusPayload> {
        self.entries.iter()
    }

    /// Owned copy, oldest first.
    pub fn to_vec(&self) -> Vec<StatusPayload> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A status payload as shown in the renderer, stamped on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupStatusEntry {
    #[serde(flatten)]
    pub payload: StatusPayload,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Renderer-side list of setup messages.
///
/// Consecutive duplicates are collapsed, which matters because a window
/// replays the host history and may then receive the same payload live.
#[derive(Debug, Clone)]
pub struct SetupStatusLog {
    entries: VecDeque<SetupStatusEntry>,
    capacity: usize,
}

impl SetupStatusLog {
    /// Empty log keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `payload` unless it repeats the last entry. Returns `true` if added.
    pub fn add(&mut self, payload: StatusPayload) -> bool {
        if self.entries.back().is_some_and(|last| last.payload.same_as(&payload)) {
            return false;
        }
        self.entries.push_back(SetupStatusEntry {
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &SetupStatusEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{StatusCommand, StatusLevel};

    fn info(message: &str) -> StatusPayload {
        StatusPayload::info(message)
    }

    #[test]
    fn test_keeps_last_hundred_oldest_first() {
        let mut history = StatusHistory::new(100);
        for i in 0..150 {
            history.record(&info(&format!("step {}", i)));
        }

        assert_eq!(history.len(), 100);
        let messages: Vec<_> = history.iter().map(|p| p.message.clone()).collect();
        assert_eq!(messages.first().map(String::as_str), Some("step 50"));
        assert_eq!(messages.last().map(String::as_str), Some("step 149"));
    }

    #[test]
    fn test_entries_are_independent_copies() {
        let mut history = StatusHistory::new(100);
        let mut payload = StatusPayload::error("uv is not installed").with_commands(vec![
            StatusCommand {
                label: "Install with shell script".into(),
                command: "curl -LsSf https://astral.sh/uv/install.sh | sh".into(),
            },
        ]);
        history.record(&payload);

        if let Some(commands) = payload.commands.as_mut() {
            commands[0].command = "rm -rf /".into();
            commands.push(StatusCommand {
                label: "extra".into(),
                command: "true".into(),
            });
        }
        payload.message = "changed".into();

        let stored = history.iter().next().unwrap();
        assert_eq!(stored.level, StatusLevel::Error);
        assert_eq!(stored.message, "uv is not installed");
        let commands = stored.commands.as_ref().unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].command, "curl -LsSf https://astral.sh/uv/install.sh | sh");
    }

    #[test]
    fn test_setup_log_collapses_duplicates() {
        let mut log = SetupStatusLog::new(100);
        assert!(log.add(info("Cloning backend")));
        assert!(!log.add(info("Cloning backend")));
        assert!(log.add(StatusPayload::error("Cloning backend")));
        assert!(log.add(info("Cloning backend")));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_setup_log_is_capped() {
        let mut log = SetupStatusLog::new(3);
        for i in 0..5 {
            log.add(info(&format!("line {}", i)));
        }
        let messages: Vec<_> = log.entries().map(|e| e.payload.message.as_str()).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);
    }
}
