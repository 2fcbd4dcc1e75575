#![allow(dead_code)]

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use studio_link::*;

/// A host window that records every message it is sent.
#[derive(Default)]
pub struct RecordingWindow {
    pub destroyed: AtomicBool,
    pub received: Mutex<Vec<(String, Value)>>,
}

impl RecordingWindow {
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn messages_on(&self, channel: &str) -> Vec<Value> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

impl HostWindow for RecordingWindow {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn send(&self, channel: &str, payload: &Value) -> Result<()> {
        self.received
            .lock()
            .unwrap()
            .push((channel.to_string(), payload.clone()));
        Ok(())
    }
}

/// Poll `condition` until it holds, failing the test after about five seconds.
pub async fn settle<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// A config whose default address is a port nothing listens on.
pub fn offline_config() -> LinkConfig {
    LinkConfig::builder()
        .with_host("127.0.0.1")
        .with_default_port(1)
        .build()
}
