//! Broadcast setup status to windows and replay history to a late one.
//!
//! Runs offline; windows are printed to stdout.
//!
//! ```sh
//! cargo run --example status_history
//! ```

use serde_json::Value;
use std::sync::Arc;
use studio_link::host::STATUS_CHANNEL;
use studio_link::{HostContext, HostWindow, LinkConfig, SetupStatusLog, StatusPayload};
use tracing_subscriber::prelude::*;

struct StdoutWindow(&'static str);

impl HostWindow for StdoutWindow {
    fn is_destroyed(&self) -> bool {
        false
    }

    fn send(&self, channel: &str, payload: &Value) -> studio_link::Result<()> {
        if channel == STATUS_CHANNEL {
            println!("[{}] {}", self.0, payload);
        }
        Ok(())
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = LinkConfig::default();
    let host = HostContext::new(&config, config.default_port);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(host.logs().layer())
        .init();

    host.add_window(Arc::new(StdoutWindow("main")));
    host.logs().start();
    host.broadcast(&StatusPayload::info("Checking Python installation"))?;
    host.broadcast(&StatusPayload::info("Installing dependencies"))?;
    host.broadcast(&StatusPayload::error("pip exited with status 1"))?;

    // A window opened now pulls the history instead.
    let mut log = SetupStatusLog::new(config.status_history_capacity);
    for payload in host.status().history() {
        log.add(payload);
    }
    println!("late window replayed {} message(s)", log.len());

    Ok(())
}
