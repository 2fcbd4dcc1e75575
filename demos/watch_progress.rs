//! Watch download and model-load progress from a running backend.
//!
//! Requires the backend listening on http://localhost:8000. Pass another
//! port as the first argument to exercise the reconnect path.
//!
//! ```sh
//! cargo run --example watch_progress -- 8001
//! ```

use std::time::Duration;
use studio_link::{initialize_backend, LinkConfig, StudioContext};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let port: Option<u16> = std::env::args().nth(1).and_then(|p| p.parse().ok());
    let (ctx, mut notifications) = StudioContext::new(LinkConfig::default())?;
    let _watchers = ctx.watch()?;

    initialize_backend(&port.unwrap_or(ctx.config().default_port), &ctx).await?;

    if let Some(models) = ctx
        .notifier()
        .catch("Could not list models", ctx.client().downloaded_models().await)
    {
        println!("{} model(s) on disk", models.len());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                {
                    let load = ctx.stores().model_load.lock().unwrap();
                    if load.is_loading() {
                        println!("  {} {}%", load.message(), load.percentage());
                    }
                }
                let downloads = ctx.stores().downloads.lock().unwrap();
                for entry in downloads.entries() {
                    println!(
                        "  {} {}/{} ({}%)",
                        entry.model_id,
                        entry.step,
                        entry.total,
                        downloads.percentage(&entry.model_id)
                    );
                }
            }
            Some(n) = notifications.recv() => eprintln!("{}: {}", n.title, n.description),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
