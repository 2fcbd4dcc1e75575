//! # studio-link
//!
//! Real-time status sync between a local image-generation backend and its
//! desktop frontend.
//!
//! Keeps one live Socket.IO channel to the backend and replaces it when the
//! backend moves to another port, rebinds event subscriptions onto the new
//! channel, reconciles streamed progress (downloads, model loads, denoising
//! steps, generation phases) into typed stores, and keeps a bounded history
//! of setup status messages for windows that open late.
//!
//! ## Quick Start
//!
//! ```no_run
//! use studio_link::{initialize_backend, LinkConfig, StudioContext};
//!
//! # async fn example() -> studio_link::Result<()> {
//! let (ctx, _notifications) = StudioContext::new(LinkConfig::default())?;
//! let _watchers = ctx.watch()?;
//!
//! // The host reported port 8001: the socket is replaced and rebound.
//! initialize_backend(&8001u16, &ctx).await?;
//!
//! let model_load = ctx.stores().model_load.lock().unwrap();
//! println!("{} {}%", model_load.message(), model_load.percentage());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod events;
pub mod history;
pub mod host;
pub mod logs;
pub mod notify;
pub mod registry;
pub mod stores;
pub mod subscription;
pub mod watchers;

pub use client::BackendClient;
pub use config::{LinkConfig, LinkConfigBuilder, DEFAULT_BACKEND_PORT};
pub use connection::{Connection, ListenerId, ReconnectPolicy};
pub use context::{initialize_backend, HostContext, PortSource, StudioContext};
pub use error::{LinkError, Result};
pub use events::SocketEvent;
pub use history::{SetupStatusLog, StatusHistory};
pub use host::{HostWindow, StatusBroadcaster, StatusLevel, StatusPayload, WindowSet};
pub use logs::{LogBuffer, LogEntry, LogStreamer};
pub use notify::{Notification, Notifier, Severity};
pub use registry::ConnectionRegistry;
pub use stores::{DownloadStore, GenerationPhaseStore, ImageStepStore, LoadStatus, ModelLoadStore};
pub use subscription::Subscription;
pub use watchers::{Stores, Watchers};
