//! Process-wide wiring: one context per UI session, one per host process.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::client::BackendClient;
use crate::config::LinkConfig;
use crate::error::Result;
use crate::host::{HostWindow, StatusBroadcaster, StatusPayload, WindowSet};
use crate::logs::LogStreamer;
use crate::notify::{Notification, Notifier};
use crate::registry::ConnectionRegistry;
use crate::watchers::{Stores, Watchers};

/// Answers the UI's request for the port the backend listens on.
///
/// Implemented by whatever bridges the UI to the host process. `Ok(None)`
/// means the host has no port to report and the default applies.
pub trait PortSource: Send + Sync {
    fn backend_port(&self) -> impl Future<Output = Result<Option<u16>>> + Send;
}

/// A fixed port, for tests and headless use.
impl PortSource for u16 {
    async fn backend_port(&self) -> Result<Option<u16>> {
        Ok(Some(*self))
    }
}

/// No host bridge: always the default port.
impl PortSource for () {
    async fn backend_port(&self) -> Result<Option<u16>> {
        Ok(None)
    }
}

/// UI-session state: the connection registry, the backend client and the
/// progress stores, built once and shared by reference.
pub struct StudioContext {
    config: LinkConfig,
    registry: ConnectionRegistry,
    client: BackendClient,
    stores: Stores,
    notifier: Notifier,
    initialized: AtomicBool,
}

impl StudioContext {
    /// Build the context. Returns it with the receiving end of its
    /// notification queue.
    pub fn new(config: LinkConfig) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<Notification>)> {
        Self::with_stores(config, Stores::new())
    }

    /// Like [`new`](Self::new) with caller-built stores, e.g. ones carrying
    /// a cache invalidator.
    pub fn with_stores(
        config: LinkConfig,
        stores: Stores,
    ) -> Result<(Self, tokio::sync::mpsc::UnboundedReceiver<Notification>)> {
        let registry = ConnectionRegistry::new(&config)?;
        let client = BackendClient::from_config(&config);
        let (notifier, rx) = Notifier::channel();
        Ok((
            Self {
                config,
                registry,
                client,
                stores,
                notifier,
                initialized: AtomicBool::new(false),
            },
            rx,
        ))
    }

    /// Configuration the context was built from.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// REST client, kept on the same address as the socket.
    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Progress stores fed by [`watch()`](Self::watch).
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Sender for user-facing notifications.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Whether [`initialize_backend`] has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Subscribe the progress stores to socket events.
    pub fn watch(&self) -> Result<Watchers> {
        self.stores.watch(&self.registry)
    }
}

/// Point the client and the socket at the port the host reports.
///
/// A failing port lookup falls back to the default port. On the default
/// port the initial connection is connected in place; otherwise it is
/// replaced. Marks the context initialized on success.
pub async fn initialize_backend<P: PortSource>(ports: &P, context: &StudioContext) -> Result<()> {
    let config = context.config();
    let port = match ports.backend_port().await {
        Ok(Some(port)) => port,
        Ok(None) => config.default_port,
        Err(e) => {
            warn!(error = %e, default = config.default_port, "port lookup failed, using default");
            config.default_port
        }
    };

    let address = config.address_for_port(port);
    context.client().set_endpoint(address.clone());

    if port == config.default_port {
        context.registry().connect_current()?;
    } else {
        context.registry().set_address(&address)?;
    }

    context.initialized.store(true, Ordering::SeqCst);
    info!(%address, "backend initialized");
    Ok(())
}

/// Host-process state: open windows, the setup status broadcaster and the
/// log streamer, all sharing one [`WindowSet`].
pub struct HostContext {
    windows: WindowSet,
    status: StatusBroadcaster,
    logs: LogStreamer,
    backend_port: u16,
}

impl HostContext {
    /// Host state for a backend listening on `backend_port`.
    pub fn new(config: &LinkConfig, backend_port: u16) -> Self {
        let windows = WindowSet::new();
        Self {
            status: StatusBroadcaster::new(windows.clone(), config.status_history_capacity),
            logs: LogStreamer::new(windows.clone()),
            windows,
            backend_port,
        }
    }

    /// Register a newly opened window.
    pub fn add_window(&self, window: Arc<dyn HostWindow>) {
        self.windows.add(window);
    }

    /// Open windows.
    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }

    /// Setup status broadcaster and its history.
    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    /// Log streaming switch.
    pub fn logs(&self) -> &LogStreamer {
        &self.logs
    }

    /// Shorthand for [`StatusBroadcaster::broadcast`].
    pub fn broadcast(&self, payload: &StatusPayload) -> Result<usize> {
        self.status.broadcast(payload)
    }

    /// Answer for the port channel.
    pub fn port(&self) -> u16 {
        self.backend_port
    }

    /// Answer for the log stream status channel.
    pub fn is_log_streaming(&self) -> bool {
        self.logs.is_streaming()
    }
}

/// The host's own answer to port requests, for UIs running in-process.
impl PortSource for HostContext {
    async fn backend_port(&self) -> Result<Option<u16>> {
        Ok(Some(self.backend_port))
    }
}
