use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::LinkConfig;
use crate::connection::{Connection, ReconnectPolicy};
use crate::error::Result;

struct Inner {
    socket_path: String,
    reconnect: ReconnectPolicy,
    current: watch::Sender<Arc<Connection>>,
    next_generation: AtomicU64,
}

/// Holds the single live [`Connection`] and swaps it when the backend moves.
///
/// Cloning the registry clones a handle; all clones share one current
/// connection. The connection is stored as one `Arc` behind a watch
/// channel, so a reader always sees an address and its channel together.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("current", &*self.inner.current.borrow())
            .finish()
    }
}

impl ConnectionRegistry {
    /// Create a registry holding an unconnected channel to the default address.
    pub fn new(config: &LinkConfig) -> Result<Self> {
        let reconnect = ReconnectPolicy {
            initial: config.reconnect_delay,
            max: config.reconnect_delay_max,
        };
        let initial = Connection::new(&config.default_address(), &config.socket_path, 0)?
            .with_reconnect(reconnect);
        let (current, _) = watch::channel(Arc::new(initial));
        Ok(Self {
            inner: Arc::new(Inner {
                socket_path: config.socket_path.clone(),
                reconnect,
                current,
                next_generation: AtomicU64::new(1),
            }),
        })
    }

    /// The current live connection.
    pub fn current(&self) -> Arc<Connection> {
        Arc::clone(&self.inner.current.borrow())
    }

    /// Generation of the current connection.
    pub fn generation(&self) -> u64 {
        self.inner.current.borrow().generation()
    }

    /// Receiver notified on every connection replacement.
    pub fn watch(&self) -> watch::Receiver<Arc<Connection>> {
        self.inner.current.subscribe()
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    /// Connect the current channel in place, used when the backend is on the
    /// address the registry was created with.
    pub fn connect_current(&self) -> Result<()> {
        self.current().connect()
    }

    /// Point the registry at a new backend address.
    ///
    /// Builds and connects a fresh channel, swaps it in, then tears down the
    /// previous one. On failure the previous connection stays current.
    pub fn set_address(&self, address: &str) -> Result<Arc<Connection>> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let next = match Connection::new(address, &self.inner.socket_path, generation) {
            Ok(c) => Arc::new(c.with_reconnect(self.inner.reconnect)),
            Err(e) => {
                warn!(address, error = %e, "keeping previous socket connection");
                return Err(e);
            }
        };
        if let Err(e) = next.connect() {
            warn!(address, error = %e, "keeping previous socket connection");
            return Err(e);
        }

        let previous = self.inner.current.send_replace(Arc::clone(&next));
        previous.disconnect();
        info!(
            from = previous.address(),
            to = next.address(),
            generation,
            "socket connection replaced"
        );
        Ok(next)
    }
}

/// Non-owning registry handle held by listeners living inside a connection.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Inner>);

impl WeakRegistry {
    pub(crate) fn current(&self) -> Option<Arc<Connection>> {
        self.0.upgrade().map(|inner| Arc::clone(&inner.current.borrow()))
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        self.0.upgrade().map(|inner| inner.current.borrow().generation())
    }
}
