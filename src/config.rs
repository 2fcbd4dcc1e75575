use std::time::Duration;

/// Port the backend listens on when the host does not report another one.
pub const DEFAULT_BACKEND_PORT: u16 = 8000;

/// Configuration for the socket layer, stores and host-side buffers.
///
/// Use [`LinkConfig::builder()`] for ergonomic construction, or
/// [`LinkConfig::default()`] for the stock local backend setup.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Host name the backend is reached on.
    pub host: String,

    /// Port assumed until the host process announces the real one.
    pub default_port: u16,

    /// Path of the Socket.IO endpoint on the backend.
    pub socket_path: String,

    /// Maximum number of setup status payloads kept for replay.
    pub status_history_capacity: usize,

    /// Maximum number of log lines kept by a [`LogBuffer`](crate::logs::LogBuffer).
    pub log_capacity: usize,

    /// Timeout applied to backend HTTP requests.
    pub http_timeout: Duration,

    /// Wait before the first reconnect attempt after the socket drops.
    pub reconnect_delay: Duration,

    /// Upper bound for the doubling reconnect wait.
    pub reconnect_delay_max: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            default_port: DEFAULT_BACKEND_PORT,
            socket_path: "/socket.io/".to_string(),
            status_history_capacity: 100,
            log_capacity: 250,
            http_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(5),
        }
    }
}

impl LinkConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::default()
    }

    /// Backend base URL for a given port.
    pub fn address_for_port(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// Backend base URL on the default port.
    pub fn default_address(&self) -> String {
        self.address_for_port(self.default_port)
    }
}

/// Builder for [`LinkConfig`].
#[derive(Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Set the host name used to build backend addresses.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the port assumed before the host reports one.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Set the Socket.IO endpoint path.
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Set how many status payloads are kept for late windows.
    pub fn with_status_history_capacity(mut self, capacity: usize) -> Self {
        self.config.status_history_capacity = capacity;
        self
    }

    /// Set how many log lines a renderer-side buffer keeps.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.config.log_capacity = capacity;
        self
    }

    /// Set the timeout for backend HTTP requests.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    /// Set the first reconnect wait and the cap it doubles up to.
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.config.reconnect_delay = initial;
        self.config.reconnect_delay_max = max.max(initial);
        self
    }

    /// Build the final [`LinkConfig`].
    pub fn build(self) -> LinkConfig {
        self.config
    }
}
