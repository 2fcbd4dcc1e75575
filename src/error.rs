use thiserror::Error;

/// Errors returned by studio-link operations.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The backend address could not be turned into a socket URL.
    #[error("Invalid backend address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// A socket operation needs a running tokio runtime.
    #[error("No tokio runtime available to drive the socket connection")]
    NoRuntime,

    /// A Socket.IO / Engine.IO frame could not be decoded.
    #[error("Malformed socket packet: {0}")]
    Codec(String),

    /// The backend returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// Delivering a message to a host window failed.
    #[error("Host window delivery failed: {0}")]
    Host(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LinkError>;
