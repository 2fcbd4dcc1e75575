use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Response of the backend root endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// A model already present on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedModel {
    pub id: i64,
    pub model_id: String,
    pub model_dir: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// HTTP client for the local backend.
///
/// Clones share one base URL, so re-pointing the client after the host
/// reports the backend port affects every holder.
///
/// # Example
/// ```no_run
/// use studio_link::BackendClient;
///
/// # async fn example() -> studio_link::Result<()> {
/// let client = BackendClient::new("http://localhost:8000");
/// let models = client.downloaded_models().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    endpoint: Arc<RwLock<String>>,
    timeout: Duration,
}

impl BackendClient {
    /// Client for `endpoint`, normalized, with a 10 second request timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: Arc::new(RwLock::new(normalize(endpoint.into()))),
            timeout: Duration::from_secs(10),
        }
    }

    /// Client for the default address of `config`.
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.default_address()).with_timeout(config.http_timeout)
    }

    /// Use a custom `reqwest::Client` (for connection pooling, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current base URL.
    pub fn endpoint(&self) -> String {
        match self.endpoint.read() {
            Ok(e) => e.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Point every clone of this client at `endpoint`.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = normalize(endpoint.into());
        match self.endpoint.write() {
            Ok(mut e) => *e = endpoint,
            Err(poisoned) => *poisoned.into_inner() = endpoint,
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Backend root status.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json("/", "Failed to fetch backend health").await
    }

    /// Models already downloaded by the backend.
    pub async fn downloaded_models(&self) -> Result<Vec<DownloadedModel>> {
        self.get_json("/models/downloaded", "Failed to fetch downloaded models")
            .await
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Ask the backend to download a model. Progress arrives over the socket.
    pub async fn download_model(&self, model_id: &str) -> Result<Value> {
        let url = format!("{}/downloads/", self.endpoint());
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "id": model_id }))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LinkError::Http { status, body });
        }

        resp.json().await.map_err(|e| LinkError::Network {
            context: "Failed to parse download response".into(),
            source: e,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> Result<T> {
        let url = format!("{}{}", self.endpoint(), path);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LinkError::Http { status, body });
        }

        resp.json().await.map_err(|e| LinkError::Network {
            context: context.to_string(),
            source: e,
        })
    }

    fn unreachable(&self, source: reqwest::Error) -> LinkError {
        LinkError::Network {
            context: format!(
                "Cannot connect to backend at {}, is it running?",
                self.endpoint()
            ),
            source,
        }
    }
}
