use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::codec::{Packet, SocketPacket};
use crate::error::{LinkError, Result};

/// Callback invoked with the raw JSON payload of an event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle identifying one listener registered on a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Transports a connection may use. Long-polling is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    WebSocket,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn normalize(address: &str) -> String {
    address.trim_end_matches('/').to_string()
}

/// Build the Engine.IO websocket URL for a backend base address.
pub(crate) fn socket_url(address: &str, socket_path: &str) -> Result<String> {
    let invalid = |reason: String| LinkError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = reqwest::Url::parse(address).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {}", other))),
    };
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("missing host".into()))?;
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let mut path = socket_path.to_string();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    if !path.ends_with('/') {
        path.push('/');
    }

    Ok(format!(
        "{}://{}{}{}?EIO=4&transport=websocket",
        scheme, host, port, path
    ))
}

/// Backoff between reconnect attempts: `initial`, doubling up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// Wait before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    handshakes: AtomicUsize,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventCallback)>>>,
}

impl Shared {
    fn dispatch(&self, event: &str, data: &Value) -> usize {
        // Snapshot so callbacks may register or remove listeners.
        let callbacks: Vec<EventCallback> = match lock(&self.listeners).get(event) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return 0,
        };
        for cb in &callbacks {
            cb(data);
        }
        callbacks.len()
    }
}

/// One live event channel to the backend.
///
/// Created unconnected; [`connect()`](Self::connect) spawns the reader task
/// that performs the websocket upgrade and dispatches events to listeners in
/// the order frames arrive. A connection is never re-pointed: the
/// [`ConnectionRegistry`](crate::registry::ConnectionRegistry) replaces it
/// wholesale when the backend address changes.
pub struct Connection {
    id: String,
    address: String,
    socket_url: String,
    generation: u64,
    shared: Arc<Shared>,
    next_listener: AtomicU64,
    connect_calls: AtomicUsize,
    reconnect: ReconnectPolicy,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("generation", &self.generation)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Create an unconnected channel for `address` (an `http(s)://` or
    /// `ws(s)://` base URL).
    pub fn new(address: &str, socket_path: &str, generation: u64) -> Result<Self> {
        let address = normalize(address);
        let socket_url = socket_url(&address, socket_path)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            socket_url,
            generation,
            shared: Arc::new(Shared::default()),
            next_listener: AtomicU64::new(1),
            connect_calls: AtomicUsize::new(0),
            reconnect: ReconnectPolicy::default(),
            reader: Mutex::new(None),
        })
    }

    /// Use `policy` between reconnect attempts.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Client-side identifier of this channel.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Backend base address this channel targets.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Websocket URL used for the upgrade.
    pub fn socket_url(&self) -> &str {
        &self.socket_url
    }

    /// Registry generation this channel was created for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Always [`Transport::WebSocket`].
    pub fn transport(&self) -> Transport {
        Transport::WebSocket
    }

    /// Channels never connect on construction.
    pub fn auto_connect(&self) -> bool {
        false
    }

    /// Whether the Socket.IO namespace handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Number of completed namespace handshakes, reconnects included.
    pub fn handshakes(&self) -> usize {
        self.shared.handshakes.load(Ordering::SeqCst)
    }

    /// Number of times [`connect()`](Self::connect) started a reader task.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Start the reader task. It keeps reconnecting with backoff until
    /// [`disconnect()`](Self::disconnect) or drop; a no-op while it runs.
    pub fn connect(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LinkError::NoRuntime)?;
        let mut reader = lock(&self.reader);
        if reader.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        debug!(url = %self.socket_url, generation = self.generation, "connecting socket");
        *reader = Some(runtime.spawn(run_reader(
            self.socket_url.clone(),
            Arc::clone(&self.shared),
            self.reconnect,
        )));
        Ok(())
    }

    /// Tear down the reader task. Listeners stay registered.
    pub fn disconnect(&self) {
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// Register `callback` for `event`.
    pub fn on(&self, event: &str, callback: EventCallback) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.shared.listeners)
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    /// Remove one listener. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, listener: ListenerId) -> bool {
        let mut listeners = lock(&self.shared.listeners);
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != listener);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.shared.listeners)
            .get(event)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Deliver an event to this channel's listeners as if it came off the
    /// wire. Returns how many listeners ran.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        self.shared.dispatch(event, data)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.reader).take() {
            handle.abort();
        }
    }
}

async fn run_reader(url: String, shared: Arc<Shared>, reconnect: ReconnectPolicy) {
    let mut attempt: u32 = 0;
    loop {
        if run_session(&url, &shared).await {
            attempt = 0;
        }
        shared.connected.store(false, Ordering::SeqCst);

        let delay = reconnect.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "reconnecting socket");
        tokio::time::sleep(delay).await;
    }
}

/// Heartbeat deadline announced by the open packet: `pingInterval + pingTimeout`.
fn heartbeat_window(open: &Value) -> Option<Duration> {
    let interval = open.get("pingInterval")?.as_u64()?;
    let timeout = open.get("pingTimeout")?.as_u64()?;
    Some(Duration::from_millis(interval + timeout))
}

/// One websocket session. Returns whether the namespace handshake completed.
async fn run_session(url: &str, shared: &Shared) -> bool {
    let (ws, _) = match tokio_tungstenite::connect_async(url).await {
        Ok(c) => c,
        Err(e) => {
            debug!(url = %url, error = %e, "socket connection failed");
            return false;
        }
    };
    let (mut sink, mut stream) = ws.split();
    let mut handshaken = false;
    let mut window: Option<Duration> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(url = %url, "socket heartbeat timed out");
                    break;
                }
            },
            None => stream.next().await,
        };
        let text = match next {
            Some(Ok(Message::Text(t))) => t,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(url = %url, error = %e, "socket read failed");
                break;
            }
        };

        let packet = match Packet::decode(&text) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "skipping undecodable frame");
                continue;
            }
        };

        let reply = match packet {
            Packet::Open(handshake) => {
                window = heartbeat_window(&handshake);
                deadline = window.map(|w| Instant::now() + w);
                Some(Packet::Message(SocketPacket::Connect(None)))
            }
            Packet::Ping(payload) => {
                deadline = window.map(|w| Instant::now() + w);
                Some(Packet::Pong(payload))
            }
            Packet::Message(SocketPacket::Connect(_)) => {
                handshaken = true;
                shared.handshakes.fetch_add(1, Ordering::SeqCst);
                shared.connected.store(true, Ordering::SeqCst);
                info!(url = %url, "socket connected");
                None
            }
            Packet::Message(SocketPacket::Event { name, data }) => {
                shared.dispatch(&name, &data);
                None
            }
            Packet::Message(SocketPacket::ConnectError(reason)) => {
                warn!(url = %url, %reason, "socket namespace connect refused");
                break;
            }
            Packet::Message(SocketPacket::Disconnect) | Packet::Close => {
                info!(url = %url, "socket closed by backend");
                break;
            }
            // Only the default namespace is joined.
            Packet::Namespaced { namespace, .. } => {
                debug!(url = %url, %namespace, "ignoring packet for another namespace");
                None
            }
            _ => None,
        };

        if let Some(reply) = reply {
            if let Err(e) = sink.send(Message::Text(reply.encode())).await {
                warn!(url = %url, error = %e, "socket write failed");
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    handshaken
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_socket_url_from_http() {
        assert_eq!(
            socket_url("http://localhost:8000", "/socket.io/").unwrap(),
            "ws://localhost:8000/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            socket_url("https://studio.local", "socket.io").unwrap(),
            "wss://studio.local/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url_rejects_bad_addresses() {
        assert!(matches!(
            socket_url("not a url", "/socket.io/"),
            Err(LinkError::InvalidAddress { .. })
        ));
        assert!(matches!(
            socket_url("ftp://localhost:21", "/socket.io/"),
            Err(LinkError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_new_connection_is_manual() {
        let conn = Connection::new("http://localhost:8001/", "/socket.io/", 3).unwrap();
        assert_eq!(conn.address(), "http://localhost:8001");
        assert_eq!(conn.generation(), 3);
        assert_eq!(conn.transport(), Transport::WebSocket);
        assert!(!conn.auto_connect());
        assert!(!conn.is_connected());
        assert_eq!(conn.connect_calls(), 0);
    }

    #[test]
    fn test_reconnect_delay_doubles_to_cap() {
        let policy = ReconnectPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(700),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(700));
        assert_eq!(policy.delay(40), Duration::from_millis(700));
    }

    #[test]
    fn test_heartbeat_window_from_open_packet() {
        let open = json!({"sid": "s1", "pingInterval": 25000, "pingTimeout": 20000});
        assert_eq!(heartbeat_window(&open), Some(Duration::from_millis(45000)));
        assert_eq!(heartbeat_window(&json!({"sid": "s1"})), None);
    }

    #[tokio::test]
    async fn test_reader_keeps_retrying_until_disconnect() {
        let conn = Connection::new("http://127.0.0.1:1", "/socket.io/", 0)
            .unwrap()
            .with_reconnect(ReconnectPolicy {
                initial: Duration::from_millis(10),
                max: Duration::from_millis(20),
            });
        conn.connect().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Still running after several failed attempts, so connect is a no-op.
        conn.connect().unwrap();
        assert_eq!(conn.connect_calls(), 1);

        conn.disconnect();
        conn.connect().unwrap();
        assert_eq!(conn.connect_calls(), 2);
    }

    #[test]
    fn test_connect_without_runtime() {
        let conn = Connection::new("http://localhost:8001", "/socket.io/", 0).unwrap();
        assert!(matches!(conn.connect(), Err(LinkError::NoRuntime)));
    }

    #[test]
    fn test_on_off_and_dispatch_order() {
        let conn = Connection::new("http://localhost:8000", "/socket.io/", 0).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        let first = conn.on(
            "download_start",
            Arc::new(move |v: &Value| s1.lock().unwrap().push(format!("a:{}", v["id"]))),
        );
        let s2 = Arc::clone(&seen);
        conn.on(
            "download_start",
            Arc::new(move |v: &Value| s2.lock().unwrap().push(format!("b:{}", v["id"]))),
        );

        assert_eq!(conn.listener_count("download_start"), 2);
        assert_eq!(conn.dispatch("download_start", &json!({"id": "m1"})), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["a:\"m1\"", "b:\"m1\""]);

        assert!(conn.off("download_start", first));
        assert!(!conn.off("download_start", first));
        assert_eq!(conn.dispatch("download_start", &json!({"id": "m2"})), 1);
        assert_eq!(conn.dispatch("download_completed", &json!({})), 0);
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let conn = Arc::new(Connection::new("http://localhost:8000", "/socket.io/", 0).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let c = Arc::clone(&calls);
        let weak = Arc::downgrade(&conn);
        let s = Arc::clone(&slot);
        let id = conn.on(
            "generation_phase",
            Arc::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                if let (Some(conn), Some(id)) = (weak.upgrade(), *s.lock().unwrap()) {
                    conn.off("generation_phase", id);
                }
            }),
        );
        *slot.lock().unwrap() = Some(id);

        conn.dispatch("generation_phase", &Value::Null);
        conn.dispatch("generation_phase", &Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(conn.listener_count("generation_phase"), 0);
    }
}
