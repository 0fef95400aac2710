//! WebSocket registry client.
//!
//! This module provides a client for a registry server speaking a small
//! JSON frame protocol:
//! - `put` / `get` / `delete` carry a client-assigned request `id`; the
//!   server answers with `ack` or `value` frames bearing the same id
//! - `subscribe` asks the server to push `changed` frames for a key prefix
//! - `guard` asks the server to delete a key when this connection drops,
//!   but only if the key still holds the guarded value
//!
//! The client reconnects with exponential backoff and re-arms its
//! subscriptions and guards after every reconnect. While disconnected,
//! request operations fail with [`RegistryError::Unavailable`]; watches
//! stay open and resume delivery once the connection returns.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use seatlock_protocol::RegistryError;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::{
    connect_async,
    tungstenite::Message as WsMessage,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{RegistryChange, RegistryResult, RegistryStore};

/// Default reconnection settings.
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 30_000;
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Channel capacity for the change fan-out.
const CHANGE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Outgoing frames (client → registry server)
// ---------------------------------------------------------------------------

/// Frames sent from the client to the registry server.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutgoingFrame {
    Put {
        id: u64,
        key: String,
        value: serde_json::Value,
    },
    Get {
        id: u64,
        key: String,
    },
    Delete {
        id: u64,
        key: String,
    },
    Subscribe {
        prefix: String,
    },
    Guard {
        key: String,
        expected: serde_json::Value,
    },
}

// ---------------------------------------------------------------------------
// Incoming frames (registry server → client)
// ---------------------------------------------------------------------------

/// Frames received from the registry server.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IncomingFrame {
    /// Answer to a `get`; `value` is absent when the key does not exist.
    Value {
        id: u64,
        key: String,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// Answer to a `put` or `delete`.
    Ack { id: u64 },
    /// A watched key changed; `value` is absent when the key was deleted.
    Changed {
        key: String,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    /// Error from the server. With an `id` it fails that request; without
    /// one it concerns the connection as a whole.
    Error {
        #[serde(default)]
        id: Option<u64>,
        message: String,
    },
}

/// Connection state for the registry client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the registry server.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Reconnecting after a disconnect.
    Reconnecting,
}

/// Configuration for the WebSocket registry client.
#[derive(Debug, Clone)]
pub struct RemoteRegistryConfig {
    /// The WebSocket URL of the registry server.
    pub server_url: String,
    /// Initial backoff duration for reconnection.
    pub initial_backoff: Duration,
    /// Maximum backoff duration for reconnection.
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to automatically reconnect on disconnect.
    pub auto_reconnect: bool,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Timeout for heartbeat pong response.
    pub heartbeat_timeout: Duration,
    /// How long to wait for the server to answer a request.
    pub request_timeout: Duration,
}

impl Default for RemoteRegistryConfig {
    fn default() -> Self {
        Self {
            server_url: "wss://registry.seatlock.dev".to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            backoff_multiplier: BACKOFF_MULTIPLIER,
            auto_reconnect: true,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RemoteRegistryConfig {
    /// Creates a new configuration with the specified server URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Default::default()
        }
    }

    /// Sets whether to automatically reconnect on disconnect.
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets the initial backoff duration.
    pub fn with_initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    /// Sets the maximum backoff duration.
    pub fn with_max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = duration;
        self
    }
}

/// Internal state for the WebSocket registry client.
struct ClientState {
    /// Current connection state.
    connection_state: ConnectionState,
    /// Sender for outgoing frames.
    frame_tx: Option<mpsc::Sender<OutgoingFrame>>,
    /// Current backoff duration for reconnection.
    current_backoff: Duration,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Disconnected,
            frame_tx: None,
            current_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

type PendingReply = oneshot::Sender<RegistryResult<Option<serde_json::Value>>>;

/// WebSocket-based registry client.
pub struct WebSocketRegistry {
    /// Configuration for the client.
    config: RemoteRegistryConfig,
    /// Internal state.
    state: Arc<RwLock<ClientState>>,
    /// In-flight requests, keyed by request id.
    pending: Mutex<HashMap<u64, PendingReply>>,
    /// Next request id.
    next_id: AtomicU64,
    /// Prefixes to (re)subscribe after every connect.
    subscriptions: Mutex<HashSet<String>>,
    /// Guards to re-arm after every connect.
    guards: Mutex<HashMap<String, serde_json::Value>>,
    /// Fan-out of `changed` frames to watchers.
    changes_tx: broadcast::Sender<RegistryChange>,
    /// Cancelled on shutdown; stops the connection loop and the spawned
    /// I/O tasks, closing any live socket.
    shutdown: CancellationToken,
}

impl WebSocketRegistry {
    /// Creates a new WebSocket registry client.
    ///
    /// The client stays disconnected until [`WebSocketRegistry::start`] is
    /// called.
    pub fn new(config: RemoteRegistryConfig) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CAPACITY);

        Self {
            config,
            state: Arc::new(RwLock::new(ClientState::default())),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashSet::new()),
            guards: Mutex::new(HashMap::new()),
            changes_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        // Since we can't await in a sync function, we use try_read
        match self.state.try_read() {
            Ok(state) => state.connection_state,
            Err(_) => ConnectionState::Disconnected,
        }
    }

    /// Starts the connection loop in the background.
    pub fn start(self: Arc<Self>) {
        let client = self.clone();
        tokio::spawn(async move {
            client.run_connection_loop().await;
        });
    }

    /// Stops the connection loop, closes any live socket, and fails all
    /// in-flight requests.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        {
            let mut state = self.state.write().await;
            state.frame_tx = None;
            state.connection_state = ConnectionState::Disconnected;
        }
        self.fail_pending().await;
    }

    /// Updates the connection state.
    async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if state.connection_state != new_state {
            tracing::debug!(state = ?new_state, "Registry connection state changed");
            state.connection_state = new_state;
        }
    }

    /// Allocates the next request id.
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends an outgoing frame to the registry server.
    async fn send_frame(&self, frame: OutgoingFrame) -> RegistryResult<()> {
        let state = self.state.read().await;
        if let Some(ref tx) = state.frame_tx {
            tx.send(frame).await.map_err(|e| {
                RegistryError::Unavailable(format!("failed to queue registry frame: {}", e))
            })?;
            Ok(())
        } else {
            Err(RegistryError::Unavailable(
                "not connected to registry server".to_string(),
            ))
        }
    }

    /// Sends a request frame and waits for the server's answer.
    async fn request(
        &self,
        op: String,
        id: u64,
        frame: OutgoingFrame,
    ) -> RegistryResult<Option<serde_json::Value>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, reply_tx);
        }

        if let Err(e) = self.send_frame(frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped: the connection died and drained the pending map
            Ok(Err(_)) => Err(RegistryError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(RegistryError::Timeout(op))
            }
        }
    }

    /// Fails every in-flight request with `ConnectionClosed`.
    async fn fail_pending(&self) {
        let drained: Vec<PendingReply> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, tx)| tx).collect()
        };

        for tx in drained {
            let _ = tx.send(Err(RegistryError::ConnectionClosed));
        }
    }

    /// Handles an incoming frame from the server.
    async fn handle_frame(&self, frame: IncomingFrame) {
        match frame {
            IncomingFrame::Value { id, value, .. } => {
                let reply = self.pending.lock().await.remove(&id);
                match reply {
                    Some(tx) => {
                        let _ = tx.send(Ok(value));
                    }
                    None => tracing::debug!(id, "Dropping value frame for unknown request"),
                }
            }
            IncomingFrame::Ack { id } => {
                let reply = self.pending.lock().await.remove(&id);
                match reply {
                    Some(tx) => {
                        let _ = tx.send(Ok(None));
                    }
                    None => tracing::debug!(id, "Dropping ack frame for unknown request"),
                }
            }
            IncomingFrame::Changed { key, value } => {
                let _ = self.changes_tx.send(RegistryChange { key, value });
            }
            IncomingFrame::Error { id: Some(id), message } => {
                let reply = self.pending.lock().await.remove(&id);
                match reply {
                    Some(tx) => {
                        let _ = tx.send(Err(RegistryError::Rejected(message)));
                    }
                    None => {
                        tracing::warn!(id, "Registry rejected an unknown request: {}", message)
                    }
                }
            }
            IncomingFrame::Error { id: None, message } => {
                tracing::warn!("Registry server error: {}", message);
            }
        }
    }

    /// Re-arms subscriptions and guards after a (re)connect.
    async fn rearm(&self, frame_tx: &mpsc::Sender<OutgoingFrame>) {
        let prefixes: Vec<String> = {
            let subscriptions = self.subscriptions.lock().await;
            subscriptions.iter().cloned().collect()
        };
        for prefix in prefixes {
            if frame_tx
                .send(OutgoingFrame::Subscribe { prefix })
                .await
                .is_err()
            {
                return;
            }
        }

        let guards: Vec<(String, serde_json::Value)> = {
            let guards = self.guards.lock().await;
            guards
                .iter()
                .map(|(key, expected)| (key.clone(), expected.clone()))
                .collect()
        };
        for (key, expected) in guards {
            if frame_tx
                .send(OutgoingFrame::Guard { key, expected })
                .await
                .is_err()
            {
                return;
            }
        }
    }

    /// Runs the connection loop with reconnection support.
    ///
    /// The shutdown token is observed at every suspension point, so
    /// `shutdown` interrupts a connect attempt, an established connection,
    /// and a backoff wait alike.
    async fn run_connection_loop(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting).await;

            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                attempt = self.connect_internal() => attempt,
            };

            match attempt {
                Ok((frame_tx, mut ws_rx, control_tx, last_pong)) => {
                    {
                        let mut state = self.state.write().await;
                        state.frame_tx = Some(frame_tx.clone());
                        state.current_backoff = self.config.initial_backoff;
                    }
                    self.set_state(ConnectionState::Connected).await;
                    self.rearm(&frame_tx).await;

                    let mut heartbeat_interval =
                        tokio::time::interval(self.config.heartbeat_interval);
                    // Skip the first immediate tick
                    heartbeat_interval.tick().await;

                    // Process incoming frames with heartbeat
                    loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => {
                                tracing::debug!("Registry client shutting down, closing the connection");
                                break;
                            }
                            _ = heartbeat_interval.tick() => {
                                let last_pong_time = *last_pong.read().await;
                                if last_pong_time.elapsed() > self.config.heartbeat_timeout + self.config.heartbeat_interval {
                                    tracing::warn!("Registry heartbeat timeout, reconnecting...");
                                    break;
                                }

                                if let Err(e) = control_tx.send(WsMessage::Ping(vec![])).await {
                                    tracing::error!("Failed to send registry ping: {}", e);
                                    break;
                                }
                            }
                            Some(result) = ws_rx.recv() => {
                                match result {
                                    Ok(frame) => self.handle_frame(frame).await,
                                    Err(e) => {
                                        tracing::error!("registry receive error: {}", e);
                                        break;
                                    }
                                }
                            }
                            else => break,
                        }
                    }

                    // Connection lost
                    {
                        let mut state = self.state.write().await;
                        state.frame_tx = None;
                    }
                    self.fail_pending().await;
                }
                Err(e) => {
                    tracing::error!("registry connection failed: {}", e);
                }
            }

            // Check if we should reconnect
            let should_reconnect = self.config.auto_reconnect && !self.shutdown.is_cancelled();

            if !should_reconnect {
                self.set_state(ConnectionState::Disconnected).await;
                break;
            }

            // Apply exponential backoff
            let backoff = {
                let mut state = self.state.write().await;
                let backoff = state.current_backoff;
                state.current_backoff = std::cmp::min(
                    Duration::from_secs_f64(
                        state.current_backoff.as_secs_f64() * self.config.backoff_multiplier,
                    ),
                    self.config.max_backoff,
                );
                backoff
            };

            self.set_state(ConnectionState::Reconnecting).await;
            tracing::info!("reconnecting to registry in {:?}", backoff);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Internal connection establishment.
    ///
    /// Returns:
    /// - Sender for outgoing frames
    /// - Receiver for incoming frames
    /// - Sender for WebSocket control frames (ping)
    /// - Shared timestamp of last pong received
    async fn connect_internal(
        &self,
    ) -> RegistryResult<(
        mpsc::Sender<OutgoingFrame>,
        mpsc::Receiver<RegistryResult<IncomingFrame>>,
        mpsc::Sender<WsMessage>,
        Arc<RwLock<Instant>>,
    )> {
        Url::parse(&self.config.server_url)
            .map_err(|e| RegistryError::Unavailable(format!("invalid registry URL: {}", e)))?;

        tracing::info!("Connecting to registry server: {}", self.config.server_url);

        let (ws_stream, _) = connect_async(&self.config.server_url)
            .await
            .map_err(|e| {
                RegistryError::Unavailable(format!("WebSocket connection failed: {}", e))
            })?;

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        // Create channels for frame passing
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<OutgoingFrame>(256);
        let (incoming_tx, incoming_rx) = mpsc::channel::<RegistryResult<IncomingFrame>>(256);
        // Channel for raw WebSocket control frames (ping)
        let (control_tx, mut control_rx) = mpsc::channel::<WsMessage>(16);

        // Shared timestamp for last pong received (initialized to now for grace period)
        let last_pong = Arc::new(RwLock::new(Instant::now()));
        let last_pong_writer = last_pong.clone();

        // Spawn task to handle outgoing frames and control frames
        let writer_token = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_token.cancelled() => {
                        // Best effort; dropping the sink closes the socket
                        // either way.
                        let _ = ws_sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    Some(frame) = outgoing_rx.recv() => {
                        match serde_json::to_string(&frame) {
                            Ok(json) => {
                                if let Err(e) = ws_sink.send(WsMessage::Text(json)).await {
                                    tracing::error!("failed to send registry frame: {}", e);
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!("failed to serialize registry frame: {}", e);
                            }
                        }
                    }
                    Some(control_msg) = control_rx.recv() => {
                        if let Err(e) = ws_sink.send(control_msg).await {
                            tracing::error!("failed to send registry control frame: {}", e);
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        // Spawn task to handle incoming frames
        let reader_token = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = reader_token.cancelled() => break,
                    next = ws_stream.next() => next,
                };
                let Some(result) = next else { break };
                match result {
                    Ok(WsMessage::Text(text)) => {
                        match serde_json::from_str::<IncomingFrame>(&text) {
                            Ok(frame) => {
                                if incoming_tx.send(Ok(frame)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    "failed to parse registry frame: {} (raw: {})",
                                    e,
                                    text
                                );
                            }
                        }
                    }
                    Ok(WsMessage::Pong(_)) => {
                        *last_pong_writer.write().await = Instant::now();
                    }
                    Ok(WsMessage::Close(_)) => {
                        let _ = incoming_tx.send(Err(RegistryError::ConnectionClosed)).await;
                        break;
                    }
                    Err(e) => {
                        let _ = incoming_tx
                            .send(Err(RegistryError::Unavailable(format!(
                                "WebSocket error: {}",
                                e
                            ))))
                            .await;
                        break;
                    }
                    _ => {
                        // Ignore ping/binary messages
                    }
                }
            }
        });

        Ok((outgoing_tx, incoming_rx, control_tx, last_pong))
    }
}

impl RegistryStore for WebSocketRegistry {
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let id = self.next_request_id();
            let frame = OutgoingFrame::Put {
                id,
                key: key.to_string(),
                value,
            };
            self.request(format!("put {}", key), id, frame).await?;
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<Option<serde_json::Value>>> + Send + 'a>> {
        Box::pin(async move {
            let id = self.next_request_id();
            let frame = OutgoingFrame::Get {
                id,
                key: key.to_string(),
            };
            self.request(format!("get {}", key), id, frame).await
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let id = self.next_request_id();
            let frame = OutgoingFrame::Delete {
                id,
                key: key.to_string(),
            };
            self.request(format!("delete {}", key), id, frame).await?;
            Ok(())
        })
    }

    fn watch<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<broadcast::Receiver<RegistryChange>>> + Send + 'a>>
    {
        Box::pin(async move {
            {
                let mut subscriptions = self.subscriptions.lock().await;
                subscriptions.insert(prefix.to_string());
            }

            // Best effort while disconnected: the subscription is re-armed
            // on the next connect, so delivery resumes on its own.
            if let Err(e) = self
                .send_frame(OutgoingFrame::Subscribe {
                    prefix: prefix.to_string(),
                })
                .await
            {
                tracing::debug!(prefix = %prefix, "Deferred registry subscription: {}", e);
            }

            Ok(self.changes_tx.subscribe())
        })
    }

    fn delete_on_disconnect<'a>(
        &'a self,
        key: &'a str,
        expected: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.send_frame(OutgoingFrame::Guard {
                key: key.to_string(),
                expected: expected.clone(),
            })
            .await?;

            let mut guards = self.guards.lock().await;
            guards.insert(key.to_string(), expected);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_config_default() {
        let config = RemoteRegistryConfig::default();
        assert_eq!(config.server_url, "wss://registry.seatlock.dev");
        assert!(config.auto_reconnect);
        assert_eq!(config.initial_backoff, Duration::from_millis(100));
        assert_eq!(config.max_backoff, Duration::from_millis(30_000));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_remote_config_builder() {
        let config = RemoteRegistryConfig::new("wss://custom.server.com")
            .with_auto_reconnect(false)
            .with_initial_backoff(Duration::from_secs(1))
            .with_max_backoff(Duration::from_secs(60))
            .with_request_timeout(Duration::from_secs(3));

        assert_eq!(config.server_url, "wss://custom.server.com");
        assert!(!config.auto_reconnect);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_outgoing_frame_serialization() {
        let put = OutgoingFrame::Put {
            id: 7,
            key: "seats/trial@seatlock.dev".to_string(),
            value: serde_json::json!({"sessionId": "s-1"}),
        };
        let json = serde_json::to_string(&put).unwrap();
        assert!(json.contains("\"type\":\"put\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"key\":\"seats/trial@seatlock.dev\""));

        let get = OutgoingFrame::Get {
            id: 8,
            key: "seats/a".to_string(),
        };
        let json = serde_json::to_string(&get).unwrap();
        assert!(json.contains("\"type\":\"get\""));

        let subscribe = OutgoingFrame::Subscribe {
            prefix: "seats/".to_string(),
        };
        let json = serde_json::to_string(&subscribe).unwrap();
        assert!(json.contains("\"type\":\"subscribe\""));
        assert!(json.contains("\"prefix\":\"seats/\""));

        let guard = OutgoingFrame::Guard {
            key: "seats/a".to_string(),
            expected: serde_json::json!(1),
        };
        let json = serde_json::to_string(&guard).unwrap();
        assert!(json.contains("\"type\":\"guard\""));
        assert!(json.contains("\"expected\":1"));
    }

    #[test]
    fn test_incoming_frame_deserialization() {
        // Value answer with a document
        let json = r#"{"type":"value","id":3,"key":"seats/a","value":{"n":1}}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        match frame {
            IncomingFrame::Value { id, key, value } => {
                assert_eq!(id, 3);
                assert_eq!(key, "seats/a");
                assert_eq!(value, Some(serde_json::json!({"n": 1})));
            }
            _ => panic!("unexpected frame type"),
        }

        // Value answer for an absent key
        let json = r#"{"type":"value","id":4,"key":"seats/b"}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        match frame {
            IncomingFrame::Value { value, .. } => assert_eq!(value, None),
            _ => panic!("unexpected frame type"),
        }

        // Ack answer
        let json = r#"{"type":"ack","id":5}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, IncomingFrame::Ack { id: 5 }));

        // Change push for a deletion
        let json = r#"{"type":"changed","key":"seats/a"}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        match frame {
            IncomingFrame::Changed { key, value } => {
                assert_eq!(key, "seats/a");
                assert_eq!(value, None);
            }
            _ => panic!("unexpected frame type"),
        }

        // Error with a request id
        let json = r#"{"type":"error","id":6,"message":"key too long"}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        match frame {
            IncomingFrame::Error { id, message } => {
                assert_eq!(id, Some(6));
                assert_eq!(message, "key too long");
            }
            _ => panic!("unexpected frame type"),
        }

        // Connection-level error
        let json = r#"{"type":"error","message":"rate limit exceeded"}"#;
        let frame: IncomingFrame = serde_json::from_str(json).unwrap();
        match frame {
            IncomingFrame::Error { id, message } => {
                assert_eq!(id, None);
                assert_eq!(message, "rate limit exceeded");
            }
            _ => panic!("unexpected frame type"),
        }
    }

    #[tokio::test]
    async fn test_client_starts_disconnected() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        client.set_state(ConnectionState::Connecting).await;
        assert_eq!(client.state(), ConnectionState::Connecting);

        client.set_state(ConnectionState::Connected).await;
        assert_eq!(client.state(), ConnectionState::Connected);

        client.set_state(ConnectionState::Reconnecting).await;
        assert_eq!(client.state(), ConnectionState::Reconnecting);
    }

    #[tokio::test]
    async fn test_requests_fail_when_disconnected() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let result = client.get("seats/a").await;
        match result {
            Err(RegistryError::Unavailable(msg)) => assert!(msg.contains("not connected")),
            other => panic!("unexpected result: {:?}", other),
        }

        let result = client.put("seats/a", serde_json::json!(1)).await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));

        let result = client.delete("seats/a").await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_value_frame_resolves_pending_get() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(42, tx);

        client
            .handle_frame(IncomingFrame::Value {
                id: 42,
                key: "seats/a".to_string(),
                value: Some(serde_json::json!({"n": 1})),
            })
            .await;

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result, Some(serde_json::json!({"n": 1})));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_error_frame_rejects_pending_request() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(9, tx);

        client
            .handle_frame(IncomingFrame::Error {
                id: Some(9),
                message: "key too long".to_string(),
            })
            .await;

        let result = rx.await.unwrap();
        assert_eq!(result, Err(RegistryError::Rejected("key too long".into())));
    }

    #[tokio::test]
    async fn test_changed_frame_reaches_watchers() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));
        let mut rx = client.watch("seats/").await.unwrap();

        client
            .handle_frame(IncomingFrame::Changed {
                key: "seats/a".to_string(),
                value: None,
            })
            .await;

        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "seats/a");
        assert_eq!(change.value, None);
    }

    #[tokio::test]
    async fn test_watch_records_subscription_while_disconnected() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let _rx = client.watch("seats/").await.unwrap();

        let subscriptions = client.subscriptions.lock().await;
        assert!(subscriptions.contains("seats/"));
    }

    #[tokio::test]
    async fn test_fail_pending_closes_requests() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let (tx, rx) = oneshot::channel();
        client.pending.lock().await.insert(1, tx);

        client.fail_pending().await;

        let result = rx.await.unwrap();
        assert_eq!(result, Err(RegistryError::ConnectionClosed));
        assert!(client.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_marks_disconnected() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        client.shutdown().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_reconnect_loop() {
        // Nothing listens on this port, so the loop cycles through
        // failed connects and backoff sleeps until told to stop.
        let config = RemoteRegistryConfig::new("ws://127.0.0.1:9")
            .with_initial_backoff(Duration::from_millis(10))
            .with_max_backoff(Duration::from_millis(10));
        let client = Arc::new(WebSocketRegistry::new(config));

        let loop_task = tokio::spawn(client.clone().run_connection_loop());
        tokio::time::sleep(Duration::from_millis(50)).await;

        client.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), loop_task)
            .await
            .expect("connection loop did not exit after shutdown")
            .unwrap();

        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let client = WebSocketRegistry::new(RemoteRegistryConfig::new("wss://localhost:9090"));

        let a = client.next_request_id();
        let b = client.next_request_id();
        let c = client.next_request_id();

        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    /// Integration test for the registry protocol.
    ///
    /// Note: This test requires a running registry server to pass.
    /// It is marked as ignore by default.
    #[tokio::test]
    #[ignore = "requires running registry server"]
    async fn test_registry_roundtrip_integration() {
        let config = RemoteRegistryConfig::new("ws://localhost:9090")
            .with_auto_reconnect(false)
            .with_request_timeout(Duration::from_secs(2));

        let client = Arc::new(WebSocketRegistry::new(config));
        client.clone().start();

        // Wait for the connection to come up
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.state() != ConnectionState::Connected {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("connect timeout");

        client
            .put("seats/integration", serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let value = client.get("seats/integration").await.unwrap();
        assert_eq!(value, Some(serde_json::json!({"n": 1})));

        client.delete("seats/integration").await.unwrap();
        assert_eq!(client.get("seats/integration").await.unwrap(), None);

        client.shutdown().await;
    }
}
