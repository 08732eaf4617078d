//! CDP WebSocket connection implementation
//!
//! The socket is split: a reader task owns the stream half and routes
//! responses to their pending command and events to subscribers, while
//! commands write through the sink half.

use super::traits::{CdpConnection, CdpError as CdpErrorResponse, CdpEvent, CdpResponse};
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// CDP timeout configuration
#[derive(Debug, Clone)]
struct CdpTimeoutConfig {
    /// Default timeout for most commands (seconds)
    default_timeout_secs: u64,
    /// Timeout for page navigation commands (seconds)
    navigation_timeout_secs: u64,
    /// Timeout for JavaScript execution (seconds)
    execution_timeout_secs: u64,
}

impl Default for CdpTimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            navigation_timeout_secs: 60,
            execution_timeout_secs: 30,
        }
    }
}

impl CdpTimeoutConfig {
    /// Get timeout duration for a specific command method
    fn timeout_for(&self, method: &str) -> tokio::time::Duration {
        let secs = if method.starts_with("Page.navigate") || method.starts_with("Page.reload") {
            self.navigation_timeout_secs
        } else if method.starts_with("Runtime.evaluate") || method.starts_with("Runtime.callFunctionOn") {
            self.execution_timeout_secs
        } else {
            self.default_timeout_secs
        };
        tokio::time::Duration::from_secs(secs)
    }
}

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConnectionState {
    Connected,
    Disconnected,
    Closed,
}

/// Pending command response
#[derive(Debug)]
struct PendingCommand {
    sender: oneshot::Sender<CdpResponse>,
    /// Command method (for logging)
    method: String,
}

type PendingTable = Arc<Mutex<HashMap<u64, PendingCommand>>>;
type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>>;

/// CDP WebSocket connection implementation
#[derive(Debug)]
pub struct CdpWebSocketConnection {
    url: String,
    sink: Mutex<Option<WsSink>>,
    state: Arc<RwLock<ConnectionState>>,
    next_id: AtomicU64,
    pending_commands: PendingTable,
    event_subscribers: Subscribers,
    is_active: Arc<AtomicBool>,
    timeout_config: CdpTimeoutConfig,
}

impl CdpWebSocketConnection {
    /// Connect to a WebSocket URL
    ///
    /// # Arguments
    /// * `url` - WebSocket URL (e.g., "ws://localhost:9222/devtools/page/ABC123")
    pub async fn new<S: Into<String>>(url: S) -> Result<Arc<Self>, Error> {
        let url = url.into();
        info!("Connecting to WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::websocket(format!("Failed to connect to {}: {}", url, e)))?;
        let (sink, stream) = ws_stream.split();

        let connection = Arc::new(Self {
            url,
            sink: Mutex::new(Some(sink)),
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
            next_id: AtomicU64::new(1),
            pending_commands: Arc::new(Mutex::new(HashMap::new())),
            event_subscribers: Arc::new(Mutex::new(Vec::new())),
            is_active: Arc::new(AtomicBool::new(true)),
            timeout_config: CdpTimeoutConfig::default(),
        });

        let pending = Arc::clone(&connection.pending_commands);
        let subscribers = Arc::clone(&connection.event_subscribers);
        let is_active = Arc::clone(&connection.is_active);
        let state = Arc::clone(&connection.state);
        tokio::spawn(async move {
            debug!("CDP reader task started");
            Self::read_loop(stream, &pending, &subscribers).await;
            is_active.store(false, Ordering::SeqCst);
            {
                let mut state = state.write().await;
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Disconnected;
                }
            }
            // Dropping the senders wakes every waiter with a closed channel
            pending.lock().await.clear();
            subscribers.lock().await.clear();
            debug!("CDP reader task exited");
        });

        info!("WebSocket connection established");
        Ok(connection)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn read_loop(mut stream: SplitStream<WsStream>, pending: &PendingTable, subscribers: &Subscribers) {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => Self::handle_message(&text, pending, subscribers).await,
                Ok(Message::Close(_)) => {
                    info!("WebSocket close frame received");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket read error, deactivating connection: {}", e);
                    break;
                }
            }
        }
    }

    async fn handle_message(text: &str, pending: &PendingTable, subscribers: &Subscribers) {
        trace!("CDP <- {}", text);

        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            Self::handle_response(response, pending).await;
        } else if let Ok(notification) = serde_json::from_str::<CdpNotification>(text) {
            Self::handle_notification(notification, subscribers).await;
        } else {
            warn!("Unknown message format: {}", text);
        }
    }

    async fn handle_response(response: CdpRpcResponse, pending: &PendingTable) {
        let Some(command) = pending.lock().await.remove(&response.id) else {
            warn!("Received response for unknown command ID: {}", response.id);
            return;
        };
        debug!("Response for command {}: {}", response.id, command.method);

        let cdp_response = CdpResponse {
            id: response.id,
            result: Some(response.result),
            error: response.error.map(|e| CdpErrorResponse {
                code: e.code,
                message: e.message,
                data: e.data,
            }),
        };
        let _ = command.sender.send(cdp_response);
    }

    async fn handle_notification(notification: CdpNotification, subscribers: &Subscribers) {
        debug!("Received event: {}", notification.method);

        let event = CdpEvent {
            method: notification.method,
            params: notification.params,
            session_id: notification.session_id,
        };

        let mut subscribers = subscribers.lock().await;
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    async fn send_message(&self, message: Message) -> Result<(), Error> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| Error::websocket("WebSocket sink not available"))?;
        sink.send(message)
            .await
            .map_err(|e| Error::websocket(format!("Failed to send message: {}", e)))
    }
}

#[async_trait]
impl CdpConnection for CdpWebSocketConnection {
    async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is not active"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params) },
            session_id: session_id.map(str::to_string),
        };
        let json = serde_json::to_string(&request)?;
        trace!("CDP -> {}", json);

        let (sender, receiver) = oneshot::channel();
        self.pending_commands.lock().await.insert(
            id,
            PendingCommand {
                sender,
                method: method.to_string(),
            },
        );

        if let Err(e) = self.send_message(Message::Text(json)).await {
            self.pending_commands.lock().await.remove(&id);
            return Err(e);
        }

        let timeout_duration = self.timeout_config.timeout_for(method);
        match tokio::time::timeout(timeout_duration, receiver).await {
            Ok(Ok(response)) => {
                if let Some(error) = &response.error {
                    return Err(Error::cdp(format!(
                        "{}: {} (code: {})",
                        method, error.message, error.code
                    )));
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(Error::websocket(format!(
                "Connection closed while waiting for {} ({})",
                method, id
            ))),
            Err(_) => {
                self.pending_commands.lock().await.remove(&id);
                Err(Error::timeout(format!("Command {} ({}) timed out", method, id)))
            }
        }
    }

    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is not active"));
        }

        let (sender, receiver) = mpsc::channel(256);
        let (unbounded_sender, mut unbounded_receiver) = mpsc::unbounded_channel();
        self.event_subscribers.lock().await.push(unbounded_sender);

        // Forward into a bounded channel so slow consumers apply backpressure here
        tokio::spawn(async move {
            while let Some(event) = unbounded_receiver.recv().await {
                if sender.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(receiver)
    }

    async fn close(&self) -> Result<(), Error> {
        info!("Closing CDP WebSocket connection to {}", self.url);
        self.is_active.store(false, Ordering::SeqCst);

        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                error!("Failed to close WebSocket: {}", e);
            }
        }

        *self.state.write().await = ConnectionState::Closed;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_selection() {
        let config = CdpTimeoutConfig::default();
        assert_eq!(config.timeout_for("Page.navigate").as_secs(), 60);
        assert_eq!(config.timeout_for("Runtime.evaluate").as_secs(), 30);
        assert_eq!(config.timeout_for("Page.addScriptToEvaluateOnNewDocument").as_secs(), 30);
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let result = CdpWebSocketConnection::new("ws://127.0.0.1:1/devtools/page/none").await;
        assert!(matches!(result, Err(Error::WebSocket(_))));
    }
}
