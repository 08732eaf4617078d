//! Mock Chrome DevTools Protocol server
//!
//! A WebSocket endpoint that answers the commands the injector sends, keeps a
//! new-document script registry and announces one paused iframe child once
//! auto-attach is enabled. Lets the real WebSocket connection be tested without
//! a Chrome instance.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Session id used for the announced child frame
pub const CHILD_SESSION: &str = "CHILD-FRAME-1";

#[derive(Debug, Default)]
struct ServerState {
    requests: Vec<Value>,
    scripts: BTreeMap<u64, String>,
    next_script: u64,
}

/// Mock Chrome server
pub struct MockChromeServer {
    addr: String,
    state: Arc<Mutex<ServerState>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockChromeServer {
    /// Start a new mock Chrome server
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let ws_addr = format!("ws://{}/devtools/page/MOCK", addr);
        let state = Arc::new(Mutex::new(ServerState::default()));

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server_state = Arc::clone(&state);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                tracing::info!("Mock Chrome: Connection from {}", peer_addr);
                                tokio::spawn(Self::handle_connection(stream, Arc::clone(&server_state)));
                            }
                            Err(e) => {
                                tracing::error!("Mock Chrome: Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Mock Chrome: Shutdown signal received");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr: ws_addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Handle a WebSocket connection
    async fn handle_connection(stream: TcpStream, state: Arc<Mutex<ServerState>>) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!("Mock Chrome: WebSocket handshake error: {}", e);
                return;
            }
        };
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    let Ok(req) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    for message in Self::respond(&req, &state) {
                        if ws_sender.send(Message::Text(message.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::error!("Mock Chrome: WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    /// Response to a request, followed by any events it triggers
    fn respond(req: &Value, state: &Mutex<ServerState>) -> Vec<Value> {
        let method = req.get("method").and_then(Value::as_str).unwrap_or("unknown");
        let id = req.get("id").and_then(Value::as_u64).unwrap_or(0);
        let params = req.get("params").cloned().unwrap_or(Value::Null);
        let session_id = req.get("sessionId").cloned();

        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
        state.requests.push(req.clone());

        let mut out = Vec::new();
        let result = match method {
            "Page.addScriptToEvaluateOnNewDocument" => {
                state.next_script += 1;
                let identifier = state.next_script;
                if session_id.is_none() {
                    let source = params["source"].as_str().unwrap_or_default().to_string();
                    state.scripts.insert(identifier, source);
                }
                json!({ "identifier": identifier.to_string() })
            }
            "Page.removeScriptToEvaluateOnNewDocument" => {
                if let Some(identifier) = params["identifier"].as_str().and_then(|s| s.parse().ok()) {
                    state.scripts.remove(&identifier);
                }
                json!({})
            }
            "Target.setAutoAttach" if session_id.is_none() && params["autoAttach"] == true => {
                out.push(json!({
                    "method": "Target.attachedToTarget",
                    "params": {
                        "sessionId": CHILD_SESSION,
                        "targetInfo": { "targetId": "CHILD", "type": "iframe", "url": "https://ads.example/frame" },
                        "waitingForDebugger": true,
                    }
                }));
                json!({})
            }
            m if m.starts_with("Emulation.") || m.starts_with("Target.") || m.ends_with(".enable") => json!({}),
            "Runtime.runIfWaitingForDebugger" => json!({}),
            _ => {
                return vec![json!({
                    "id": id,
                    "error": { "code": -32601, "message": format!("'{}' wasn't found", method) }
                })];
            }
        };

        let mut response = json!({ "id": id, "result": result });
        if let Some(session_id) = session_id {
            response["sessionId"] = session_id;
        }
        // Chrome answers the command before emitting the events it causes
        out.insert(0, response);
        out
    }

    /// Get the page WebSocket URL
    pub fn ws_endpoint(&self) -> &str {
        &self.addr
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).requests.clone()
    }

    /// Requests of one method sent to one session (`None` for the page)
    pub fn requests_for(&self, method: &str, session_id: Option<&str>) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["method"] == method && r.get("sessionId").and_then(Value::as_str) == session_id)
            .collect()
    }

    /// Scripts registered on the page target
    pub fn page_scripts(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .scripts
            .values()
            .cloned()
            .collect()
    }
}

impl Drop for MockChromeServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_chrome_startup() {
        let server = MockChromeServer::start().await.unwrap();
        assert!(server.ws_endpoint().starts_with("ws://127.0.0.1:"));
        assert!(server.requests().is_empty());
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let state = Mutex::new(ServerState::default());
        let out = MockChromeServer::respond(&json!({ "id": 3, "method": "Nope.nothing" }), &state);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["error"]["code"], -32601);
    }

    #[test]
    fn test_auto_attach_announces_child() {
        let state = Mutex::new(ServerState::default());
        let req = json!({ "id": 1, "method": "Target.setAutoAttach", "params": { "autoAttach": true } });
        let out = MockChromeServer::respond(&req, &state);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], 1);
        assert_eq!(out[1]["params"]["sessionId"], CHILD_SESSION);
    }
}
