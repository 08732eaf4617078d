//! Mock CDP implementation for testing
//!
//! The mock connection records every command, keeps the new-document script
//! registry a browser would, and lets tests push events, inject latency or make
//! individual methods fail.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cdp::traits::*;
use crate::Error;

/// One command seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    /// (session, identifier) -> source
    scripts: BTreeMap<(Option<String>, u64), String>,
    /// Latest parameters per (session, Emulation method)
    emulation: HashMap<(Option<String>, String), Value>,
    failing: HashSet<String>,
    latency: Option<Duration>,
    /// Per-method delay between handling a command and replying to it
    reply_delays: HashMap<String, Duration>,
}

/// Mock CDP connection
#[derive(Debug)]
pub struct MockCdpConnection {
    id: String,
    is_active: AtomicBool,
    next_id: AtomicU64,
    next_script: AtomicU64,
    state: Mutex<MockState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CdpEvent>>>,
}

impl MockCdpConnection {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            is_active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            next_script: AtomicU64::new(1),
            state: Mutex::new(MockState::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every command received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Commands of one method
    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Sources registered for new documents in a session, oldest first
    pub fn scripts(&self, session_id: Option<&str>) -> Vec<String> {
        self.state()
            .scripts
            .iter()
            .filter(|((session, _), _)| session.as_deref() == session_id)
            .map(|(_, source)| source.clone())
            .collect()
    }

    /// Latest parameters of an `Emulation.*` command on the page session
    pub fn emulation(&self, method: &str) -> Option<Value> {
        self.emulation_for(None, method)
    }

    pub fn emulation_for(&self, session_id: Option<&str>, method: &str) -> Option<Value> {
        self.state()
            .emulation
            .get(&(session_id.map(str::to_string), method.to_string()))
            .cloned()
    }

    /// Make every later call of `method` fail
    pub fn fail_method(&self, method: &str) {
        self.state().failing.insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Delay every command by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Handle `method` at once but hold its reply back by `delay`
    pub fn delay_reply(&self, method: &str, delay: Option<Duration>) {
        let mut state = self.state();
        match delay {
            Some(delay) => state.reply_delays.insert(method.to_string(), delay),
            None => state.reply_delays.remove(method),
        };
    }

    /// Deliver an event to all subscribers
    pub fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        let event = CdpEvent {
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Announce an auto-attached child target paused before its first script
    pub fn emit_attached_to_target(&self, session_id: &str, target_type: &str) {
        self.emit(
            "Target.attachedToTarget",
            json!({
                "sessionId": session_id,
                "targetInfo": {
                    "targetId": uuid::Uuid::new_v4().to_string(),
                    "type": target_type,
                    "url": "https://example.test/child",
                },
                "waitingForDebugger": true,
            }),
            None,
        );
    }

    /// Announce that a child target's session ended
    pub fn emit_detached_from_target(&self, session_id: &str) {
        self.emit(
            "Target.detachedFromTarget",
            json!({ "sessionId": session_id, "targetId": uuid::Uuid::new_v4().to_string() }),
            None,
        );
    }

    fn respond(&self, method: &str, params: &Value, session_id: Option<&str>) -> Result<Value, Error> {
        let mut state = self.state();
        state.calls.push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
            session_id: session_id.map(str::to_string),
        });
        if state.failing.contains(method) {
            return Err(Error::cdp(format!("{}: mock failure (code: -32000)", method)));
        }

        let session = session_id.map(str::to_string);
        let result = match method {
            "Page.addScriptToEvaluateOnNewDocument" => {
                let identifier = self.next_script.fetch_add(1, Ordering::SeqCst);
                let source = params
                    .get("source")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                state.scripts.insert((session, identifier), source);
                json!({ "identifier": identifier.to_string() })
            }
            "Page.removeScriptToEvaluateOnNewDocument" => {
                let identifier = params
                    .get("identifier")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or_default();
                state.scripts.remove(&(session, identifier));
                json!({})
            }
            m if m.starts_with("Emulation.") => {
                state.emulation.insert((session, m.to_string()), params.clone());
                json!({})
            }
            "Page.navigate" => json!({
                "frameId": uuid::Uuid::new_v4().to_string(),
                "loaderId": uuid::Uuid::new_v4().to_string(),
            }),
            "Runtime.evaluate" => {
                let expression = params.get("expression").and_then(Value::as_str).unwrap_or_default();
                if expression.contains("readyState") {
                    json!({ "result": { "type": "string", "value": "complete" } })
                } else {
                    json!({ "result": { "type": "undefined" } })
                }
            }
            _ => json!({}),
        };
        Ok(result)
    }
}

impl Default for MockCdpConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpConnection for MockCdpConnection {
    async fn send_command(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<CdpResponse, Error> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let result = self.respond(method, &params, session_id);
        let reply_delay = self.state().reply_delays.get(method).copied();
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        let result = result?;
        Ok(CdpResponse {
            id,
            result: Some(result),
            error: None,
        })
    }

    async fn listen_events(&self) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::websocket("Connection is closed"));
        }

        let (unbounded_tx, mut unbounded_rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(unbounded_tx);

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            while let Some(event) = unbounded_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::SeqCst);
        self.subscribers.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }
}

/// Mock CDP client
#[derive(Debug, Clone)]
pub struct MockCdpClient {
    connection: Arc<MockCdpConnection>,
}

impl MockCdpClient {
    pub fn new() -> Self {
        Self {
            connection: Arc::new(MockCdpConnection::new()),
        }
    }

    /// The concrete connection, for assertions
    pub fn mock(&self) -> Arc<MockCdpConnection> {
        Arc::clone(&self.connection)
    }
}

impl Default for MockCdpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpClient for MockCdpClient {
    fn connection(&self) -> Arc<dyn CdpConnection> {
        self.connection.clone()
    }

    async fn navigate(&self, url: &str) -> Result<NavigationResult, Error> {
        let result = self.call_method("Page.navigate", json!({ "url": url })).await?;
        Ok(NavigationResult {
            navigation_id: result.get("loaderId").and_then(Value::as_str).map(str::to_string),
            url: url.to_string(),
        })
    }

    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, Error> {
        let result = self
            .call_method(
                "Runtime.evaluate",
                json!({ "expression": script, "awaitPromise": await_promise, "returnByValue": true }),
            )
            .await?;
        Ok(match result.pointer("/result/value") {
            Some(Value::String(s)) => EvaluationResult::String(s.clone()),
            Some(Value::Bool(b)) => EvaluationResult::Bool(*b),
            Some(Value::Number(n)) => EvaluationResult::Number(n.as_f64().unwrap_or_default()),
            Some(Value::Null) | None => EvaluationResult::Null,
            Some(other) => EvaluationResult::Object(other.clone()),
        })
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        self.call_method(&format!("{}.enable", domain), json!({})).await?;
        Ok(())
    }

    async fn call_method(&self, method: &str, params: Value) -> Result<Value, Error> {
        let response = self.connection.send_command(method, params, None).await?;
        response.result.ok_or_else(|| Error::cdp("No result in response"))
    }

    async fn call_session_method(&self, session_id: &str, method: &str, params: Value) -> Result<Value, Error> {
        let response = self
            .connection
            .send_command(method, params, Some(session_id))
            .await?;
        response.result.ok_or_else(|| Error::cdp("No result in response"))
    }

    async fn subscribe_events(&self, event_type: &str) -> Result<mpsc::Receiver<CdpEvent>, Error> {
        let mut events = self.connection.listen_events().await?;
        let (tx, rx) = mpsc::channel(100);
        let wanted = event_type.to_string();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if (wanted == "*" || event.method == wanted) && tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Mock CDP browser
#[derive(Debug)]
pub struct MockCdpBrowser {
    is_active: AtomicBool,
    clients: Mutex<Vec<Arc<MockCdpClient>>>,
    targets: Mutex<Vec<TargetInfo>>,
}

impl MockCdpBrowser {
    pub fn new() -> Self {
        Self {
            is_active: AtomicBool::new(true),
            clients: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
        }
    }

    /// Clients handed out so far
    pub fn clients(&self) -> Vec<Arc<MockCdpClient>> {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl Default for MockCdpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CdpBrowser for MockCdpBrowser {
    async fn create_client(&self, _target_url: &str) -> Result<Arc<dyn CdpClient>, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::cdp("Browser is closed"));
        }
        let client = Arc::new(MockCdpClient::new());
        self.clients
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&client));
        Ok(client)
    }

    async fn close(&self) -> Result<(), Error> {
        self.is_active.store(false, Ordering::SeqCst);
        for client in self.clients() {
            client.connection().close().await?;
        }
        Ok(())
    }

    async fn get_version(&self) -> Result<BrowserVersion, Error> {
        Ok(BrowserVersion {
            protocol_version: "1.3".to_string(),
            product: "Chrome/131.0.6778.86".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/131.0.6778.86".to_string(),
            js_version: "13.1.201.9".to_string(),
            web_socket_debugger_url: Some("ws://localhost:9222/devtools/browser/mock".to_string()),
        })
    }

    async fn get_targets(&self) -> Result<Vec<TargetInfo>, Error> {
        Ok(self.targets.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    async fn create_target(&self, url: &str) -> Result<String, Error> {
        if !self.is_active.load(Ordering::SeqCst) {
            return Err(Error::cdp("Browser is closed"));
        }
        let target_id = uuid::Uuid::new_v4().simple().to_string();
        let ws_url = format!("ws://localhost:9222/devtools/page/{}", target_id);
        self.targets
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(TargetInfo {
                target_id,
                target_type: "page".to_string(),
                title: String::new(),
                url: url.to_string(),
                attached: false,
                web_socket_debugger_url: Some(ws_url.clone()),
            });
        tracing::debug!("Mock: created target for {} => {}", url, ws_url);
        Ok(ws_url)
    }
}
