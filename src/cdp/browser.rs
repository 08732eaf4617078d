//! CDP browser control implementation
//!
//! Target discovery goes through the DevTools HTTP endpoints (`/json/version`,
//! `/json`, `/json/new`); each page target then gets its own WebSocket.

use super::client::CdpClientImpl;
use super::connection::CdpWebSocketConnection;
use super::traits::*;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// CDP browser implementation
#[derive(Debug)]
pub struct CdpBrowserImpl {
    /// DevTools endpoint (e.g., "http://localhost:9222" or "ws://localhost:9222")
    endpoint: String,
    http: reqwest::Client,
    /// Active connections (target_id -> connection)
    connections: tokio::sync::Mutex<HashMap<String, Arc<dyn CdpConnection>>>,
}

impl CdpBrowserImpl {
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        let endpoint = endpoint.into();
        info!("Creating CDP browser controller for endpoint: {}", endpoint);
        Self {
            endpoint,
            http: reqwest::Client::new(),
            connections: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// HTTP base URL of the DevTools endpoint
    pub fn http_endpoint(&self) -> String {
        http_base(&self.endpoint)
    }

    async fn get_json(&self, path: &str) -> Result<Value, Error> {
        let url = format!("{}{}", self.http_endpoint(), path);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::cdp(format!("Failed to reach DevTools endpoint {}: {}", url, e)))?;
        response
            .json()
            .await
            .map_err(|e| Error::cdp(format!("Invalid response from {}: {}", url, e)))
    }
}

/// Normalize `ws://`, `wss://` or bare `host:port` endpoints to an HTTP base URL
fn http_base(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    let base = if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    // A full devtools path is reduced to its host
    match base.find("/devtools/") {
        Some(idx) => base[..idx].to_string(),
        None => base,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn parse_target(value: &Value) -> Option<TargetInfo> {
    Some(TargetInfo {
        target_id: value.get("id")?.as_str()?.to_string(),
        target_type: value.get("type")?.as_str()?.to_string(),
        title: str_field(value, "title"),
        url: str_field(value, "url"),
        attached: value.get("attached").and_then(Value::as_bool).unwrap_or(false),
        web_socket_debugger_url: value
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[async_trait]
impl CdpBrowser for CdpBrowserImpl {
    async fn create_client(&self, target_url: &str) -> Result<Arc<dyn CdpClient>, Error> {
        info!("Creating CDP client for target: {}", target_url);

        let connection = CdpWebSocketConnection::new(target_url).await?;
        let target_id = target_url.rsplit('/').next().unwrap_or(target_url).to_string();
        self.connections
            .lock()
            .await
            .insert(target_id, Arc::clone(&connection) as Arc<dyn CdpConnection>);

        let client = Arc::new(CdpClientImpl::new(connection));
        client.enable_domain("Page").await?;
        client.enable_domain("Runtime").await?;
        Ok(client)
    }

    async fn close(&self) -> Result<(), Error> {
        let mut connections = self.connections.lock().await;
        info!("Closing {} CDP connections to {}", connections.len(), self.endpoint);

        for (target_id, connection) in connections.drain() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close connection to {}: {}", target_id, e);
            }
        }
        Ok(())
    }

    async fn get_version(&self) -> Result<BrowserVersion, Error> {
        let version = self.get_json("/json/version").await?;
        Ok(BrowserVersion {
            protocol_version: str_field(&version, "Protocol-Version"),
            product: str_field(&version, "Browser"),
            user_agent: str_field(&version, "User-Agent"),
            js_version: str_field(&version, "V8-Version"),
            web_socket_debugger_url: version
                .get("webSocketDebuggerUrl")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn get_targets(&self) -> Result<Vec<TargetInfo>, Error> {
        let targets = self.get_json("/json").await?;
        Ok(targets
            .as_array()
            .map(|list| list.iter().filter_map(parse_target).collect())
            .unwrap_or_default())
    }

    async fn create_target(&self, url: &str) -> Result<String, Error> {
        let new_url = format!("{}/json/new?{}", self.http_endpoint(), url);
        debug!("Creating new page via HTTP API: {}", new_url);

        let response = self.http.put(&new_url).send().await.map_err(|e| {
            Error::cdp(format!(
                "Failed to reach DevTools endpoint {}. Start the browser with \
                 --remote-debugging-port=9222. ({})",
                self.endpoint, e
            ))
        })?;
        let target: Value = response
            .json()
            .await
            .map_err(|e| Error::cdp(format!("Invalid /json/new response: {}", e)))?;

        target
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::cdp("No webSocketDebuggerUrl in new target response"))
    }
}
