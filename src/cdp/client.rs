//! CDP client implementation
//!
//! This module provides a high-level CDP client with typed methods for common operations.

use super::traits::*;
use super::types::*;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// How often and how long `navigate` polls `document.readyState`
const READY_POLL_INTERVAL_MS: u64 = 100;
const READY_POLL_ATTEMPTS: u32 = 50;

/// CDP client implementation
#[derive(Debug, Clone)]
pub struct CdpClientImpl {
    connection: Arc<dyn CdpConnection>,
}

impl CdpClientImpl {
    pub fn new(connection: Arc<dyn CdpConnection>) -> Self {
        debug!("Creating CDP client");
        Self { connection }
    }

    /// Parse remote object value to evaluation result
    fn parse_remote_object(obj: &RemoteObject) -> EvaluationResult {
        match obj.r#type.as_str() {
            "string" => EvaluationResult::String(
                obj.value
                    .as_ref()
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ),
            "number" => EvaluationResult::Number(
                obj.value.as_ref().and_then(|v| v.as_f64()).unwrap_or(0.0),
            ),
            "boolean" => {
                EvaluationResult::Bool(obj.value.as_ref().and_then(|v| v.as_bool()).unwrap_or(false))
            }
            "object" if obj.subtype.as_deref() == Some("null") => EvaluationResult::Null,
            "object" => EvaluationResult::Object(obj.value.clone().unwrap_or(serde_json::Value::Null)),
            _ => EvaluationResult::Null,
        }
    }

    fn into_result(method: &str, response: CdpResponse) -> Result<serde_json::Value, Error> {
        if let Some(error) = response.error {
            return Err(Error::cdp(format!("{}: {} (code: {})", method, error.message, error.code)));
        }
        response
            .result
            .ok_or_else(|| Error::cdp(format!("{}: no result in response", method)))
    }
}

#[async_trait]
impl CdpClient for CdpClientImpl {
    fn connection(&self) -> Arc<dyn CdpConnection> {
        Arc::clone(&self.connection)
    }

    async fn navigate(&self, url: &str) -> Result<NavigationResult, Error> {
        info!("Navigating to {}", url);

        let params = NavigateParams {
            url: url.to_string(),
            referrer: None,
        };
        let result = self.call_method("Page.navigate", serde_json::to_value(params)?).await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::cdp(format!("Navigation to {} failed: {}", url, error_text)));
        }

        for attempt in 0..READY_POLL_ATTEMPTS {
            tokio::time::sleep(tokio::time::Duration::from_millis(READY_POLL_INTERVAL_MS)).await;
            match self.evaluate("document.readyState", false).await {
                Ok(EvaluationResult::String(state)) if state == "complete" => {
                    debug!("Page loaded after {} polls", attempt + 1);
                    break;
                }
                Ok(_) => {}
                Err(e) => debug!("readyState poll {} failed: {}", attempt + 1, e),
            }
        }

        Ok(NavigationResult {
            navigation_id: result
                .get("loaderId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            url: url.to_string(),
        })
    }

    async fn evaluate(&self, script: &str, await_promise: bool) -> Result<EvaluationResult, Error> {
        debug!("Evaluating script ({} bytes)", script.len());

        let params = EvaluateParams {
            expression: script.to_string(),
            await_promise: Some(await_promise),
            return_by_value: Some(true),
        };
        let result = self.call_method("Runtime.evaluate", serde_json::to_value(params)?).await?;
        let response: EvaluateResponse = serde_json::from_value(result)?;

        if let Some(exception) = response.exception_details {
            let description = exception
                .exception
                .and_then(|e| e.description)
                .or(exception.text)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Error::script_execution_failed(description));
        }

        Ok(Self::parse_remote_object(&response.result))
    }

    async fn enable_domain(&self, domain: &str) -> Result<(), Error> {
        debug!("Enabling domain: {}", domain);
        self.call_method(&format!("{}.enable", domain), serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn call_method(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, Error> {
        debug!("Calling CDP method: {}", method);
        let response = self.connection.send_command(method, params, None).await?;
        Self::into_result(method, response)
    }

    async fn call_session_method(
        &self,
        session_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        debug!("Calling CDP method {} in session {}", method, session_id);
        let response = self
            .connection
            .send_command(method, params, Some(session_id))
            .await?;
        Self::into_result(method, response)
    }

    async fn subscribe_events(&self, event_type: &str) -> Result<tokio::sync::mpsc::Receiver<CdpEvent>, Error> {
        debug!("Subscribing to events: {}", event_type);

        let mut events = self.connection.listen_events().await?;
        let (tx, rx) = tokio::sync::mpsc::channel(100);
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
