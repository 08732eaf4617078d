//! CDP (Chrome DevTools Protocol) type definitions
//!
//! Wire records for requests, responses and the events the injector consumes.

use serde::{Deserialize, Serialize};

/// CDP JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    /// Method name (e.g., "Page.addScriptToEvaluateOnNewDocument")
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Flattened child session
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC notification (event)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpNotification {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    pub id: u64,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
}

/// CDP error detail
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Page navigation parameters
#[derive(Debug, Clone, Serialize)]
pub struct NavigateParams {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

/// JavaScript evaluation parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub await_promise: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_by_value: Option<bool>,
}

/// Remote object (result of JavaScript evaluation)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(default)]
    pub r#type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unserializable_value: Option<String>,
}

/// Exception details
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    #[serde(default)]
    pub exception_id: i32,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

/// `Runtime.evaluate` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    #[serde(default)]
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// Target description carried by `Target.attachedToTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedTargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub url: String,
}

/// Parameters of `Target.attachedToTarget`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    pub session_id: String,
    pub target_info: AttachedTargetInfo,
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

/// Kind of auto-attached child target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildTargetKind {
    Frame,
    Worker,
    Other,
}

impl AttachedTargetInfo {
    pub fn kind(&self) -> ChildTargetKind {
        match self.target_type.as_str() {
            "iframe" | "page" => ChildTargetKind::Frame,
            "worker" | "shared_worker" | "service_worker" => ChildTargetKind::Worker,
            _ => ChildTargetKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_request_serialization() {
        let request = CdpRequest {
            id: 1,
            method: "Page.addScriptToEvaluateOnNewDocument".to_string(),
            params: Some(serde_json::json!({ "source": "1" })),
            session_id: Some("S1".to_string()),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"sessionId\":\"S1\""));
    }

    #[test]
    fn test_cdp_request_without_params() {
        let request = CdpRequest {
            id: 2,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("\"params\""));
        assert!(!json.contains("sessionId"));
    }

    #[test]
    fn test_attached_to_target_parsing() {
        let params = serde_json::json!({
            "sessionId": "CHILD",
            "targetInfo": { "targetId": "T1", "type": "service_worker", "url": "https://a.test/sw.js" },
            "waitingForDebugger": true
        });
        let event: AttachedToTarget = serde_json::from_value(params).unwrap();
        assert_eq!(event.session_id, "CHILD");
        assert!(event.waiting_for_debugger);
        assert_eq!(event.target_info.kind(), ChildTargetKind::Worker);
    }

    #[test]
    fn test_notification_session_id() {
        let text = r#"{"method":"Runtime.executionContextCreated","params":{},"sessionId":"abc"}"#;
        let notification: CdpNotification = serde_json::from_str(text).unwrap();
        assert_eq!(notification.session_id.as_deref(), Some("abc"));
    }
}
