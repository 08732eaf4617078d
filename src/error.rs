//! Unified error types for Ghost-Oxide

use crate::stealth::validator::{ValidationResult, Violation};
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Ghost-Oxide
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fingerprint generation errors
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Session injection errors
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// A fingerprint was refused because of hard violations
    #[error("Fingerprint rejected: {}", summarize(.0.hard_violations()))]
    Validation(ValidationResult),

    /// Corpus could not be loaded or is inconsistent
    #[error("Corpus error: {0}")]
    Corpus(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Timeout on a transport operation
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Script execution failed
    #[error("Script execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Raised when the generator cannot produce a valid fingerprint.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    /// Every resample produced at least one hard violation
    #[error("generation exhausted after {attempts} attempts: {}", summarize(.last_violations.iter()))]
    Exhausted {
        attempts: u32,
        last_violations: Vec<Violation>,
    },

    /// The corpus has no entry for the requested combination
    #[error("no corpus data for {0}")]
    NoCorpusData(String),
}

/// Raised by the session injector. A session that reports one of these
/// must not be treated as spoofed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    #[error("attach failed on session {session_id}: {reason}")]
    AttachFailed { session_id: String, reason: String },

    #[error("session {session_id} is closed")]
    SessionClosed { session_id: String },

    #[error("{operation} on session {session_id} timed out after {after_ms}ms")]
    Timeout {
        session_id: String,
        operation: &'static str,
        after_ms: u64,
    },
}

fn summarize<'a>(violations: impl Iterator<Item = &'a Violation>) -> String {
    let parts: Vec<String> = violations.map(|v| v.to_string()).collect();
    if parts.is_empty() {
        "no violations recorded".to_string()
    } else {
        parts.join("; ")
    }
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new CDP error
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Create a new corpus error
    pub fn corpus<S: Into<String>>(msg: S) -> Self {
        Error::Corpus(msg.into())
    }

    /// Create a new session not found error
    pub fn session_not_found<S: Into<String>>(id: S) -> Self {
        Error::SessionNotFound(id.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new script execution failed error
    pub fn script_execution_failed<S: Into<String>>(msg: S) -> Self {
        Error::ScriptExecutionFailed(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error means the session could not be proven injected
    pub fn is_injection_failure(&self) -> bool {
        matches!(self, Error::Injection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::validator::{Invariant, Severity};

    #[test]
    fn test_exhausted_message_lists_violations() {
        let err = GenerationError::Exhausted {
            attempts: 16,
            last_violations: vec![Violation::hard(
                Invariant::Webdriver,
                "navigator.webdriver",
                "must be false",
            )],
        };
        let text = err.to_string();
        assert!(text.contains("16 attempts"));
        assert!(text.contains("webdriver"));
    }

    #[test]
    fn test_injection_error_wraps() {
        let err: Error = InjectionError::SessionClosed {
            session_id: "s-1".to_string(),
        }
        .into();
        assert!(err.is_injection_failure());
        assert_eq!(err.to_string(), "session s-1 is closed");
    }

    #[test]
    fn test_validation_error_only_mentions_hard() {
        let result = ValidationResult::from_violations(vec![
            Violation::hard(Invariant::Webdriver, "navigator.webdriver", "must be false"),
            Violation::soft(Invariant::ProxyGeo, "timezone.timezone", "zone outside JP"),
        ]);
        let text = Error::Validation(result).to_string();
        assert!(text.contains("webdriver"));
        assert!(!text.contains("proxy-geo"));
        assert_eq!(Severity::Hard.to_string(), "hard");
    }
}
