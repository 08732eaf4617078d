//! Configuration management for Ghost-Oxide
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `GHOST_*` environment variables.

use crate::fingerprint::WebRtcPolicy;
use crate::{Error, Result};
use ::config::{Config as Layers, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DevTools endpoint used by the `launch` command
    pub cdp_endpoint: String,

    /// Resample budget before generation gives up
    pub max_generation_attempts: u32,

    /// Upper bound for a single attach or detach, in milliseconds
    pub attach_timeout_ms: u64,

    /// Proxy check results older than this are ignored
    pub proxy_result_max_age_secs: u64,

    /// Optional corpus file replacing the built-in tables
    pub corpus_path: Option<String>,

    /// WebRTC policy used when a request does not override it
    pub default_webrtc_policy: WebRtcPolicy,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cdp_endpoint: "ws://localhost:9222".to_string(),
            max_generation_attempts: 16,
            attach_timeout_ms: 10_000,
            proxy_result_max_age_secs: 1800,
            corpus_path: None,
            default_webrtc_policy: WebRtcPolicy::Disable,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from a file, still honouring environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Build the layered configuration
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Layers::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("GHOST")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .map_err(|e| Error::configuration(format!("Failed to read config: {}", e)))?
            .try_deserialize()
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.check()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without consulting the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.max_generation_attempts == 0 {
            return Err(Error::configuration(
                "max_generation_attempts must be at least 1",
            ));
        }
        if self.attach_timeout_ms == 0 {
            return Err(Error::configuration("attach_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Attach/detach timeout as a duration
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.attach_timeout_ms)
    }

    /// Maximum proxy result age
    pub fn proxy_result_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.proxy_result_max_age_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_generation_attempts, 16);
        assert_eq!(config.attach_timeout(), Duration::from_secs(10));
        assert_eq!(config.default_webrtc_policy, WebRtcPolicy::Disable);
        assert!(config.corpus_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            max_generation_attempts = 4
            default_webrtc_policy = "proxy-only"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_generation_attempts, 4);
        assert_eq!(config.default_webrtc_policy, WebRtcPolicy::ProxyOnly);
        assert_eq!(config.cdp_endpoint, "ws://localhost:9222");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = Config::from_toml_str("max_generation_attempts = 0").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ghost-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "attach_timeout_ms = 2500\nlog_level = \"debug\"\n").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.attach_timeout_ms, 2500);
        assert_eq!(config.log_level, "debug");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Config::from_file("/nonexistent/ghost.toml").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
