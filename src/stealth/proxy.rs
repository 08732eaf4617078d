//! Proxy facts consumed by the generator
//!
//! The proxy health checker lives outside this crate. Only its latest
//! completed result per proxy is read, and anything missing, failed or stale
//! is treated as "no facts".

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::geo::normalize_country;
use crate::Error;

/// Kind of egress network behind a proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionHint {
    Residential,
    Datacenter,
    Mobile,
}

/// Geo and network facts derived from a usable proxy check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyFacts {
    /// ISO 3166 alpha-2, upper case
    pub country: Option<String>,
    pub connection_hint: Option<ConnectionHint>,
    pub latency_ms: Option<u32>,
    pub egress_ip: Option<String>,
}

impl ProxyFacts {
    /// Facts naming only a country
    pub fn for_country(country: &str) -> Self {
        Self {
            country: Some(normalize_country(country)),
            ..Self::default()
        }
    }

    /// Normalized country code. Facts may be built or deserialized with any
    /// casing, so readers go through this rather than the raw field.
    pub fn country_code(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(normalize_country)
            .filter(|code| !code.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    Working,
    Failed,
    Unknown,
}

/// One completed proxy health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCheckResult {
    pub proxy_id: String,
    pub status: ProxyStatus,
    pub latency_ms: Option<u32>,
    pub country: Option<String>,
    pub ip: Option<String>,
    pub connection_hint: Option<ConnectionHint>,
    pub checked_at: DateTime<Utc>,
}

impl ProxyCheckResult {
    /// Facts usable for generation, if the check succeeded recently enough
    pub fn facts(&self, max_age: Duration, now: DateTime<Utc>) -> Option<ProxyFacts> {
        if self.status != ProxyStatus::Working {
            debug!("Proxy {} not working ({:?}), ignoring", self.proxy_id, self.status);
            return None;
        }
        if now - self.checked_at > max_age {
            debug!("Proxy {} result from {} is stale", self.proxy_id, self.checked_at);
            return None;
        }
        Some(ProxyFacts {
            country: self.country.as_deref().map(normalize_country),
            connection_hint: self.connection_hint,
            latency_ms: self.latency_ms,
            egress_ip: self.ip.clone(),
        })
    }
}

/// Read-only view of the proxy health checker
pub trait ProxyHealthSource: Send + Sync {
    /// Latest completed check for `proxy_id`, if any
    fn latest_result(&self, proxy_id: &str) -> Option<ProxyCheckResult>;
}

/// Resolve facts for a proxy, treating absent, failed and stale results alike
pub fn facts_for(
    source: &dyn ProxyHealthSource,
    proxy_id: &str,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Option<ProxyFacts> {
    source.latest_result(proxy_id)?.facts(max_age, now)
}

/// In-memory store of the newest result per proxy
#[derive(Debug, Clone, Default)]
pub struct ProxyResultCache {
    results: Arc<RwLock<HashMap<String, ProxyCheckResult>>>,
}

impl ProxyResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a result unless a newer one is already held
    pub fn record(&self, result: ProxyCheckResult) -> Result<(), Error> {
        let mut results = self
            .results
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?;

        match results.get(&result.proxy_id) {
            Some(existing) if existing.checked_at > result.checked_at => {
                debug!("Dropping out-of-order result for proxy {}", result.proxy_id);
            }
            _ => {
                results.insert(result.proxy_id.clone(), result);
            }
        }
        Ok(())
    }

    /// Forget a proxy
    pub fn remove(&self, proxy_id: &str) -> Result<(), Error> {
        self.results
            .write()
            .map_err(|e| Error::internal(format!("Lock error: {}", e)))?
            .remove(proxy_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.results.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProxyHealthSource for ProxyResultCache {
    fn latest_result(&self, proxy_id: &str) -> Option<ProxyCheckResult> {
        self.results.read().ok()?.get(proxy_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(id: &str, status: ProxyStatus, age_minutes: i64) -> ProxyCheckResult {
        ProxyCheckResult {
            proxy_id: id.to_string(),
            status,
            latency_ms: Some(180),
            country: Some("de".to_string()),
            ip: Some("203.0.113.7".to_string()),
            connection_hint: Some(ConnectionHint::Residential),
            checked_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn test_working_result_yields_facts() {
        let cache = ProxyResultCache::new();
        cache.record(check("p1", ProxyStatus::Working, 5)).unwrap();

        let facts = facts_for(&cache, "p1", Duration::minutes(30), Utc::now()).unwrap();
        assert_eq!(facts.country.as_deref(), Some("DE"));
        assert_eq!(facts.latency_ms, Some(180));
        assert_eq!(facts.egress_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_failed_absent_and_stale_are_equivalent() {
        let cache = ProxyResultCache::new();
        cache.record(check("failed", ProxyStatus::Failed, 1)).unwrap();
        cache.record(check("unknown", ProxyStatus::Unknown, 1)).unwrap();
        cache.record(check("stale", ProxyStatus::Working, 120)).unwrap();

        let max_age = Duration::minutes(30);
        let now = Utc::now();
        assert!(facts_for(&cache, "failed", max_age, now).is_none());
        assert!(facts_for(&cache, "unknown", max_age, now).is_none());
        assert!(facts_for(&cache, "stale", max_age, now).is_none());
        assert!(facts_for(&cache, "absent", max_age, now).is_none());
    }

    #[test]
    fn test_older_result_does_not_replace_newer() {
        let cache = ProxyResultCache::new();
        cache.record(check("p1", ProxyStatus::Working, 1)).unwrap();
        cache.record(check("p1", ProxyStatus::Failed, 10)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.latest_result("p1").unwrap().status, ProxyStatus::Working);

        cache.remove("p1").unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_deserialized_country_is_normalized() {
        let facts: ProxyFacts = serde_json::from_str(r#"{"country":" de "}"#).unwrap();
        assert_eq!(facts.country_code().as_deref(), Some("DE"));

        let blank: ProxyFacts = serde_json::from_str(r#"{"country":""}"#).unwrap();
        assert!(blank.country_code().is_none());
    }
}
