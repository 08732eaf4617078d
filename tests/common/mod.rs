//! Common test utilities
//!
//! Shared fixtures for the integration tests: corpus, engine, seeded
//! generation and sessions backed by the recording mock client.

#![allow(dead_code)]

use ghost_oxide::cdp::{MockCdpClient, MockCdpConnection};
use ghost_oxide::config::Config;
use ghost_oxide::fingerprint::{Fingerprint, TargetBrowser, TargetOs};
use ghost_oxide::session::SessionHandle;
use ghost_oxide::stealth::{
    FingerprintGenerator, FingerprintGeneratorImpl, GenerationConstraints, PlausibilityCorpus,
    ProxyFacts, StealthEngineImpl,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

pub fn corpus() -> Arc<PlausibilityCorpus> {
    Arc::new(PlausibilityCorpus::builtin())
}

pub fn generator() -> FingerprintGeneratorImpl {
    FingerprintGeneratorImpl::new(corpus())
}

pub fn engine() -> StealthEngineImpl {
    StealthEngineImpl::new(corpus(), &Config::default())
}

/// Generate one fingerprint from a seed, optionally behind a proxy country
pub fn generate_seeded(os: TargetOs, browser: TargetBrowser, country: Option<&str>, seed: u64) -> Fingerprint {
    let mut constraints = GenerationConstraints::new(os, browser);
    if let Some(country) = country {
        constraints = constraints.with_proxy_facts(ProxyFacts::for_country(country));
    }
    generator()
        .generate(&constraints, &mut StdRng::seed_from_u64(seed))
        .expect("generation should succeed")
}

/// A session over the recording mock client
pub fn mock_session(profile_id: &str) -> (Arc<SessionHandle>, Arc<MockCdpConnection>) {
    let client = MockCdpClient::new();
    let mock = client.mock();
    (Arc::new(SessionHandle::for_profile(profile_id, Arc::new(client))), mock)
}

/// Poll until `check` holds or the deadline passes
pub async fn eventually<F: Fn() -> bool>(check: F, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixtures() {
        let fp = generate_seeded(TargetOs::Windows, TargetBrowser::Chrome, Some("FR"), 1);
        assert_eq!(fp.timezone.timezone, "Europe/Paris");

        let (session, _mock) = mock_session("fixture");
        assert!(session.is_open());
        assert!(eventually(|| true, 10).await);
    }
}
