//! Stealth engine implementation
//!
//! Ties generation, validation, compilation and injection to the profile
//! lifecycle. A session that cannot be proven injected is closed before the
//! error is returned.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::compiler::{InitScript, InjectionCompiler};
use super::corpus::PlausibilityCorpus;
use super::generator::{FingerprintGeneratorImpl, GenerationConstraints};
use super::injector::CdpSessionInjector;
use super::proxy::{facts_for, ProxyFacts, ProxyHealthSource};
use super::traits::*;
use super::validator::{ConsistencyValidator, ValidationResult};
use crate::config::Config;
use crate::error::InjectionError;
use crate::fingerprint::{Fingerprint, Profile};
use crate::session::SessionHandle;
use crate::Error;

/// Stealth engine implementation
pub struct StealthEngineImpl {
    generator: Arc<dyn FingerprintGenerator>,
    validator: ConsistencyValidator,
    compiler: InjectionCompiler,
    injector: Arc<dyn SessionInjector>,
    proxy_source: Option<Arc<dyn ProxyHealthSource>>,
    proxy_max_age: chrono::Duration,
}

impl StealthEngineImpl {
    /// Create an engine with the corpus-driven generator and the CDP injector
    pub fn new(corpus: Arc<PlausibilityCorpus>, config: &Config) -> Self {
        Self {
            generator: Arc::new(FingerprintGeneratorImpl::from_config(corpus.clone(), config)),
            validator: ConsistencyValidator::new(corpus),
            compiler: InjectionCompiler::new(),
            injector: Arc::new(CdpSessionInjector::from_config(config)),
            proxy_source: None,
            proxy_max_age: config.proxy_result_max_age(),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn FingerprintGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn SessionInjector>) -> Self {
        self.injector = injector;
        self
    }

    /// Read proxy facts from the health checker's latest results
    pub fn with_proxy_source(mut self, source: Arc<dyn ProxyHealthSource>) -> Self {
        self.proxy_source = Some(source);
        self
    }

    pub fn injector(&self) -> &Arc<dyn SessionInjector> {
        &self.injector
    }

    /// Facts for a proxy, or none when the result is absent, failed or stale
    pub fn proxy_facts(&self, proxy_id: &str) -> Option<ProxyFacts> {
        let source = self.proxy_source.as_ref()?;
        let facts = facts_for(source.as_ref(), proxy_id, self.proxy_max_age, Utc::now());
        if facts.is_none() {
            debug!("No usable proxy facts for {}, using defaults", proxy_id);
        }
        facts
    }

    pub fn compile(&self, fingerprint: &Fingerprint) -> InitScript {
        self.compiler.compile(fingerprint)
    }

    async fn abandon(&self, session: &SessionHandle) {
        if let Err(e) = session.close().await {
            warn!("Failed to close session {}: {}", session.id(), e);
        }
    }
}

#[async_trait]
impl StealthEngine for StealthEngineImpl {
    fn generate(
        &self,
        mut constraints: GenerationConstraints,
        proxy_id: Option<&str>,
    ) -> Result<Fingerprint, Error> {
        if constraints.proxy_facts.is_none() {
            constraints.proxy_facts = proxy_id.and_then(|id| self.proxy_facts(id));
        }
        self.generator.generate_random(&constraints)
    }

    fn validate(&self, fingerprint: &Fingerprint, proxy: Option<&ProxyFacts>) -> ValidationResult {
        self.validator.validate(fingerprint, proxy)
    }

    async fn launch(&self, profile: &Profile, session: &SessionHandle) -> Result<LaunchReport, Error> {
        let facts = profile.proxy_id.as_deref().and_then(|id| self.proxy_facts(id));
        let result = self.validator.validate(profile.fingerprint(), facts.as_ref());
        if !result.is_ok() {
            warn!("Profile {} has an inconsistent fingerprint, closing session", profile.id);
            self.abandon(session).await;
            return Err(Error::Validation(result));
        }
        let warnings: Vec<String> = result.soft_violations().map(ToString::to_string).collect();
        for warning in &warnings {
            debug!("Profile {}: {}", profile.id, warning);
        }

        let script = self.compiler.compile(profile.fingerprint());
        let receipt = match self.injector.attach(session, &script).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Attach failed for profile {}: {}, closing session", profile.id, e);
                self.abandon(session).await;
                return Err(e);
            }
        };

        info!(
            "Launched profile {} on session {} (script {})",
            profile.id, receipt.session_id, receipt.digest
        );
        Ok(LaunchReport {
            profile_id: profile.id.clone(),
            receipt,
            warnings,
        })
    }

    async fn close(&self, session: &SessionHandle) -> Result<(), Error> {
        let detached = match self.injector.detach(session).await {
            Err(Error::Injection(InjectionError::SessionClosed { .. })) => Ok(()),
            other => other,
        };
        session.close().await?;
        detached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::{MockCdpClient, MockCdpConnection};
    use crate::fingerprint::tests::sample_fingerprint;
    use crate::fingerprint::{TargetBrowser, TargetOs};
    use crate::stealth::proxy::{ProxyCheckResult, ProxyResultCache, ProxyStatus};

    fn engine() -> StealthEngineImpl {
        StealthEngineImpl::new(Arc::new(PlausibilityCorpus::builtin()), &Config::default())
    }

    fn session() -> (SessionHandle, Arc<MockCdpConnection>) {
        let client = MockCdpClient::new();
        let mock = client.mock();
        (SessionHandle::for_profile("p", Arc::new(client)), mock)
    }

    fn working(proxy_id: &str, country: &str) -> ProxyCheckResult {
        ProxyCheckResult {
            proxy_id: proxy_id.to_string(),
            status: ProxyStatus::Working,
            latency_ms: Some(90),
            country: Some(country.to_string()),
            ip: Some("198.51.100.20".to_string()),
            connection_hint: None,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_uses_proxy_facts() {
        let cache = ProxyResultCache::new();
        cache.record(working("proxy-de", "DE")).unwrap();
        let engine = engine().with_proxy_source(Arc::new(cache));

        let constraints = GenerationConstraints::new(TargetOs::Windows, TargetBrowser::Chrome);
        let fp = engine.generate(constraints.clone(), Some("proxy-de")).unwrap();
        assert!(fp.navigator.language.starts_with("de"));
        assert!(engine.validate(&fp, engine.proxy_facts("proxy-de").as_ref()).is_ok());

        // Unknown proxy falls back to defaults instead of failing
        assert!(engine.generate(constraints, Some("proxy-missing")).is_ok());
    }

    #[tokio::test]
    async fn test_launch_attaches_and_close_detaches() {
        let engine = engine();
        let (session, mock) = session();
        let profile = Profile::new("work", "/tmp/work", sample_fingerprint());

        let report = engine.launch(&profile, &session).await.unwrap();
        assert_eq!(report.profile_id, profile.id);
        assert_eq!(report.receipt.digest, engine.compile(profile.fingerprint()).digest());
        assert_eq!(mock.scripts(None).len(), 1);

        engine.close(&session).await.unwrap();
        assert!(mock.scripts(None).is_empty());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_launch_rejects_inconsistent_fingerprint() {
        let engine = engine();
        let (session, mock) = session();
        let mut fp = sample_fingerprint();
        fp.navigator.webdriver = true;
        let profile = Profile::new("bad", "/tmp/bad", fp);

        let err = engine.launch(&profile, &session).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!session.is_open());
        assert!(mock.calls_for("Page.addScriptToEvaluateOnNewDocument").is_empty());
    }

    #[tokio::test]
    async fn test_failed_attach_closes_session() {
        let engine = engine();
        let (session, mock) = session();
        mock.fail_method("Emulation.setTimezoneOverride");
        let profile = Profile::new("work", "/tmp/work", sample_fingerprint());

        let err = engine.launch(&profile, &session).await.unwrap_err();
        assert!(err.is_injection_failure());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_close_on_closed_session() {
        let engine = engine();
        let (session, _mock) = session();
        session.close().await.unwrap();
        engine.close(&session).await.unwrap();
    }
}
