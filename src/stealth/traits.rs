//! Stealth engine traits
//!
//! Abstract interfaces for fingerprint generation, session injection and the
//! engine facade that ties them to a profile's lifecycle.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;

use super::compiler::InitScript;
use super::generator::GenerationConstraints;
use super::proxy::ProxyFacts;
use super::validator::ValidationResult;
use crate::fingerprint::{Fingerprint, Profile};
use crate::session::SessionHandle;

// ============================================================================
// Fingerprint Generator
// ============================================================================

/// Fingerprint generator trait
///
/// Pure: the output depends only on the constraints, the corpus and the
/// randomness source, so a seeded source reproduces a fingerprint exactly.
pub trait FingerprintGenerator: Send + Sync {
    /// Generate a fingerprint that passes validation without hard violations
    fn generate(
        &self,
        constraints: &GenerationConstraints,
        rng: &mut dyn RngCore,
    ) -> Result<Fingerprint, crate::Error>;

    /// Generate with a freshly seeded source
    fn generate_random(&self, constraints: &GenerationConstraints) -> Result<Fingerprint, crate::Error> {
        let mut rng = StdRng::from_entropy();
        self.generate(constraints, &mut rng)
    }
}

// ============================================================================
// Session Injector
// ============================================================================

/// Session injector trait
///
/// Installs an [`InitScript`] so it runs in every new document and worker of a
/// session before page script does. At most one script is active per session.
#[async_trait]
pub trait SessionInjector: Send + Sync {
    /// Install `script`, replacing any script already attached to the session
    async fn attach(
        &self,
        session: &SessionHandle,
        script: &InitScript,
    ) -> Result<AttachReceipt, crate::Error>;

    /// Remove the attached script and protocol overrides
    async fn detach(&self, session: &SessionHandle) -> Result<(), crate::Error>;

    /// Script currently attached to a session
    async fn active_script(&self, session_id: &str) -> Option<ActiveScript>;
}

/// Result of a successful attach
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachReceipt {
    pub session_id: String,
    /// Identifier returned by `Page.addScriptToEvaluateOnNewDocument`
    pub identifier: String,
    pub revision: u64,
    pub digest: String,
    /// Whether an earlier script was replaced
    pub replaced: bool,
}

/// Script currently installed on a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveScript {
    pub identifier: String,
    pub revision: u64,
    pub digest: String,
}

// ============================================================================
// Stealth Engine
// ============================================================================

/// Stealth engine trait
///
/// Entry points used by the profile lifecycle: generate and validate at
/// creation or import, compile and attach at launch, detach at close.
#[async_trait]
pub trait StealthEngine: Send + Sync {
    /// Generate a fingerprint, resolving proxy facts for `proxy_id` when given
    fn generate(
        &self,
        constraints: GenerationConstraints,
        proxy_id: Option<&str>,
    ) -> Result<Fingerprint, crate::Error>;

    /// Validate a fingerprint against the corpus and optional proxy facts
    fn validate(&self, fingerprint: &Fingerprint, proxy: Option<&ProxyFacts>) -> ValidationResult;

    /// Validate, compile and attach the profile's fingerprint.
    ///
    /// The session is closed when the script cannot be attached.
    async fn launch(
        &self,
        profile: &Profile,
        session: &SessionHandle,
    ) -> Result<LaunchReport, crate::Error>;

    /// Detach and close the session
    async fn close(&self, session: &SessionHandle) -> Result<(), crate::Error>;
}

/// Outcome of a launch
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchReport {
    pub profile_id: String,
    pub receipt: AttachReceipt,
    /// Soft violations found while validating the stored fingerprint
    pub warnings: Vec<String>,
}
