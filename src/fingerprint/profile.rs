//! Profile record
//!
//! A profile owns exactly one fingerprint. The fingerprint is replaced only by
//! an explicit regenerate or import, never by a partial edit.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::model::Fingerprint;
use crate::stealth::generator::GenerationConstraints;
use crate::stealth::proxy::ProxyFacts;
use crate::stealth::traits::FingerprintGenerator;
use crate::stealth::validator::{ConsistencyValidator, Violation};
use crate::{Error, Result};

const NAME_ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "dusky", "eager", "faint", "gentle", "hollow", "ivory", "jolly",
    "keen", "lunar", "misty", "noble", "olive", "proud", "quiet", "rustic", "silver", "tidy",
];

const NAME_NOUNS: &[&str] = &[
    "badger", "cedar", "delta", "ember", "falcon", "glade", "harbor", "island", "juniper", "kestrel",
    "lagoon", "meadow", "nectar", "orchid", "pepper", "quartz", "raven", "summit", "thistle", "willow",
];

/// Browser profile as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    fingerprint: Fingerprint,
    /// Non-owning reference to a proxy
    #[serde(default)]
    pub proxy_id: Option<String>,
    pub data_dir: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, data_dir: D, fingerprint: Fingerprint) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            fingerprint,
            proxy_id: None,
            data_dir: data_dir.into(),
            notes: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
        }
    }

    pub fn with_proxy<S: Into<String>>(mut self, proxy_id: S) -> Self {
        self.proxy_id = Some(proxy_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Read-only view of the owned fingerprint
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Replace the fingerprint with a freshly generated one.
    ///
    /// On error the current fingerprint is kept.
    pub fn regenerate(
        &mut self,
        generator: &dyn FingerprintGenerator,
        constraints: &GenerationConstraints,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let fingerprint = generator.generate(constraints, rng)?;
        self.fingerprint = fingerprint;
        self.updated_at = Utc::now();
        info!("Regenerated fingerprint for profile {}", self.id);
        Ok(())
    }

    /// Replace the fingerprint with an externally supplied one.
    ///
    /// Hard violations reject the import and leave the profile untouched. Soft
    /// violations are returned for the caller to show.
    pub fn import_fingerprint(
        &mut self,
        validator: &ConsistencyValidator,
        fingerprint: Fingerprint,
        proxy: Option<&ProxyFacts>,
    ) -> Result<Vec<Violation>> {
        let result = validator.validate(&fingerprint, proxy);
        if !result.is_ok() {
            warn!(
                "Rejected imported fingerprint for profile {}: {} hard violation(s)",
                self.id,
                result.hard_violations().count()
            );
            return Err(Error::Validation(result));
        }

        let warnings: Vec<Violation> = result.soft_violations().cloned().collect();
        for warning in &warnings {
            warn!("Imported fingerprint for profile {}: {}", self.id, warning);
        }
        self.fingerprint = fingerprint;
        self.updated_at = Utc::now();
        Ok(warnings)
    }

    /// Record a launch
    pub fn touch(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    /// Human-friendly name such as "misty-kestrel-42"
    pub fn random_name(rng: &mut dyn RngCore) -> String {
        let adjective = NAME_ADJECTIVES.choose(&mut *rng).copied().unwrap_or("quiet");
        let noun = NAME_NOUNS.choose(&mut *rng).copied().unwrap_or("meadow");
        let number: u32 = rng.gen_range(10..100);
        format!("{}-{}-{}", adjective, noun, number)
    }
}
