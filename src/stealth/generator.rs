//! Fingerprint generator implementation
//!
//! Samples a device tier from the corpus, derives every dependent field from
//! that sample, and validates its own output before returning it. All
//! randomness comes from the caller's RNG, so a seeded RNG gives a
//! reproducible fingerprint.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::corpus::{
    DeviceTier, FormFactor, PlatformProfile, PlausibilityCorpus, ScreenMode,
    CHROMIUM_MASKED_RENDERER, CHROMIUM_MASKED_VENDOR, FIREFOX_MASKED,
};
use super::geo::{self, COUNTRIES, ZONES};
use super::proxy::{ConnectionHint, ProxyFacts};
use super::traits::FingerprintGenerator;
use super::user_agent::{app_version, build_user_agent};
use super::validator::ConsistencyValidator;
use crate::config::Config;
use crate::error::GenerationError;
use crate::fingerprint::{
    AudioFingerprint, CanvasFingerprint, Fingerprint, FontsFingerprint, HardwareFingerprint,
    MimeType, MiscFingerprint, NavigatorFingerprint, NetworkFingerprint, PermissionState, Plugin,
    ScreenFingerprint, TargetBrowser, TargetOs, TimezoneFingerprint, WebGlFingerprint,
    WebRtcPolicy,
};
use crate::Result;

/// Chance of picking a country's primary locale over a secondary one
const PRIMARY_LOCALE_SHARE: f64 = 0.85;
/// Chance that an optional font is present
const OPTIONAL_FONT_SHARE: f64 = 0.5;

const PDF_PLUGINS: [&str; 5] = [
    "PDF Viewer",
    "Chrome PDF Viewer",
    "Chromium PDF Viewer",
    "Microsoft Edge PDF Viewer",
    "WebKit built-in PDF",
];

const PROMPT_PERMISSIONS: [&str; 4] = ["geolocation", "notifications", "camera", "microphone"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Explicit values that replace sampled ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintOverrides {
    pub screen: Option<ScreenSize>,
    pub pixel_ratio: Option<f64>,
    /// IANA zone name
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub web_rtc_policy: Option<WebRtcPolicy>,
}

/// Input of one generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConstraints {
    pub os: TargetOs,
    pub browser: TargetBrowser,
    #[serde(default)]
    pub proxy_facts: Option<ProxyFacts>,
    #[serde(default)]
    pub overrides: FingerprintOverrides,
    /// Instant the timezone offset is computed for; now when absent
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl GenerationConstraints {
    pub fn new(os: TargetOs, browser: TargetBrowser) -> Self {
        Self {
            os,
            browser,
            proxy_facts: None,
            overrides: FingerprintOverrides::default(),
            at: None,
        }
    }

    pub fn with_proxy_facts(mut self, facts: ProxyFacts) -> Self {
        self.proxy_facts = Some(facts);
        self
    }

    pub fn with_overrides(mut self, overrides: FingerprintOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }
}

/// Corpus-driven generator
pub struct FingerprintGeneratorImpl {
    corpus: Arc<PlausibilityCorpus>,
    validator: ConsistencyValidator,
    max_attempts: u32,
    default_policy: WebRtcPolicy,
}

impl FingerprintGeneratorImpl {
    /// Create a generator with the default retry budget and WebRTC policy
    pub fn new(corpus: Arc<PlausibilityCorpus>) -> Self {
        let defaults = Config::default();
        Self {
            validator: ConsistencyValidator::new(corpus.clone()),
            corpus,
            max_attempts: defaults.max_generation_attempts,
            default_policy: defaults.default_webrtc_policy,
        }
    }

    /// Create a generator from engine configuration
    pub fn from_config(corpus: Arc<PlausibilityCorpus>, config: &Config) -> Self {
        Self::new(corpus)
            .with_max_attempts(config.max_generation_attempts)
            .with_default_policy(config.default_webrtc_policy)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_default_policy(mut self, policy: WebRtcPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn corpus(&self) -> &Arc<PlausibilityCorpus> {
        &self.corpus
    }

    /// Draw one candidate without validating it
    fn sample(&self, c: &GenerationConstraints, rng: &mut dyn RngCore) -> Result<Fingerprint> {
        let platform = self.corpus.platform(c.os).ok_or_else(|| {
            GenerationError::NoCorpusData(format!("platform {}", c.os))
        })?;

        let tier = platform
            .tiers
            .choose_weighted(&mut *rng, |t| t.share)
            .map_err(|_| GenerationError::NoCorpusData(format!("device tiers for {}", c.os)))?;

        let release = self
            .corpus
            .releases_for(c.browser)
            .choose_weighted(&mut *rng, |r| r.share)
            .map(|r| r.major)
            .map_err(|_| GenerationError::NoCorpusData(format!("releases for {}", c.browser)))?;

        let (timezone, locale) = self.choose_geo(c, rng)?;
        let at = c.at.unwrap_or_else(Utc::now);
        let offset = geo::offset_at(&timezone, at)
            .ok_or_else(|| GenerationError::NoCorpusData(format!("timezone {}", timezone)))?;

        let user_agent = build_user_agent(c.os, c.browser, release);
        let navigator = NavigatorFingerprint {
            app_version: app_version(&user_agent, c.os, c.browser),
            user_agent,
            platform: c.os.navigator_platform().to_string(),
            vendor: c.browser.navigator_vendor().to_string(),
            language: locale.clone(),
            languages: geo::languages_for_locale(&locale),
            hardware_concurrency: tier.hardware_concurrency,
            device_memory: *tier
                .device_memory
                .choose(&mut *rng)
                .ok_or_else(|| GenerationError::NoCorpusData(format!("memory for tier {}", tier.name)))?,
            max_touch_points: 0,
            product_sub: c.browser.product_sub().to_string(),
            do_not_track: do_not_track(c.browser, rng),
            cookie_enabled: true,
            webdriver: false,
        };

        let mut fingerprint = Fingerprint {
            navigator,
            screen: self.sample_screen(platform, tier, &c.overrides, rng)?,
            webgl: sample_webgl(c.browser, tier, rng)?,
            canvas: CanvasFingerprint { noise: 0 },
            audio: AudioFingerprint {
                noise: 0,
                sample_rate: if rng.gen_bool(0.75) { 48000 } else { 44100 },
            },
            fonts: sample_fonts(platform, rng),
            hardware: sample_battery(tier.form_factor, rng),
            network: self.sample_network(c, tier.form_factor, rng),
            timezone: TimezoneFingerprint {
                timezone,
                timezone_offset: offset,
                locale,
            },
            misc: misc_defaults(),
        };
        seed_noise(&mut fingerprint, rng);
        Ok(fingerprint)
    }

    fn sample_screen(
        &self,
        platform: &PlatformProfile,
        tier: &DeviceTier,
        overrides: &FingerprintOverrides,
        rng: &mut dyn RngCore,
    ) -> Result<ScreenFingerprint> {
        let mode: ScreenMode = match overrides.screen {
            Some(size) => tier
                .screens
                .iter()
                .find(|m| m.width == size.width && m.height == size.height)
                .cloned()
                .unwrap_or(ScreenMode {
                    width: size.width,
                    height: size.height,
                    pixel_ratio: 1.0,
                    share: 1,
                }),
            None => tier
                .screens
                .choose_weighted(&mut *rng, |m| m.share)
                .cloned()
                .map_err(|_| GenerationError::NoCorpusData(format!("screens for tier {}", tier.name)))?,
        };

        Ok(ScreenFingerprint {
            width: mode.width,
            height: mode.height,
            avail_width: mode.width,
            avail_height: mode.height.saturating_sub(platform.reserved_height),
            color_depth: platform.color_depth,
            pixel_depth: platform.color_depth,
            pixel_ratio: overrides.pixel_ratio.unwrap_or(mode.pixel_ratio),
        })
    }

    /// Pick the zone and locale: explicit override, then proxy country, then
    /// the population-weighted default.
    fn choose_geo(&self, c: &GenerationConstraints, rng: &mut dyn RngCore) -> Result<(String, String)> {
        let overrides = &c.overrides;

        if let Some(zone) = &overrides.timezone {
            let country = geo::zone_country(zone)
                .ok_or_else(|| GenerationError::NoCorpusData(format!("timezone {}", zone)))?;
            let locale = match &overrides.locale {
                Some(locale) => locale.clone(),
                None => primary_locale(country)?,
            };
            return Ok((zone.clone(), locale));
        }

        let proxy_country = c
            .proxy_facts
            .as_ref()
            .and_then(ProxyFacts::country_code)
            .filter(|country| {
                let known = COUNTRIES.contains_key(country.as_str());
                if !known {
                    warn!("No geo data for proxy country {}, using default population", country);
                }
                known
            });

        let override_country = overrides
            .locale
            .as_deref()
            .and_then(geo::locale_region)
            .filter(|region| COUNTRIES.contains_key(region.as_str()));

        let country = match override_country.or(proxy_country) {
            Some(country) => country,
            None => default_country(rng)?,
        };
        let country_geo = COUNTRIES
            .get(country.as_str())
            .ok_or_else(|| GenerationError::NoCorpusData(format!("country {}", country)))?;

        let zone = country_geo
            .zones
            .choose_weighted(&mut *rng, |(_, weight)| *weight)
            .map(|(zone, _)| zone.to_string())
            .map_err(|_| GenerationError::NoCorpusData(format!("zones for {}", country)))?;

        let locale = match &overrides.locale {
            Some(locale) => locale.clone(),
            None => {
                let (primary, rest) = country_geo
                    .locales
                    .split_first()
                    .ok_or_else(|| GenerationError::NoCorpusData(format!("locales for {}", country)))?;
                match rest.choose(&mut *rng) {
                    Some(other) if !rng.gen_bool(PRIMARY_LOCALE_SHARE) => other.to_string(),
                    _ => primary.to_string(),
                }
            }
        };

        debug!("Chose {} / {} for country {}", zone, locale, country);
        Ok((zone, locale))
    }

    fn sample_network(
        &self,
        c: &GenerationConstraints,
        form_factor: FormFactor,
        rng: &mut dyn RngCore,
    ) -> NetworkFingerprint {
        let facts = c.proxy_facts.as_ref();
        let policy = c.overrides.web_rtc_policy.unwrap_or(self.default_policy);

        let connection_type = match facts.and_then(|f| f.connection_hint) {
            Some(ConnectionHint::Datacenter) => "ethernet",
            Some(ConnectionHint::Mobile) => "cellular",
            _ if form_factor == FormFactor::Laptop => "wifi",
            _ => "ethernet",
        };

        let rtt = match facts.and_then(|f| f.latency_ms) {
            Some(latency) => ((latency + 25) / 50 * 50).clamp(50, 3000),
            None => *[50, 100, 150].choose(&mut *rng).unwrap_or(&100),
        };
        let downlink = (rng.gen_range(1.5..10.0_f64) * 20.0).round() / 20.0;

        let public_ip = if policy.allows_leakage() {
            facts.and_then(|f| f.egress_ip.clone())
        } else {
            None
        };
        let local_ips = match policy {
            WebRtcPolicy::Default => {
                let mut bytes = [0u8; 16];
                rng.fill_bytes(&mut bytes);
                let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
                Some(vec![format!("{}.local", id)])
            }
            _ => None,
        };

        NetworkFingerprint {
            web_rtc_policy: policy,
            public_ip,
            local_ips,
            connection_type: connection_type.to_string(),
            effective_type: effective_type(rtt).to_string(),
            downlink,
            rtt,
        }
    }
}

impl FingerprintGenerator for FingerprintGeneratorImpl {
    fn generate(&self, constraints: &GenerationConstraints, rng: &mut dyn RngCore) -> Result<Fingerprint> {
        let proxy = constraints.proxy_facts.as_ref();
        let mut last_violations = Vec::new();

        for attempt in 1..=self.max_attempts {
            let candidate = self.sample(constraints, rng)?;
            let result = self.validator.validate(&candidate, proxy);

            if result.is_ok() {
                for warning in result.soft_violations() {
                    debug!("Generated fingerprint warning: {}", warning);
                }
                debug!(
                    "Generated {}/{} fingerprint on attempt {}",
                    constraints.os, constraints.browser, attempt
                );
                return Ok(candidate);
            }

            last_violations = result.hard_violations().cloned().collect();
            warn!(
                "Attempt {} produced {} hard violation(s), resampling",
                attempt,
                last_violations.len()
            );
        }

        Err(GenerationError::Exhausted {
            attempts: self.max_attempts,
            last_violations,
        }
        .into())
    }
}

/// Fill the three noise seeds with distinct fresh values
fn seed_noise(fingerprint: &mut Fingerprint, rng: &mut dyn RngCore) {
    let canvas = rng.next_u32();
    let mut webgl = rng.next_u32();
    while webgl == canvas {
        webgl = rng.next_u32();
    }
    let mut audio = rng.next_u32();
    while audio == canvas || audio == webgl {
        audio = rng.next_u32();
    }
    fingerprint.canvas.noise = canvas;
    fingerprint.webgl.noise = webgl;
    fingerprint.audio.noise = audio;
}

fn default_country(rng: &mut dyn RngCore) -> Result<String> {
    let countries: Vec<(&str, u32)> = COUNTRIES
        .entries()
        .map(|(code, geo)| (*code, geo.weight))
        .collect();
    countries
        .choose_weighted(&mut *rng, |(_, weight)| *weight)
        .map(|(code, _)| code.to_string())
        .map_err(|_| GenerationError::NoCorpusData("default population".to_string()).into())
}

fn primary_locale(country: &str) -> Result<String> {
    COUNTRIES
        .get(country)
        .and_then(|geo| geo.locales.first())
        .map(|locale| locale.to_string())
        .ok_or_else(|| GenerationError::NoCorpusData(format!("locales for {}", country)).into())
}

fn sample_webgl(browser: TargetBrowser, tier: &DeviceTier, rng: &mut dyn RngCore) -> Result<WebGlFingerprint> {
    let gpu = tier
        .gpus
        .choose(&mut *rng)
        .ok_or_else(|| GenerationError::NoCorpusData(format!("gpus for tier {}", tier.name)))?;
    let (vendor, renderer) = if browser.is_chromium() {
        (CHROMIUM_MASKED_VENDOR, CHROMIUM_MASKED_RENDERER)
    } else {
        (FIREFOX_MASKED, FIREFOX_MASKED)
    };
    let (unmasked_vendor, unmasked_renderer) = gpu.strings(browser);
    Ok(WebGlFingerprint {
        vendor: vendor.to_string(),
        renderer: renderer.to_string(),
        unmasked_vendor: unmasked_vendor.to_string(),
        unmasked_renderer: unmasked_renderer.to_string(),
        noise: 0,
    })
}

fn sample_fonts(platform: &PlatformProfile, rng: &mut dyn RngCore) -> FontsFingerprint {
    let mut installed_fonts = platform.fonts.core.clone();
    for font in &platform.fonts.optional {
        if rng.gen_bool(OPTIONAL_FONT_SHARE) {
            installed_fonts.push(font.clone());
        }
    }
    FontsFingerprint { installed_fonts }
}

fn sample_battery(form_factor: FormFactor, rng: &mut dyn RngCore) -> HardwareFingerprint {
    match form_factor {
        FormFactor::Desktop => HardwareFingerprint::default(),
        FormFactor::Laptop => HardwareFingerprint {
            battery_charging: Some(rng.gen_bool(0.6)),
            battery_level: Some(f64::from(rng.gen_range(20u32..=100)) / 100.0),
        },
    }
}

fn do_not_track(browser: TargetBrowser, rng: &mut dyn RngCore) -> Option<String> {
    if !browser.is_chromium() {
        return Some("unspecified".to_string());
    }
    rng.gen_bool(0.15).then(|| "1".to_string())
}

/// NetworkInformation buckets by round-trip time
fn effective_type(rtt: u32) -> &'static str {
    match rtt {
        r if r >= 2000 => "slow-2g",
        r if r >= 1400 => "2g",
        r if r >= 270 => "3g",
        _ => "4g",
    }
}

fn misc_defaults() -> MiscFingerprint {
    let plugins = PDF_PLUGINS
        .iter()
        .map(|name| Plugin {
            name: name.to_string(),
            filename: "internal-pdf-viewer".to_string(),
            description: "Portable Document Format".to_string(),
        })
        .collect();
    let mime_types = ["application/pdf", "text/pdf"]
        .iter()
        .map(|mime| MimeType {
            mime_type: mime.to_string(),
            suffixes: "pdf".to_string(),
            description: "Portable Document Format".to_string(),
        })
        .collect();
    let permissions: BTreeMap<String, PermissionState> = PROMPT_PERMISSIONS
        .iter()
        .map(|name| (name.to_string(), PermissionState::Prompt))
        .collect();

    MiscFingerprint {
        plugins,
        mime_types,
        permissions,
    }
}

/// Zone names known to the geo tables, for diagnostics
pub fn known_timezones() -> Vec<&'static str> {
    let mut zones: Vec<&'static str> = ZONES.keys().copied().collect();
    zones.sort_unstable();
    zones
}
