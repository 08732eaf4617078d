//! Consistency validator
//!
//! Checks every cross-field invariant of a fingerprint independently and
//! collects all violations. Hard violations make a fingerprint unusable;
//! soft ones are warnings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::corpus::{
    PlausibilityCorpus, CHROMIUM_MASKED_RENDERER, CHROMIUM_MASKED_VENDOR, DEVICE_MEMORY_VALUES,
    FIREFOX_MASKED, PIXEL_RATIOS, SAMPLE_RATES,
};
use super::geo;
use super::proxy::ProxyFacts;
use super::user_agent::{app_version, parse_user_agent, platform_os, UserAgentClaims};
use crate::fingerprint::{Fingerprint, TargetOs};

const COLOR_DEPTHS: [u32; 3] = [24, 30, 32];
const EFFECTIVE_TYPES: [&str; 4] = ["slow-2g", "2g", "3g", "4g"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Invariant {
    UserAgentParse,
    UserAgentPlatform,
    UserAgentVendor,
    UserAgentAppVersion,
    UserAgentProductSub,
    UnknownBrowserVersion,
    Webdriver,
    LocaleLanguage,
    DeviceTier,
    ScreenBounds,
    PixelRatio,
    ColorDepth,
    UnknownScreen,
    TouchPoints,
    GpuPlatform,
    GpuPair,
    GpuMasked,
    UnknownGpu,
    TimezoneOffset,
    TimezoneLocale,
    UnknownTimezone,
    ProxyGeo,
    ProxyCountryUnknown,
    ProxyEgressIp,
    FontsPlatform,
    UnknownFont,
    Battery,
    WebRtcLeak,
    NetworkProfile,
    SampleRate,
    NoiseCorrelation,
}

impl Invariant {
    pub fn name(self) -> &'static str {
        match self {
            Invariant::UserAgentParse => "user-agent-parse",
            Invariant::UserAgentPlatform => "user-agent-platform",
            Invariant::UserAgentVendor => "user-agent-vendor",
            Invariant::UserAgentAppVersion => "user-agent-app-version",
            Invariant::UserAgentProductSub => "user-agent-product-sub",
            Invariant::UnknownBrowserVersion => "unknown-browser-version",
            Invariant::Webdriver => "webdriver",
            Invariant::LocaleLanguage => "locale-language",
            Invariant::DeviceTier => "device-tier",
            Invariant::ScreenBounds => "screen-bounds",
            Invariant::PixelRatio => "pixel-ratio",
            Invariant::ColorDepth => "color-depth",
            Invariant::UnknownScreen => "unknown-screen",
            Invariant::TouchPoints => "touch-points",
            Invariant::GpuPlatform => "gpu-platform",
            Invariant::GpuPair => "gpu-pair",
            Invariant::GpuMasked => "gpu-masked",
            Invariant::UnknownGpu => "unknown-gpu",
            Invariant::TimezoneOffset => "timezone-offset",
            Invariant::TimezoneLocale => "timezone-locale",
            Invariant::UnknownTimezone => "unknown-timezone",
            Invariant::ProxyGeo => "proxy-geo",
            Invariant::ProxyCountryUnknown => "proxy-country-unknown",
            Invariant::ProxyEgressIp => "proxy-egress-ip",
            Invariant::FontsPlatform => "fonts-platform",
            Invariant::UnknownFont => "unknown-font",
            Invariant::Battery => "battery",
            Invariant::WebRtcLeak => "webrtc-leak",
            Invariant::NetworkProfile => "network-profile",
            Invariant::SampleRate => "sample-rate",
            Invariant::NoiseCorrelation => "noise-correlation",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Always rejected
    Hard,
    /// Reported as a warning
    Soft,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Hard => "hard",
            Severity::Soft => "soft",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: Invariant,
    pub severity: Severity,
    /// Dotted path of the offending field
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn hard<F: Into<String>, M: Into<String>>(invariant: Invariant, field: F, message: M) -> Self {
        Self {
            invariant,
            severity: Severity::Hard,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn soft<F: Into<String>, M: Into<String>>(invariant: Invariant, field: F, message: M) -> Self {
        Self {
            invariant,
            severity: Severity::Soft,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.severity, self.invariant, self.field, self.message)
    }
}

/// Outcome of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when no hard violation was found
    pub ok: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            ok: !violations.iter().any(Violation::is_hard),
            violations,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_hard())
    }

    pub fn soft_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_hard())
    }

    pub fn has(&self, invariant: Invariant) -> bool {
        self.violations.iter().any(|v| v.invariant == invariant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpuBrand {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpuApi {
    Direct3D,
    Metal,
    OpenGl,
    Unknown,
}

fn gpu_brand(text: &str) -> GpuBrand {
    let lower = text.to_ascii_lowercase();
    if lower.contains("nvidia") || lower.contains("geforce") || lower.contains("quadro") {
        GpuBrand::Nvidia
    } else if lower.contains("amd") || lower.contains("radeon") || lower.contains("ati technologies") {
        GpuBrand::Amd
    } else if lower.contains("apple") {
        GpuBrand::Apple
    } else if lower.contains("intel") {
        GpuBrand::Intel
    } else {
        GpuBrand::Other
    }
}

fn gpu_api(renderer: &str) -> GpuApi {
    let lower = renderer.to_ascii_lowercase();
    if lower.contains("direct3d") || lower.contains("d3d") {
        GpuApi::Direct3D
    } else if lower.contains("metal") {
        GpuApi::Metal
    } else if lower.contains("opengl") {
        GpuApi::OpenGl
    } else {
        GpuApi::Unknown
    }
}

/// Why `renderer` cannot belong to a machine running `os`
fn gpu_platform_conflict(os: TargetOs, renderer: &str) -> Option<&'static str> {
    let brand = gpu_brand(renderer);
    let api = gpu_api(renderer);
    match os {
        TargetOs::Windows if brand == GpuBrand::Apple => Some("Apple GPU on Windows"),
        TargetOs::Windows if matches!(api, GpuApi::Metal | GpuApi::OpenGl) => {
            Some("Chromium on Windows renders through Direct3D")
        }
        TargetOs::Macos if brand == GpuBrand::Nvidia => Some("current Macs ship no NVIDIA GPU"),
        TargetOs::Macos if api == GpuApi::Direct3D => Some("Direct3D renderer on macOS"),
        TargetOs::Linux if brand == GpuBrand::Apple => Some("Apple GPU on Linux"),
        TargetOs::Linux if matches!(api, GpuApi::Direct3D | GpuApi::Metal) => {
            Some("Linux renders through OpenGL")
        }
        _ => None,
    }
}

/// Validator bound to a corpus
#[derive(Debug, Clone)]
pub struct ConsistencyValidator {
    corpus: Arc<PlausibilityCorpus>,
}

impl ConsistencyValidator {
    pub fn new(corpus: Arc<PlausibilityCorpus>) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Arc<PlausibilityCorpus> {
        &self.corpus
    }

    /// Check `fingerprint` against every invariant. Never mutates its input.
    pub fn validate(&self, fingerprint: &Fingerprint, proxy: Option<&ProxyFacts>) -> ValidationResult {
        let mut out = Vec::new();

        let claims = self.check_user_agent(fingerprint, &mut out);
        let declared = platform_os(&fingerprint.navigator.platform);
        let primary_os = claims.map(|c| c.os).or(declared);

        check_webdriver(fingerprint, &mut out);
        check_languages(fingerprint, &mut out);
        if let Some(os) = primary_os {
            self.check_device_tier(fingerprint, os, &mut out);
            self.check_fonts(fingerprint, os, &mut out);
        }
        self.check_screen(fingerprint, primary_os, &mut out);

        let mut claimed: BTreeSet<TargetOs> = BTreeSet::new();
        claimed.extend(claims.map(|c| c.os));
        claimed.extend(declared);
        self.check_gpu(fingerprint, claims, &claimed, &mut out);

        check_timezone(fingerprint, &mut out);
        if let Some(facts) = proxy {
            check_proxy(fingerprint, facts, &mut out);
        }
        check_hardware(fingerprint, &mut out);
        check_network(fingerprint, &mut out);
        check_audio_and_noise(fingerprint, &mut out);

        ValidationResult::from_violations(out)
    }

    fn check_user_agent(&self, fp: &Fingerprint, out: &mut Vec<Violation>) -> Option<UserAgentClaims> {
        let nav = &fp.navigator;
        let Some(claims) = parse_user_agent(&nav.user_agent) else {
            out.push(Violation::hard(
                Invariant::UserAgentParse,
                "navigator.userAgent",
                "does not name a supported OS and browser",
            ));
            return None;
        };

        let expected_platform = claims.os.navigator_platform();
        if nav.platform != expected_platform {
            out.push(Violation::hard(
                Invariant::UserAgentPlatform,
                "navigator.platform",
                format!("{} user agent requires \"{}\", found \"{}\"", claims.os, expected_platform, nav.platform),
            ));
        }

        let expected_vendor = claims.browser.navigator_vendor();
        if nav.vendor != expected_vendor {
            out.push(Violation::hard(
                Invariant::UserAgentVendor,
                "navigator.vendor",
                format!("{} reports \"{}\", found \"{}\"", claims.browser, expected_vendor, nav.vendor),
            ));
        }

        let expected_app_version = app_version(&nav.user_agent, claims.os, claims.browser);
        if nav.app_version != expected_app_version {
            out.push(Violation::hard(
                Invariant::UserAgentAppVersion,
                "navigator.appVersion",
                format!("expected \"{}\"", expected_app_version),
            ));
        }

        if nav.product_sub != claims.browser.product_sub() {
            out.push(Violation::hard(
                Invariant::UserAgentProductSub,
                "navigator.productSub",
                format!("{} reports {}", claims.browser, claims.browser.product_sub()),
            ));
        }

        if !self.corpus.knows_release(claims.browser, claims.major) {
            out.push(Violation::soft(
                Invariant::UnknownBrowserVersion,
                "navigator.userAgent",
                format!("{} {} is not in corpus {}", claims.browser, claims.major, self.corpus.version),
            ));
        }

        Some(claims)
    }

    fn check_device_tier(&self, fp: &Fingerprint, os: TargetOs, out: &mut Vec<Violation>) {
        let cores = fp.navigator.hardware_concurrency;
        let memory = fp.navigator.device_memory;

        if !DEVICE_MEMORY_VALUES.contains(&memory) {
            out.push(Violation::hard(
                Invariant::DeviceTier,
                "navigator.deviceMemory",
                format!("{} is not a reported deviceMemory value", memory),
            ));
            return;
        }
        if self.corpus.tiers_matching(os, cores, memory).is_empty() {
            out.push(Violation::hard(
                Invariant::DeviceTier,
                "navigator.hardwareConcurrency",
                format!("{} cores with {}GB matches no {} device tier", cores, memory, os),
            ));
        }
    }

    fn check_screen(&self, fp: &Fingerprint, os: Option<TargetOs>, out: &mut Vec<Violation>) {
        let screen = &fp.screen;

        if screen.width == 0 || screen.height == 0 {
            out.push(Violation::hard(Invariant::ScreenBounds, "screen.width", "screen must be non-empty"));
        }
        if screen.avail_width > screen.width {
            out.push(Violation::hard(
                Invariant::ScreenBounds,
                "screen.availWidth",
                format!("{} exceeds width {}", screen.avail_width, screen.width),
            ));
        }
        if screen.avail_height > screen.height {
            out.push(Violation::hard(
                Invariant::ScreenBounds,
                "screen.availHeight",
                format!("{} exceeds height {}", screen.avail_height, screen.height),
            ));
        }
        if !PIXEL_RATIOS.contains(&screen.pixel_ratio) {
            out.push(Violation::hard(
                Invariant::PixelRatio,
                "screen.pixelRatio",
                format!("{} is not a display scale factor", screen.pixel_ratio),
            ));
        }
        if !COLOR_DEPTHS.contains(&screen.color_depth) || screen.pixel_depth != screen.color_depth {
            out.push(Violation::hard(
                Invariant::ColorDepth,
                "screen.colorDepth",
                format!("colorDepth {} / pixelDepth {}", screen.color_depth, screen.pixel_depth),
            ));
        }
        if let Some(os) = os {
            if !self.corpus.knows_screen(os, screen.width, screen.height) {
                out.push(Violation::soft(
                    Invariant::UnknownScreen,
                    "screen.width",
                    format!("{}x{} is uncommon on {}", screen.width, screen.height, os),
                ));
            }
        }
        if fp.navigator.max_touch_points > 10 {
            out.push(Violation::soft(
                Invariant::TouchPoints,
                "navigator.maxTouchPoints",
                format!("{} touch points", fp.navigator.max_touch_points),
            ));
        }
    }

    fn check_gpu(
        &self,
        fp: &Fingerprint,
        claims: Option<UserAgentClaims>,
        claimed: &BTreeSet<TargetOs>,
        out: &mut Vec<Violation>,
    ) {
        let webgl = &fp.webgl;

        for os in claimed {
            if let Some(reason) = gpu_platform_conflict(*os, &webgl.unmasked_renderer) {
                out.push(Violation::hard(
                    Invariant::GpuPlatform,
                    "webgl.unmaskedRenderer",
                    format!("{}: {}", reason, webgl.unmasked_renderer),
                ));
            }
        }

        let vendor_brand = gpu_brand(&webgl.unmasked_vendor);
        let renderer_brand = gpu_brand(&webgl.unmasked_renderer);
        if vendor_brand != GpuBrand::Other
            && renderer_brand != GpuBrand::Other
            && vendor_brand != renderer_brand
        {
            out.push(Violation::hard(
                Invariant::GpuPair,
                "webgl.unmaskedVendor",
                format!("\"{}\" does not make \"{}\"", webgl.unmasked_vendor, webgl.unmasked_renderer),
            ));
        }

        if let Some(claims) = claims {
            let (vendor, renderer) = if claims.browser.is_chromium() {
                (CHROMIUM_MASKED_VENDOR, CHROMIUM_MASKED_RENDERER)
            } else {
                (FIREFOX_MASKED, FIREFOX_MASKED)
            };
            if webgl.vendor != vendor || webgl.renderer != renderer {
                out.push(Violation::hard(
                    Invariant::GpuMasked,
                    "webgl.vendor",
                    format!("{} reports \"{}\" / \"{}\"", claims.browser, vendor, renderer),
                ));
            }
            if !self.corpus.knows_gpu(claims.os, &webgl.unmasked_vendor, &webgl.unmasked_renderer) {
                out.push(Violation::soft(
                    Invariant::UnknownGpu,
                    "webgl.unmaskedRenderer",
                    format!("pair not in corpus {}", self.corpus.version),
                ));
            }
        }
    }

    fn check_fonts(&self, fp: &Fingerprint, os: TargetOs, out: &mut Vec<Violation>) {
        let fonts = &fp.fonts.installed_fonts;
        if fonts.is_empty() {
            out.push(Violation::soft(Invariant::UnknownFont, "fonts.installedFonts", "no fonts listed"));
            return;
        }

        let mut foreign = Vec::new();
        let mut unknown = Vec::new();
        for font in fonts {
            let platforms = self.corpus.font_platforms(font);
            if platforms.contains(&os) {
                continue;
            }
            if platforms.is_empty() {
                unknown.push(font.as_str());
            } else {
                foreign.push(font.as_str());
            }
        }

        if !foreign.is_empty() {
            out.push(Violation::hard(
                Invariant::FontsPlatform,
                "fonts.installedFonts",
                format!("not shipped on {}: {}", os, foreign.join(", ")),
            ));
        }
        if !unknown.is_empty() {
            out.push(Violation::soft(
                Invariant::UnknownFont,
                "fonts.installedFonts",
                format!("unrecognised: {}", unknown.join(", ")),
            ));
        }
    }
}

fn check_webdriver(fp: &Fingerprint, out: &mut Vec<Violation>) {
    if fp.navigator.webdriver {
        out.push(Violation::hard(Invariant::Webdriver, "navigator.webdriver", "must be false"));
    }
}

fn check_languages(fp: &Fingerprint, out: &mut Vec<Violation>) {
    let nav = &fp.navigator;
    if nav.languages.first() != Some(&nav.language) {
        out.push(Violation::hard(
            Invariant::LocaleLanguage,
            "navigator.languages",
            format!("must start with navigator.language \"{}\"", nav.language),
        ));
    }
    if nav.language != fp.timezone.locale {
        out.push(Violation::hard(
            Invariant::LocaleLanguage,
            "navigator.language",
            format!("\"{}\" differs from locale \"{}\"", nav.language, fp.timezone.locale),
        ));
    }
}

fn check_timezone(fp: &Fingerprint, out: &mut Vec<Violation>) {
    let tz = &fp.timezone;
    let Some(offsets) = geo::allowed_offsets(&tz.timezone) else {
        out.push(Violation::soft(
            Invariant::UnknownTimezone,
            "timezone.timezone",
            format!("{} cannot be cross-checked", tz.timezone),
        ));
        return;
    };

    if !offsets.contains(&tz.timezone_offset) {
        out.push(Violation::hard(
            Invariant::TimezoneOffset,
            "timezone.timezoneOffset",
            format!("{} reports one of {:?}, found {}", tz.timezone, offsets, tz.timezone_offset),
        ));
    }
    if geo::locale_fits_zone(&tz.locale, &tz.timezone) == Some(false) {
        out.push(Violation::hard(
            Invariant::TimezoneLocale,
            "timezone.locale",
            format!("{} is not used in {}", tz.locale, tz.timezone),
        ));
    }
}

fn check_proxy(fp: &Fingerprint, facts: &ProxyFacts, out: &mut Vec<Violation>) {
    match facts.country_code().as_deref() {
        None => out.push(Violation::soft(
            Invariant::ProxyCountryUnknown,
            "timezone.timezone",
            "proxy country unknown, geo match not verified",
        )),
        Some(country) => {
            let zone_country = geo::zone_country(&fp.timezone.timezone);
            if zone_country != Some(country) {
                out.push(Violation::soft(
                    Invariant::ProxyGeo,
                    "timezone.timezone",
                    format!("{} is outside proxy country {}", fp.timezone.timezone, country),
                ));
            }
        }
    }

    if let (Some(public), Some(egress)) = (&fp.network.public_ip, &facts.egress_ip) {
        if public != egress {
            out.push(Violation::soft(
                Invariant::ProxyEgressIp,
                "network.publicIP",
                format!("{} differs from proxy egress {}", public, egress),
            ));
        }
    }
}

fn check_hardware(fp: &Fingerprint, out: &mut Vec<Violation>) {
    let hw = &fp.hardware;
    if hw.battery_charging.is_some() != hw.battery_level.is_some() {
        out.push(Violation::hard(
            Invariant::Battery,
            "hardware.batteryLevel",
            "batteryCharging and batteryLevel must be present together",
        ));
    }
    if let Some(level) = hw.battery_level {
        if !(0.0..=1.0).contains(&level) {
            out.push(Violation::hard(
                Invariant::Battery,
                "hardware.batteryLevel",
                format!("{} is outside 0..1", level),
            ));
        }
    }
}

fn check_network(fp: &Fingerprint, out: &mut Vec<Violation>) {
    let net = &fp.network;
    if !net.web_rtc_policy.allows_leakage() {
        if net.public_ip.is_some() {
            out.push(Violation::hard(
                Invariant::WebRtcLeak,
                "network.publicIP",
                "set while WebRTC is disabled",
            ));
        }
        if net.local_ips.is_some() {
            out.push(Violation::hard(
                Invariant::WebRtcLeak,
                "network.localIPs",
                "set while WebRTC is disabled",
            ));
        }
    }
    if !EFFECTIVE_TYPES.contains(&net.effective_type.as_str()) {
        out.push(Violation::hard(
            Invariant::NetworkProfile,
            "network.effectiveType",
            format!("\"{}\" is not a NetworkInformation type", net.effective_type),
        ));
    }
    if !(net.downlink >= 0.0) {
        out.push(Violation::hard(
            Invariant::NetworkProfile,
            "network.downlink",
            format!("{} is negative", net.downlink),
        ));
    }
}

fn check_audio_and_noise(fp: &Fingerprint, out: &mut Vec<Violation>) {
    if !SAMPLE_RATES.contains(&fp.audio.sample_rate) {
        out.push(Violation::hard(
            Invariant::SampleRate,
            "audio.sampleRate",
            format!("{} Hz", fp.audio.sample_rate),
        ));
    }
    if fp.canvas.noise == fp.webgl.noise || fp.canvas.noise == fp.audio.noise || fp.webgl.noise == fp.audio.noise {
        out.push(Violation::soft(
            Invariant::NoiseCorrelation,
            "canvas.noise",
            "noise seeds should be independent",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::tests::sample_fingerprint;
    use crate::fingerprint::WebRtcPolicy;

    fn validator() -> ConsistencyValidator {
        ConsistencyValidator::new(Arc::new(PlausibilityCorpus::builtin()))
    }

    #[test]
    fn test_sample_is_clean() {
        let result = validator().validate(&sample_fingerprint(), None);
        assert!(result.is_ok(), "{:?}", result.violations);
        assert!(result.violations.is_empty(), "{:?}", result.violations);
    }

    #[test]
    fn test_webdriver_is_single_hard_violation() {
        let mut fp = sample_fingerprint();
        fp.navigator.webdriver = true;

        let result = validator().validate(&fp, None);
        let hard: Vec<_> = result.hard_violations().collect();
        assert!(!result.is_ok());
        assert_eq!(hard.len(), 1);
        assert_eq!(hard[0].invariant, Invariant::Webdriver);
        assert_eq!(hard[0].invariant.to_string(), "webdriver");
    }

    #[test]
    fn test_mac_platform_with_nvidia_fails() {
        let mut fp = sample_fingerprint();
        fp.navigator.platform = "MacIntel".to_string();

        let result = validator().validate(&fp, None);
        assert!(!result.is_ok());
        assert!(result.has(Invariant::GpuPlatform));
        assert!(result.has(Invariant::UserAgentPlatform));
    }

    #[test]
    fn test_apple_gpu_on_windows_fails() {
        let mut fp = sample_fingerprint();
        fp.webgl.unmasked_vendor = "Google Inc. (Apple)".to_string();
        fp.webgl.unmasked_renderer =
            "ANGLE (Apple, ANGLE Metal Renderer: Apple M1, Unspecified Version)".to_string();

        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::GpuPlatform));
        assert!(result.soft_violations().any(|v| v.invariant == Invariant::UnknownGpu));
    }

    #[test]
    fn test_independently_randomized_pair_fails() {
        let mut fp = sample_fingerprint();
        fp.webgl.unmasked_vendor = "Google Inc. (AMD)".to_string();
        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::GpuPair));
    }

    #[test]
    fn test_impossible_tier() {
        let mut fp = sample_fingerprint();
        fp.navigator.hardware_concurrency = 2;
        fp.navigator.device_memory = 32;
        let result = validator().validate(&fp, None);
        assert!(result.hard_violations().any(|v| v.invariant == Invariant::DeviceTier));
    }

    #[test]
    fn test_screen_checks_collected_together() {
        let mut fp = sample_fingerprint();
        fp.screen.avail_width = 2000;
        fp.screen.avail_height = 1200;
        fp.screen.pixel_ratio = 1.75;

        let result = validator().validate(&fp, None);
        let screen: Vec<_> = result
            .hard_violations()
            .filter(|v| matches!(v.invariant, Invariant::ScreenBounds | Invariant::PixelRatio))
            .collect();
        assert_eq!(screen.len(), 3);
    }

    #[test]
    fn test_timezone_offset_and_locale() {
        let mut fp = sample_fingerprint();
        fp.timezone.timezone_offset = -540;
        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::TimezoneOffset));

        // Daylight time is an accepted offset
        let mut fp = sample_fingerprint();
        fp.timezone.timezone_offset = 240;
        assert!(validator().validate(&fp, None).is_ok());

        let mut fp = sample_fingerprint();
        fp.timezone.timezone = "Asia/Tokyo".to_string();
        fp.timezone.timezone_offset = -540;
        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::TimezoneLocale));
    }

    #[test]
    fn test_proxy_mismatch_is_soft() {
        let fp = sample_fingerprint();
        let result = validator().validate(&fp, Some(&ProxyFacts::for_country("DE")));
        assert!(result.is_ok());
        assert!(result.soft_violations().any(|v| v.invariant == Invariant::ProxyGeo));

        let result = validator().validate(&fp, Some(&ProxyFacts::default()));
        assert!(result.is_ok());
        assert!(result.has(Invariant::ProxyCountryUnknown));

        let result = validator().validate(&fp, Some(&ProxyFacts::for_country("us")));
        assert!(result.violations.is_empty());

        // Facts built without the constructor
        let raw = ProxyFacts {
            country: Some("us".to_string()),
            ..ProxyFacts::default()
        };
        assert!(validator().validate(&fp, Some(&raw)).violations.is_empty());
    }

    #[test]
    fn test_mac_fonts_on_windows() {
        let mut fp = sample_fingerprint();
        fp.fonts.installed_fonts.push("Helvetica Neue".to_string());
        fp.fonts.installed_fonts.push("Menlo".to_string());
        fp.fonts.installed_fonts.push("Comic Papyrus Pro".to_string());

        let result = validator().validate(&fp, None);
        let fonts = result
            .hard_violations()
            .find(|v| v.invariant == Invariant::FontsPlatform)
            .unwrap();
        assert!(fonts.message.contains("Helvetica Neue"));
        assert!(fonts.message.contains("Menlo"));
        assert!(result.has(Invariant::UnknownFont));
    }

    #[test]
    fn test_webrtc_leak_fields() {
        let mut fp = sample_fingerprint();
        fp.network.public_ip = Some("198.51.100.4".to_string());
        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::WebRtcLeak));

        fp.network.web_rtc_policy = WebRtcPolicy::ProxyOnly;
        assert!(validator().validate(&fp, None).is_ok());
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let mut fp = sample_fingerprint();
        fp.navigator.webdriver = true;
        let before = fp.clone();
        let _ = validator().validate(&fp, Some(&ProxyFacts::for_country("JP")));
        assert_eq!(fp, before);
    }

    #[test]
    fn test_firefox_claims() {
        let mut fp = sample_fingerprint();
        fp.navigator.user_agent =
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0".to_string();
        let result = validator().validate(&fp, None);
        assert!(result.has(Invariant::UserAgentVendor));
        assert!(result.has(Invariant::UserAgentAppVersion));
        assert!(result.has(Invariant::UserAgentProductSub));
        assert!(result.has(Invariant::GpuMasked));
    }
}
