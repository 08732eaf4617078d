//! Fingerprint data model
//!
//! Plain serde records. The JSON produced here is the persisted form stored
//! next to a profile, so field names follow the browser's own spelling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Operating system a fingerprint claims to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetOs {
    Windows,
    Macos,
    Linux,
}

impl TargetOs {
    pub const ALL: [TargetOs; 3] = [TargetOs::Windows, TargetOs::Macos, TargetOs::Linux];

    /// Value of `navigator.platform`
    pub fn navigator_platform(self) -> &'static str {
        match self {
            TargetOs::Windows => "Win32",
            TargetOs::Macos => "MacIntel",
            TargetOs::Linux => "Linux x86_64",
        }
    }

    /// Platform token used by `Sec-CH-UA-Platform` style overrides
    pub fn client_hint_platform(self) -> &'static str {
        match self {
            TargetOs::Windows => "Windows",
            TargetOs::Macos => "macOS",
            TargetOs::Linux => "Linux",
        }
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetOs::Windows => "windows",
            TargetOs::Macos => "macos",
            TargetOs::Linux => "linux",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TargetOs {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" | "win" => Ok(TargetOs::Windows),
            "macos" | "mac" | "osx" => Ok(TargetOs::Macos),
            "linux" => Ok(TargetOs::Linux),
            other => Err(crate::Error::configuration(format!("unknown os: {}", other))),
        }
    }
}

/// Browser family a fingerprint claims to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetBrowser {
    Chrome,
    Edge,
    Firefox,
}

impl TargetBrowser {
    pub const ALL: [TargetBrowser; 3] =
        [TargetBrowser::Chrome, TargetBrowser::Edge, TargetBrowser::Firefox];

    /// Chromium-based browsers share vendor, productSub and deviceMemory
    pub fn is_chromium(self) -> bool {
        matches!(self, TargetBrowser::Chrome | TargetBrowser::Edge)
    }

    /// Value of `navigator.vendor`
    pub fn navigator_vendor(self) -> &'static str {
        if self.is_chromium() {
            "Google Inc."
        } else {
            ""
        }
    }

    /// Value of `navigator.productSub`
    pub fn product_sub(self) -> &'static str {
        if self.is_chromium() {
            "20030107"
        } else {
            "20100101"
        }
    }
}

impl fmt::Display for TargetBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetBrowser::Chrome => "chrome",
            TargetBrowser::Edge => "edge",
            TargetBrowser::Firefox => "firefox",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TargetBrowser {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" => Ok(TargetBrowser::Chrome),
            "edge" => Ok(TargetBrowser::Edge),
            "firefox" => Ok(TargetBrowser::Firefox),
            other => Err(crate::Error::configuration(format!("unknown browser: {}", other))),
        }
    }
}

/// How much WebRTC is allowed to reveal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WebRtcPolicy {
    /// Peer connections are unavailable
    #[default]
    Disable,
    /// Only relayed candidates, so the proxy address is the only one visible
    ProxyOnly,
    /// Native behaviour
    Default,
}

impl WebRtcPolicy {
    /// Whether addresses may leak through ICE candidates
    pub fn allows_leakage(self) -> bool {
        !matches!(self, WebRtcPolicy::Disable)
    }
}

/// Full set of signals a session reports to page scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub navigator: NavigatorFingerprint,
    pub screen: ScreenFingerprint,
    pub webgl: WebGlFingerprint,
    pub canvas: CanvasFingerprint,
    pub audio: AudioFingerprint,
    pub fonts: FontsFingerprint,
    pub hardware: HardwareFingerprint,
    pub network: NetworkFingerprint,
    pub timezone: TimezoneFingerprint,
    pub misc: MiscFingerprint,
}

impl Fingerprint {
    /// Parse the persisted JSON form
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the persisted JSON form
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorFingerprint {
    pub user_agent: String,
    pub app_version: String,
    pub platform: String,
    pub vendor: String,
    pub language: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub device_memory: u32,
    pub max_touch_points: u32,
    pub product_sub: String,
    /// `None` serializes as `null`, which is what Chromium reports by default
    pub do_not_track: Option<String>,
    pub cookie_enabled: bool,
    pub webdriver: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenFingerprint {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u32,
    pub pixel_depth: u32,
    pub pixel_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebGlFingerprint {
    pub vendor: String,
    pub renderer: String,
    pub unmasked_vendor: String,
    pub unmasked_renderer: String,
    pub noise: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasFingerprint {
    pub noise: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFingerprint {
    pub noise: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontsFingerprint {
    pub installed_fonts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareFingerprint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_charging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
}

impl HardwareFingerprint {
    /// Desktop-class profiles carry no battery
    pub fn has_battery(&self) -> bool {
        self.battery_charging.is_some() || self.battery_level.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFingerprint {
    #[serde(rename = "webRTCPolicy")]
    pub web_rtc_policy: WebRtcPolicy,
    #[serde(rename = "publicIP", default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    #[serde(rename = "localIPs", default, skip_serializing_if = "Option::is_none")]
    pub local_ips: Option<Vec<String>>,
    pub connection_type: String,
    pub effective_type: String,
    pub downlink: f64,
    pub rtt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneFingerprint {
    pub timezone: String,
    /// Minutes, positive west of UTC, as `Date.prototype.getTimezoneOffset` reports
    pub timezone_offset: i32,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiscFingerprint {
    pub plugins: Vec<Plugin>,
    pub mime_types: Vec<MimeType>,
    pub permissions: BTreeMap<String, PermissionState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    pub filename: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeType {
    #[serde(rename = "type")]
    pub mime_type: String,
    pub suffixes: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

impl PermissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::tests::sample_fingerprint;

    #[test]
    fn test_json_uses_browser_field_names() {
        let fp = sample_fingerprint();
        let value = serde_json::to_value(&fp).unwrap();

        assert!(value["navigator"]["userAgent"].is_string());
        assert!(value["navigator"]["doNotTrack"].is_null());
        assert!(value["screen"]["availWidth"].is_number());
        assert!(value["webgl"]["unmaskedRenderer"].is_string());
        assert!(value["fonts"]["installedFonts"].is_array());
        assert_eq!(value["network"]["webRTCPolicy"], "disable");
        assert!(value["network"].get("publicIP").is_none());
        assert!(value["timezone"]["timezoneOffset"].is_number());
        assert_eq!(value["misc"]["mimeTypes"][0]["type"], "application/pdf");
        assert!(value["hardware"].get("batteryLevel").is_none());
    }

    #[test]
    fn test_persisted_form_parses_back() {
        let fp = sample_fingerprint();
        let json = fp.to_json_pretty().unwrap();
        let parsed = Fingerprint::from_json(&json).unwrap();
        assert_eq!(parsed, fp);
    }

    #[test]
    fn test_missing_optional_sections_accepted() {
        let mut value = serde_json::to_value(sample_fingerprint()).unwrap();
        value["hardware"] = serde_json::json!({});
        let fp: Fingerprint = serde_json::from_value(value).unwrap();
        assert!(!fp.hardware.has_battery());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Windows".parse::<TargetOs>().unwrap(), TargetOs::Windows);
        assert_eq!("firefox".parse::<TargetBrowser>().unwrap(), TargetBrowser::Firefox);
        assert!("solaris".parse::<TargetOs>().is_err());
        assert_eq!(TargetOs::Macos.navigator_platform(), "MacIntel");
        assert!(WebRtcPolicy::ProxyOnly.allows_leakage());
        assert!(!WebRtcPolicy::Disable.allows_leakage());
    }
}
