//! User-Agent construction and parsing
//!
//! Chromium reports the reduced form (`Chrome/131.0.0.0`), so only the major
//! version is carried.

use crate::fingerprint::{TargetBrowser, TargetOs};

/// What a User-Agent string claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAgentClaims {
    pub os: TargetOs,
    pub browser: TargetBrowser,
    pub major: u32,
}

fn os_token(os: TargetOs, browser: TargetBrowser) -> &'static str {
    match (os, browser) {
        (TargetOs::Windows, _) => "Windows NT 10.0; Win64; x64",
        (TargetOs::Macos, TargetBrowser::Firefox) => "Macintosh; Intel Mac OS X 10.15",
        (TargetOs::Macos, _) => "Macintosh; Intel Mac OS X 10_15_7",
        (TargetOs::Linux, _) => "X11; Linux x86_64",
    }
}

/// Build the `navigator.userAgent` string for a browser release
pub fn build_user_agent(os: TargetOs, browser: TargetBrowser, major: u32) -> String {
    let token = os_token(os, browser);
    match browser {
        TargetBrowser::Chrome => format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
            token, major
        ),
        TargetBrowser::Edge => format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36 Edg/{}.0.0.0",
            token, major, major
        ),
        TargetBrowser::Firefox => format!(
            "Mozilla/5.0 ({}; rv:{}.0) Gecko/20100101 Firefox/{}.0",
            token, major, major
        ),
    }
}

/// `navigator.appVersion` matching a User-Agent
pub fn app_version(user_agent: &str, os: TargetOs, browser: TargetBrowser) -> String {
    if browser.is_chromium() {
        return user_agent.trim_start_matches("Mozilla/").to_string();
    }
    let family = match os {
        TargetOs::Windows => "Windows",
        TargetOs::Macos => "Macintosh",
        TargetOs::Linux => "X11",
    };
    format!("5.0 ({})", family)
}

fn major_after(user_agent: &str, marker: &str) -> Option<u32> {
    let start = user_agent.find(marker)? + marker.len();
    let digits: String = user_agent[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Extract the OS, browser family and major version a User-Agent claims
pub fn parse_user_agent(user_agent: &str) -> Option<UserAgentClaims> {
    let os = if user_agent.contains("Windows NT") {
        TargetOs::Windows
    } else if user_agent.contains("Macintosh") {
        TargetOs::Macos
    } else if user_agent.contains("Linux") && !user_agent.contains("Android") {
        TargetOs::Linux
    } else {
        return None;
    };

    let (browser, major) = if let Some(major) = major_after(user_agent, "Firefox/") {
        (TargetBrowser::Firefox, major)
    } else if let Some(major) = major_after(user_agent, "Edg/") {
        (TargetBrowser::Edge, major)
    } else if let Some(major) = major_after(user_agent, "Chrome/") {
        (TargetBrowser::Chrome, major)
    } else {
        return None;
    };

    Some(UserAgentClaims { os, browser, major })
}

/// OS implied by `navigator.platform`
pub fn platform_os(platform: &str) -> Option<TargetOs> {
    match platform {
        "Win32" | "Win64" => Some(TargetOs::Windows),
        "MacIntel" => Some(TargetOs::Macos),
        p if p.starts_with("Linux") => Some(TargetOs::Linux),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_windows() {
        let ua = build_user_agent(TargetOs::Windows, TargetBrowser::Chrome, 131);
        assert_eq!(
            ua,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
        );
        assert_eq!(
            parse_user_agent(&ua),
            Some(UserAgentClaims {
                os: TargetOs::Windows,
                browser: TargetBrowser::Chrome,
                major: 131
            })
        );
    }

    #[test]
    fn test_edge_is_not_mistaken_for_chrome() {
        let ua = build_user_agent(TargetOs::Macos, TargetBrowser::Edge, 130);
        let claims = parse_user_agent(&ua).unwrap();
        assert_eq!(claims.browser, TargetBrowser::Edge);
        assert_eq!(claims.os, TargetOs::Macos);
        assert_eq!(claims.major, 130);
    }

    #[test]
    fn test_firefox_app_version() {
        let ua = build_user_agent(TargetOs::Linux, TargetBrowser::Firefox, 128);
        assert!(ua.contains("rv:128.0) Gecko/20100101 Firefox/128.0"));
        assert_eq!(app_version(&ua, TargetOs::Linux, TargetBrowser::Firefox), "5.0 (X11)");
        assert_eq!(parse_user_agent(&ua).unwrap().browser, TargetBrowser::Firefox);
    }

    #[test]
    fn test_unparseable() {
        assert!(parse_user_agent("curl/8.0").is_none());
        assert!(parse_user_agent("Mozilla/5.0 (Linux; Android 14) Chrome/131.0.0.0").is_none());
        assert_eq!(platform_os("Linux x86_64"), Some(TargetOs::Linux));
        assert_eq!(platform_os("iPhone"), None);
    }
}
