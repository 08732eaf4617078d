//! Plausibility corpus
//!
//! Reference tables of real device and browser combinations. The built-in
//! tables can be replaced by a TOML or JSON file with the same shape, so the
//! weighting can be refreshed without a code change.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::fingerprint::{TargetBrowser, TargetOs};
use crate::{Error, Result};

/// Pixel ratios a real display reports
pub const PIXEL_RATIOS: [f64; 6] = [1.0, 1.25, 1.5, 2.0, 2.5, 3.0];

/// Values `navigator.deviceMemory` may take in a stored fingerprint
pub const DEVICE_MEMORY_VALUES: [u32; 5] = [2, 4, 8, 16, 32];

/// Sample rates an output device reports
pub const SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Masked WebGL strings reported by Chromium
pub const CHROMIUM_MASKED_VENDOR: &str = "WebKit";
pub const CHROMIUM_MASKED_RENDERER: &str = "WebKit WebGL";
/// Masked WebGL strings reported by Firefox
pub const FIREFOX_MASKED: &str = "Mozilla";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlausibilityCorpus {
    pub version: String,
    pub platforms: Vec<PlatformProfile>,
    pub releases: Vec<BrowserRelease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub os: TargetOs,
    /// Pixels the taskbar, dock or menu bar takes from `availHeight`
    pub reserved_height: u32,
    pub color_depth: u32,
    pub tiers: Vec<DeviceTier>,
    pub fonts: FontSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    Desktop,
    Laptop,
}

/// Jointly sampled hardware bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTier {
    pub name: String,
    /// Relative market share inside the platform
    pub share: u32,
    pub form_factor: FormFactor,
    pub hardware_concurrency: u32,
    pub device_memory: Vec<u32>,
    pub screens: Vec<ScreenMode>,
    pub gpus: Vec<GpuPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenMode {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
    pub share: u32,
}

/// Unmasked WebGL strings as Chromium reports them through ANGLE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuPair {
    pub vendor: String,
    pub renderer: String,
    /// The same GPU as Firefox reports it (driver vendor, sanitized renderer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeGpu>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeGpu {
    pub vendor: String,
    pub renderer: String,
}

impl GpuPair {
    /// Vendor and renderer strings `browser` exposes for this GPU
    pub fn strings(&self, browser: TargetBrowser) -> (&str, &str) {
        match &self.native {
            Some(native) if !browser.is_chromium() => (&native.vendor, &native.renderer),
            _ => (&self.vendor, &self.renderer),
        }
    }

    /// Whether either form of this GPU matches
    pub fn matches(&self, vendor: &str, renderer: &str) -> bool {
        (self.vendor == vendor && self.renderer == renderer)
            || self
                .native
                .as_ref()
                .is_some_and(|n| n.vendor == vendor && n.renderer == renderer)
    }

    fn with_native(mut self, vendor: &str, renderer: &str) -> Self {
        self.native = Some(NativeGpu {
            vendor: vendor.to_string(),
            renderer: renderer.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontSet {
    /// Always installed with the OS
    pub core: Vec<String>,
    /// Shipped with common applications or optional language packs
    pub optional: Vec<String>,
}

impl FontSet {
    pub fn contains(&self, font: &str) -> bool {
        self.core.iter().chain(self.optional.iter()).any(|f| f == font)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserRelease {
    pub browser: TargetBrowser,
    pub major: u32,
    pub share: u32,
}

impl PlausibilityCorpus {
    /// Parse a corpus from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let corpus: Self = toml::from_str(content)
            .map_err(|e| Error::corpus(format!("Failed to parse corpus: {}", e)))?;
        corpus.check()?;
        Ok(corpus)
    }

    /// Parse a corpus from JSON
    pub fn from_json_str(content: &str) -> Result<Self> {
        let corpus: Self = serde_json::from_str(content)
            .map_err(|e| Error::corpus(format!("Failed to parse corpus: {}", e)))?;
        corpus.check()?;
        Ok(corpus)
    }

    /// Load a corpus file, choosing the format by extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::corpus(format!("Failed to read {}: {}", path.display(), e)))?;

        let corpus = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };
        info!("Loaded corpus {} from {}", corpus.version, path.display());
        Ok(corpus)
    }

    /// Load from `path` when given, else the built-in tables
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Structural checks a loaded corpus must pass before use
    pub fn check(&self) -> Result<()> {
        for os in TargetOs::ALL {
            let platform = self
                .platform(os)
                .ok_or_else(|| Error::corpus(format!("no platform entry for {}", os)))?;
            if platform.tiers.is_empty() {
                return Err(Error::corpus(format!("{} has no device tiers", os)));
            }
            for tier in &platform.tiers {
                if tier.share == 0
                    || tier.hardware_concurrency == 0
                    || tier.device_memory.is_empty()
                    || tier.screens.is_empty()
                    || tier.gpus.is_empty()
                {
                    return Err(Error::corpus(format!("tier {} of {} is incomplete", tier.name, os)));
                }
                if let Some(memory) = tier
                    .device_memory
                    .iter()
                    .find(|m| !DEVICE_MEMORY_VALUES.contains(m))
                {
                    return Err(Error::corpus(format!(
                        "tier {} lists unsupported deviceMemory {}",
                        tier.name, memory
                    )));
                }
                for mode in &tier.screens {
                    if !PIXEL_RATIOS.contains(&mode.pixel_ratio) || mode.share == 0 {
                        return Err(Error::corpus(format!(
                            "tier {} has invalid screen {}x{}@{}",
                            tier.name, mode.width, mode.height, mode.pixel_ratio
                        )));
                    }
                }
            }
        }
        for browser in TargetBrowser::ALL {
            if self.releases_for(browser).is_empty() {
                return Err(Error::corpus(format!("no releases for {}", browser)));
            }
        }
        Ok(())
    }

    pub fn platform(&self, os: TargetOs) -> Option<&PlatformProfile> {
        self.platforms.iter().find(|p| p.os == os)
    }

    pub fn releases_for(&self, browser: TargetBrowser) -> Vec<&BrowserRelease> {
        self.releases.iter().filter(|r| r.browser == browser && r.share > 0).collect()
    }

    pub fn knows_release(&self, browser: TargetBrowser, major: u32) -> bool {
        self.releases.iter().any(|r| r.browser == browser && r.major == major)
    }

    /// Tiers that could have produced this core/memory pairing
    pub fn tiers_matching(&self, os: TargetOs, cores: u32, memory: u32) -> Vec<&DeviceTier> {
        self.platform(os)
            .map(|p| {
                p.tiers
                    .iter()
                    .filter(|t| t.hardware_concurrency == cores && t.device_memory.contains(&memory))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn knows_gpu(&self, os: TargetOs, vendor: &str, renderer: &str) -> bool {
        self.platform(os).is_some_and(|p| {
            p.tiers
                .iter()
                .flat_map(|t| t.gpus.iter())
                .any(|g| g.matches(vendor, renderer))
        })
    }

    pub fn knows_screen(&self, os: TargetOs, width: u32, height: u32) -> bool {
        self.platform(os).is_some_and(|p| {
            p.tiers
                .iter()
                .flat_map(|t| t.screens.iter())
                .any(|s| s.width == width && s.height == height)
        })
    }

    /// Platforms whose font set contains `font`
    pub fn font_platforms(&self, font: &str) -> Vec<TargetOs> {
        self.platforms
            .iter()
            .filter(|p| p.fonts.contains(font))
            .map(|p| p.os)
            .collect()
    }

    /// Built-in tables
    pub fn builtin() -> Self {
        Self {
            version: "2026.10.1".to_string(),
            platforms: vec![windows(), macos(), linux()],
            releases: vec![
                release(TargetBrowser::Chrome, 131, 50),
                release(TargetBrowser::Chrome, 130, 30),
                release(TargetBrowser::Chrome, 129, 20),
                release(TargetBrowser::Edge, 131, 60),
                release(TargetBrowser::Edge, 130, 40),
                release(TargetBrowser::Firefox, 133, 55),
                release(TargetBrowser::Firefox, 132, 30),
                release(TargetBrowser::Firefox, 128, 15),
            ],
        }
    }
}

impl Default for PlausibilityCorpus {
    fn default() -> Self {
        Self::builtin()
    }
}

fn release(browser: TargetBrowser, major: u32, share: u32) -> BrowserRelease {
    BrowserRelease {
        browser,
        major,
        share,
    }
}

fn screen(width: u32, height: u32, pixel_ratio: f64, share: u32) -> ScreenMode {
    ScreenMode {
        width,
        height,
        pixel_ratio,
        share,
    }
}

fn gpu(vendor: &str, renderer: &str) -> GpuPair {
    GpuPair {
        vendor: vendor.to_string(),
        renderer: renderer.to_string(),
        native: None,
    }
}

/// Firefox on Windows also renders through ANGLE but drops the backend suffix
fn d3d(brand: &str, vendor_token: &str, model: &str) -> GpuPair {
    let vendor = format!("Google Inc. ({})", brand);
    gpu(
        &vendor,
        &format!("ANGLE ({}, {} Direct3D11 vs_5_0 ps_5_0, D3D11)", vendor_token, model),
    )
    .with_native(
        &vendor,
        &format!("ANGLE ({}, {} Direct3D11 vs_5_0 ps_5_0), or similar", vendor_token, model),
    )
}

fn metal(chip: &str) -> GpuPair {
    gpu(
        "Google Inc. (Apple)",
        &format!("ANGLE (Apple, ANGLE Metal Renderer: {}, Unspecified Version)", chip),
    )
    .with_native("Apple", &format!("{}, or similar", chip))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

struct TierSpec<'a> {
    name: &'a str,
    share: u32,
    form_factor: FormFactor,
    cores: u32,
    memory: &'a [u32],
}

fn tier(spec: TierSpec<'_>, screens: Vec<ScreenMode>, gpus: Vec<GpuPair>) -> DeviceTier {
    DeviceTier {
        name: spec.name.to_string(),
        share: spec.share,
        form_factor: spec.form_factor,
        hardware_concurrency: spec.cores,
        device_memory: spec.memory.to_vec(),
        screens,
        gpus,
    }
}

fn windows() -> PlatformProfile {
    use FormFactor::*;
    PlatformProfile {
        os: TargetOs::Windows,
        reserved_height: 40,
        color_depth: 24,
        tiers: vec![
            tier(
                TierSpec { name: "entry-laptop", share: 25, form_factor: Laptop, cores: 4, memory: &[4, 8] },
                vec![screen(1366, 768, 1.0, 40), screen(1536, 864, 1.25, 40), screen(1280, 720, 1.5, 20)],
                vec![
                    d3d("Intel", "Intel", "Intel(R) UHD Graphics 620"),
                    d3d("Intel", "Intel", "Intel(R) HD Graphics 520"),
                ],
            ),
            tier(
                TierSpec { name: "mainstream-laptop", share: 30, form_factor: Laptop, cores: 8, memory: &[8, 16] },
                vec![screen(1920, 1080, 1.0, 40), screen(1536, 864, 1.25, 45), screen(1280, 720, 1.5, 15)],
                vec![
                    d3d("Intel", "Intel", "Intel(R) Iris(R) Xe Graphics"),
                    d3d("AMD", "AMD", "AMD Radeon(TM) Graphics"),
                    d3d("NVIDIA", "NVIDIA", "NVIDIA GeForce RTX 3050 Laptop GPU"),
                ],
            ),
            tier(
                TierSpec { name: "mainstream-desktop", share: 30, form_factor: Desktop, cores: 8, memory: &[8, 16] },
                vec![screen(1920, 1080, 1.0, 70), screen(2560, 1440, 1.0, 15), screen(1600, 900, 1.0, 15)],
                vec![
                    d3d("NVIDIA", "NVIDIA", "NVIDIA GeForce GTX 1650"),
                    d3d("NVIDIA", "NVIDIA", "NVIDIA GeForce RTX 3060"),
                    d3d("Intel", "Intel", "Intel(R) UHD Graphics 630"),
                    d3d("AMD", "AMD", "AMD Radeon RX 580 Series"),
                ],
            ),
            tier(
                TierSpec { name: "performance-desktop", share: 15, form_factor: Desktop, cores: 16, memory: &[16, 32] },
                vec![screen(2560, 1440, 1.0, 45), screen(1920, 1080, 1.0, 40), screen(2560, 1440, 1.5, 15)],
                vec![
                    d3d("NVIDIA", "NVIDIA", "NVIDIA GeForce RTX 3080"),
                    d3d("NVIDIA", "NVIDIA", "NVIDIA GeForce RTX 4070"),
                    d3d("AMD", "AMD", "AMD Radeon RX 6800 XT"),
                    d3d("AMD", "AMD", "AMD Radeon RX 6700 XT"),
                ],
            ),
        ],
        fonts: FontSet {
            core: names(&[
                "Arial", "Arial Black", "Bahnschrift", "Calibri", "Cambria", "Cambria Math",
                "Candara", "Comic Sans MS", "Consolas", "Constantia", "Corbel", "Courier New",
                "Ebrima", "Franklin Gothic Medium", "Gabriola", "Gadugi", "Georgia", "Impact",
                "Javanese Text", "Leelawadee UI", "Lucida Console", "Lucida Sans Unicode",
                "Malgun Gothic", "Microsoft Himalaya", "Microsoft JhengHei", "Microsoft Sans Serif",
                "Microsoft YaHei", "MS Gothic", "MV Boli", "Myanmar Text", "Nirmala UI",
                "Palatino Linotype", "Segoe Print", "Segoe Script", "Segoe UI", "Segoe UI Emoji",
                "Segoe UI Symbol", "SimSun", "Sitka Text", "Sylfaen", "Symbol", "Tahoma",
                "Times New Roman", "Trebuchet MS", "Verdana", "Webdings", "Wingdings", "Yu Gothic",
            ]),
            optional: names(&[
                "Agency FB", "Book Antiqua", "Bookman Old Style", "Century Gothic", "Garamond",
                "Haettenschweiler", "Ink Free", "Lucida Bright", "Monotype Corsiva",
                "MS Reference Sans Serif", "Segoe UI Variable",
            ]),
        },
    }
}

fn macos() -> PlatformProfile {
    use FormFactor::*;
    PlatformProfile {
        os: TargetOs::Macos,
        reserved_height: 25,
        color_depth: 30,
        tiers: vec![
            tier(
                TierSpec { name: "macbook-air", share: 40, form_factor: Laptop, cores: 8, memory: &[8, 16] },
                vec![screen(1440, 900, 2.0, 40), screen(1470, 956, 2.0, 60)],
                vec![metal("Apple M1"), metal("Apple M2"), metal("Apple M3")],
            ),
            tier(
                TierSpec { name: "macbook-pro", share: 35, form_factor: Laptop, cores: 12, memory: &[16, 32] },
                vec![screen(1512, 982, 2.0, 60), screen(1728, 1117, 2.0, 40)],
                vec![metal("Apple M1 Pro"), metal("Apple M2 Pro"), metal("Apple M3 Pro")],
            ),
            tier(
                TierSpec { name: "mac-desktop", share: 15, form_factor: Desktop, cores: 8, memory: &[8, 16] },
                vec![screen(1920, 1080, 1.0, 40), screen(2560, 1440, 1.0, 35), screen(2240, 1260, 2.0, 25)],
                vec![metal("Apple M1"), metal("Apple M2")],
            ),
            tier(
                TierSpec { name: "intel-imac", share: 10, form_factor: Desktop, cores: 8, memory: &[8, 16] },
                vec![screen(2560, 1440, 2.0, 70), screen(2048, 1152, 2.0, 30)],
                vec![
                    gpu(
                        "Google Inc. (AMD)",
                        "ANGLE (AMD, AMD Radeon Pro 5500 XT OpenGL Engine, OpenGL 4.1)",
                    )
                    .with_native("ATI Technologies Inc.", "AMD Radeon Pro 5500 XT, or similar"),
                    gpu(
                        "Google Inc. (Intel Inc.)",
                        "ANGLE (Intel Inc., Intel(R) UHD Graphics 630 OpenGL Engine, OpenGL 4.1)",
                    )
                    .with_native("Intel Inc.", "Intel(R) UHD Graphics 630, or similar"),
                ],
            ),
        ],
        fonts: FontSet {
            core: names(&[
                "American Typewriter", "Andale Mono", "Arial", "Arial Black", "Arial Narrow",
                "Arial Rounded MT Bold", "Avenir", "Avenir Next", "Baskerville", "Big Caslon",
                "Chalkboard SE", "Cochin", "Comic Sans MS", "Copperplate", "Courier", "Courier New",
                "Didot", "Futura", "Geneva", "Georgia", "Gill Sans", "Helvetica", "Helvetica Neue",
                "Herculanum", "Hoefler Text", "Impact", "Lucida Grande", "Marker Felt", "Menlo",
                "Monaco", "Optima", "Palatino", "Papyrus", "Phosphate", "Rockwell", "Skia",
                "Snell Roundhand", "Tahoma", "Times", "Times New Roman", "Trebuchet MS", "Verdana",
                "Zapfino",
            ]),
            optional: names(&[
                "Apple SD Gothic Neo", "Bradley Hand", "Chalkduster", "Hiragino Sans",
                "Noteworthy", "PingFang SC", "SignPainter", "Trattatello",
            ]),
        },
    }
}

fn linux() -> PlatformProfile {
    use FormFactor::*;
    PlatformProfile {
        os: TargetOs::Linux,
        reserved_height: 27,
        color_depth: 24,
        tiers: vec![
            tier(
                TierSpec { name: "linux-laptop", share: 40, form_factor: Laptop, cores: 4, memory: &[8, 16] },
                vec![screen(1920, 1080, 1.0, 60), screen(1366, 768, 1.0, 40)],
                vec![
                    gpu("Google Inc. (Intel)", "ANGLE (Intel, Mesa Intel(R) UHD Graphics 620 (KBL GT2), OpenGL 4.6)")
                        .with_native("Intel", "Mesa Intel(R) UHD Graphics 620 (KBL GT2), or similar"),
                    gpu("Google Inc. (Intel)", "ANGLE (Intel, Mesa Intel(R) Xe Graphics (TGL GT2), OpenGL 4.6)")
                        .with_native("Intel", "Mesa Intel(R) Xe Graphics (TGL GT2), or similar"),
                ],
            ),
            tier(
                TierSpec { name: "linux-workstation", share: 45, form_factor: Desktop, cores: 8, memory: &[8, 16] },
                vec![screen(1920, 1080, 1.0, 65), screen(2560, 1440, 1.0, 25), screen(1920, 1200, 1.0, 10)],
                vec![
                    gpu(
                        "Google Inc. (NVIDIA Corporation)",
                        "ANGLE (NVIDIA Corporation, NVIDIA GeForce GTX 1660/PCIe/SSE2, OpenGL 4.5.0)",
                    )
                    .with_native("NVIDIA Corporation", "NVIDIA GeForce GTX 1660/PCIe/SSE2, or similar"),
                    gpu(
                        "Google Inc. (AMD)",
                        "ANGLE (AMD, AMD Radeon RX 6600 (radeonsi, navi23, LLVM 15.0.7, DRM 3.52, 6.5.0), OpenGL 4.6)",
                    )
                    .with_native("AMD", "AMD Radeon RX 6600 (radeonsi, navi23), or similar"),
                ],
            ),
            tier(
                TierSpec { name: "linux-highend", share: 15, form_factor: Desktop, cores: 16, memory: &[16, 32] },
                vec![screen(2560, 1440, 1.0, 70), screen(1920, 1080, 1.0, 30)],
                vec![
                    gpu(
                        "Google Inc. (NVIDIA Corporation)",
                        "ANGLE (NVIDIA Corporation, NVIDIA GeForce RTX 3080/PCIe/SSE2, OpenGL 4.5.0)",
                    )
                    .with_native("NVIDIA Corporation", "NVIDIA GeForce RTX 3080/PCIe/SSE2, or similar"),
                    gpu(
                        "Google Inc. (AMD)",
                        "ANGLE (AMD, AMD Radeon RX 6800 XT (radeonsi, navi21, LLVM 15.0.7, DRM 3.52, 6.5.0), OpenGL 4.6)",
                    )
                    .with_native("AMD", "AMD Radeon RX 6800 XT (radeonsi, navi21), or similar"),
                ],
            ),
        ],
        fonts: FontSet {
            core: names(&[
                "DejaVu Sans", "DejaVu Sans Mono", "DejaVu Serif", "Liberation Mono",
                "Liberation Sans", "Liberation Serif", "Noto Mono", "Noto Sans", "Noto Serif",
            ]),
            optional: names(&[
                "Cantarell", "Droid Sans", "FreeMono", "FreeSans", "FreeSerif", "Noto Color Emoji",
                "Ubuntu", "Ubuntu Mono",
            ]),
        },
    }
}
