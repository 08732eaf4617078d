//! # 指纹数据模型
//!
//! 每个浏览器配置文件拥有一个完整的合成指纹。该模块只包含纯数据结构及其
//! 持久化形式，生成、校验与注入逻辑位于 `stealth` 模块。
//!
//! ## 模块结构
//! - `model`: 指纹各子结构（navigator、screen、webgl 等）
//! - `profile`: 配置文件记录，持有指纹并控制重新生成与导入
//!
//! ## 使用示例
//! ```rust,no_run
//! use ghost_oxide::fingerprint::Fingerprint;
//!
//! # fn example(json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let fingerprint = Fingerprint::from_json(json)?;
//! println!("{}", fingerprint.navigator.user_agent);
//! # Ok(())
//! # }
//! ```

pub mod model;
pub mod profile;

pub use model::{
    AudioFingerprint, CanvasFingerprint, Fingerprint, FontsFingerprint, HardwareFingerprint,
    MimeType, MiscFingerprint, NavigatorFingerprint, NetworkFingerprint, PermissionState,
    Plugin, ScreenFingerprint, TargetBrowser, TargetOs, TimezoneFingerprint, WebGlFingerprint,
    WebRtcPolicy,
};
pub use profile::Profile;
