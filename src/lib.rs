//! Ghost-Oxide: fingerprint consistency and injection engine
//!
//! Generates internally consistent browser fingerprints for isolated profiles,
//! validates them against real-device statistics and the profile's proxy, and
//! installs them into live browser sessions over the Chrome DevTools Protocol.

pub mod error;
pub mod config;

pub mod cdp;
pub mod fingerprint;
pub mod session;
pub mod stealth;

// Re-exports
pub use error::{Error, Result};

/// Ghost-Oxide library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
