//! Configuration module for the voice concierge bridge.
//!
//! Provides [`BridgeConfig`] (top-level settings) with its sub-configs,
//! [`AppPaths`] for cross-platform config directories, TOML persistence via
//! `BridgeConfig::load` / `BridgeConfig::save`, and [`CredentialSource`] for
//! the API credential read at connect time.

pub mod credentials;
pub mod paths;
pub mod settings;

pub use credentials::CredentialSource;
pub use paths::AppPaths;
pub use settings::{AudioSettings, BridgeConfig, SessionSettings, VoiceProfile};
