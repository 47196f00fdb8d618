//! Bridge settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//!
//! Sample rates, frame size and the ringing delay are fixed constants of the
//! `audio` and `session` modules, not settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{AppPaths, CredentialSource};

// ---------------------------------------------------------------------------
// VoiceProfile
// ---------------------------------------------------------------------------

/// Prebuilt voice the remote model speaks with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceProfile {
    Kore,
    Puck,
    Charon,
    Fenrir,
    Aoede,
}

impl VoiceProfile {
    /// Name sent to the remote session.
    pub fn name(&self) -> &'static str {
        match self {
            VoiceProfile::Kore => "Kore",
            VoiceProfile::Puck => "Puck",
            VoiceProfile::Charon => "Charon",
            VoiceProfile::Fenrir => "Fenrir",
            VoiceProfile::Aoede => "Aoede",
        }
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self::Kore
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// Settings for the remote conversational session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Model identifier requested when opening the session.
    pub model: String,
    /// Voice the assistant answers with.
    pub voice: VoiceProfile,
    /// Name of the environment variable holding the API credential.
    ///
    /// The credential itself is never written to `settings.toml`.
    pub api_key_env: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice: VoiceProfile::default(),
            api_key_env: "API_KEY".into(),
        }
    }
}

impl SessionSettings {
    /// Credential source described by these settings.
    pub fn credentials(&self) -> CredentialSource {
        CredentialSource::Env(self.api_key_env.clone())
    }
}

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Audio device selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

// ---------------------------------------------------------------------------
// BridgeConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_concierge::config::BridgeConfig;
///
/// // Load (returns Default when file is missing)
/// let config = BridgeConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Remote session settings.
    #[serde(default)]
    pub session: SessionSettings,
    /// Audio device settings.
    #[serde(default)]
    pub audio: AudioSettings,
}

impl BridgeConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(BridgeConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
