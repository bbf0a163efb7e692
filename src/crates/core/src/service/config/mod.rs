//! Configuration
//!
//! Defaults, then an optional TOML file, then environment overrides.

use crate::agentic::chat::reveal::RevealCadence;
use crate::util::errors::{ExploreError, ExploreResult};
use explore_core_types::ModelPreference;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_URL: &str = "EXPLORE_API_URL";
pub const ENV_MODEL: &str = "EXPLORE_MODEL";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

/// Timing and request options of the chat panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub phase_duration_ms: u64,
    pub reveal_chunk_chars: usize,
    pub reveal_tick_ms: u64,
    pub error_reset_ms: u64,
    pub include_sources: bool,
    pub model_preference: ModelPreference,
    pub max_attachment_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            phase_duration_ms: 800,
            reveal_chunk_chars: 3,
            reveal_tick_ms: 20,
            error_reset_ms: 3000,
            include_sources: true,
            model_preference: ModelPreference::Fast,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl ChatConfig {
    pub fn phase_duration(&self) -> Duration {
        Duration::from_millis(self.phase_duration_ms)
    }

    pub fn error_reset_delay(&self) -> Duration {
        Duration::from_millis(self.error_reset_ms)
    }

    pub fn reveal_cadence(&self) -> RevealCadence {
        RevealCadence {
            chunk_chars: self.reveal_chunk_chars,
            tick: Duration::from_millis(self.reveal_tick_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub api: ApiConfig,
    pub chat: ChatConfig,
}

impl ExploreConfig {
    /// `<config dir>/explore/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("explore").join("config.toml"))
    }

    pub fn from_toml_str(content: &str) -> ExploreResult<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ExploreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads `explicit_path`, else the default path if it exists, else defaults;
    /// then applies environment overrides and validates.
    pub fn load(explicit_path: Option<&Path>) -> ExploreResult<Self> {
        let mut config = match explicit_path {
            Some(path) => {
                info!("Loading config: path={}", path.display());
                Self::from_file(path)?
            }
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    info!("Loading config: path={}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ExploreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.chat.model_preference = parse_model_preference(&model)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> ExploreResult<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ExploreError::Config("api.base_url must not be empty".to_string()));
        }
        if self.api.request_timeout_secs == 0 || self.api.connect_timeout_secs == 0 {
            return Err(ExploreError::Config("api timeouts must be positive".to_string()));
        }
        let chat = &self.chat;
        if chat.phase_duration_ms == 0 || chat.reveal_tick_ms == 0 || chat.error_reset_ms == 0 {
            return Err(ExploreError::Config("chat durations must be positive".to_string()));
        }
        if chat.reveal_chunk_chars == 0 {
            return Err(ExploreError::Config(
                "chat.reveal_chunk_chars must be positive".to_string(),
            ));
        }
        if chat.max_attachment_bytes == 0 {
            return Err(ExploreError::Config(
                "chat.max_attachment_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_model_preference(value: &str) -> ExploreResult<ModelPreference> {
    match value.trim().to_lowercase().as_str() {
        "fast" | "flash" => Ok(ModelPreference::Fast),
        "thinking" => Ok(ModelPreference::Thinking),
        other => Err(ExploreError::Config(format!("Unknown model preference: {}", other))),
    }
}
