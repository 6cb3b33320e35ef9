//! Configuration schema and loading.
//!
//! Read from a TOML file (see [`crate::paths::get_config_path`]). Every
//! section and field is optional; a missing file gives the defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use chatmirror_core::{source::DEFAULT_BASE_URL, AuthMode, FormatOptions};
use chatmirror_digest::{DEFAULT_ENDPOINT, DEFAULT_MAX_CHUNK_CHARS, DEFAULT_MODEL};
use chatmirror_export::{StrategyByKind, SyncStrategy};

/// Environment variable holding the remote bearer token.
pub const ACCESS_TOKEN_ENV: &str = "CHATMIRROR_ACCESS_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub export: ExportConfig,
    pub sync: SyncConfig,
    pub digest: DigestConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_mode: AuthMode,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_mode: AuthMode::default(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub include_timestamps: bool,
    /// Offset used for date grouping and message times; local time if unset.
    pub utc_offset_minutes: Option<i32>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exports"),
            include_timestamps: true,
            utc_offset_minutes: None,
        }
    }
}

impl ExportConfig {
    pub fn format_options(&self) -> FormatOptions {
        match self.utc_offset_minutes {
            Some(minutes) => FormatOptions::with_offset_minutes(self.include_timestamps, minutes),
            None => FormatOptions::with_local_offset(self.include_timestamps),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub chat_strategy: SyncStrategy,
    pub channel_strategy: SyncStrategy,
    /// Page budget per run.
    pub max_pages: Option<usize>,
}

impl SyncConfig {
    pub fn strategies(&self) -> StrategyByKind {
        StrategyByKind {
            chat: self.chat_strategy,
            channel: self.channel_strategy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub max_chunk_chars: usize,
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "CHATMIRROR_LLM_API_KEY".to_string(),
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
