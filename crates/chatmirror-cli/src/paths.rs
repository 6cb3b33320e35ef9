//! Shared path utilities for chatmirror-cli

use std::path::PathBuf;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "CHATMIRROR_CONFIG";

/// Get the config file path.
pub fn get_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("dev", "chatmirror", "chatmirror")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".chatmirror").join("config.toml"))
}
