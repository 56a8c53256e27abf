use std::{collections::HashMap, path::Path, str::FromStr, time::Duration};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Automatic,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not parse JSON: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid mode '{0}', expected manual or automatic")]
    InvalidMode(String),
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Mode::Manual),
            "automatic" => Ok(Mode::Automatic),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// Keys recognized in `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "BANNER", default = "default_banner")]
    pub banner: String,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default = "default_proxy_example")]
    pub proxy_example: String,
    #[serde(default = "default_cookies_path")]
    pub cookies_path: String,
}

fn default_banner() -> String {
    "TikTok Live Recorder".to_string()
}

fn default_mode() -> String {
    "manual".to_string()
}

fn default_proxy_example() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_cookies_path() -> String {
    "cookies.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            banner: default_banner(),
            default_mode: default_mode(),
            proxy_example: default_proxy_example(),
            cookies_path: default_cookies_path(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Falls back to defaults when the config file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Cookie store file: a flat mapping of cookie name to value, loaded once
/// per run.
pub fn load_cookies(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Per-run settings, read-only after construction.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub mode: Mode,
    pub use_ffmpeg: bool,
    pub duration: Option<Duration>,
    pub auto_convert: bool,
    pub output_dir: String,
}
