//! Application Configuration
//!
//! Scanner timing, recognition and search settings stored in TOML format.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::vision::matcher::DEFAULT_CODE_PATTERN;

/// Settings rejected by [`AppConfig::validate`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("region of interest must be non-empty, got {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },
    #[error("sample interval must be greater than zero")]
    ZeroInterval,
    #[error("failure cooldown ({failure_ms} ms) must be shorter than success cooldown ({success_ms} ms)")]
    CooldownOrder { failure_ms: u64, success_ms: u64 },
    #[error("invalid code pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("character whitelist must not be empty")]
    EmptyWhitelist,
    #[error("search URL must not be empty")]
    EmptyApiUrl,
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Scan loop settings
    pub scanner: ScannerSettings,
    /// Recognition engine settings
    pub recognition: RecognitionSettings,
    /// Search service settings
    pub search: SearchSettings,
    /// Frame feed settings
    pub capture: CaptureSettings,
}

impl AppConfig {
    /// Check that the settings describe a usable scan pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scanner;
        if s.roi_width == 0 || s.roi_height == 0 {
            return Err(ConfigError::EmptyRegion {
                width: s.roi_width,
                height: s.roi_height,
            });
        }
        if s.sample_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if s.failure_cooldown_ms >= s.success_cooldown_ms {
            return Err(ConfigError::CooldownOrder {
                failure_ms: s.failure_cooldown_ms,
                success_ms: s.success_cooldown_ms,
            });
        }
        regex::Regex::new(&s.code_pattern)?;
        if self.recognition.char_whitelist.is_empty() {
            return Err(ConfigError::EmptyWhitelist);
        }
        if self.search.api_url.trim().is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }
        Ok(())
    }
}

/// Scan loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Width of the centered region of interest in pixels
    pub roi_width: u32,
    /// Height of the centered region of interest in pixels
    pub roi_height: u32,
    /// Minimum time between two samples
    pub sample_interval_ms: u64,
    /// How long a code stays suppressed after a successful search
    pub success_cooldown_ms: u64,
    /// How long scanning pauses after a failed or empty search
    pub failure_cooldown_ms: u64,
    /// Pattern a recognized model code must match
    pub code_pattern: String,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            roi_width: 300,
            roi_height: 100,
            sample_interval_ms: 800,
            success_cooldown_ms: 5000,
            failure_cooldown_ms: 2000,
            code_pattern: DEFAULT_CODE_PATTERN.to_string(),
        }
    }
}

impl ScannerSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn success_cooldown(&self) -> Duration {
        Duration::from_millis(self.success_cooldown_ms)
    }

    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_millis(self.failure_cooldown_ms)
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Path or name of the tesseract executable
    pub tesseract_path: PathBuf,
    /// Tesseract language pack
    pub language: String,
    /// Characters the engine is allowed to produce
    pub char_whitelist: String,
    /// Tesseract page segmentation mode (7 = single text line)
    pub page_segmentation_mode: u8,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            char_whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-".to_string(),
            page_segmentation_mode: 7,
        }
    }
}

/// Search service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Endpoint accepting `?keyword=<query>`
    pub api_url: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/search".to_string(),
            timeout_secs: 20,
        }
    }
}

impl SearchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Frame feed settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Frames per second published by the still-image replay feed
    pub max_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { max_fps: 10 }
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "productscanner", "ProductScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of `config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
