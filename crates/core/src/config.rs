//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Reporting engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorylineConfig {
    /// Directory receiving one JSON report per test run
    pub output_dir: PathBuf,

    /// Screenshot configuration
    pub screenshots: ScreenshotConfig,

    /// API call recording configuration
    pub api: ApiConfig,
}

impl Default for StorylineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("target/storyline"),
            screenshots: ScreenshotConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    /// Take before/after screenshots in UI steps
    pub capture: bool,

    /// Write screenshot files next to the report
    pub persist: bool,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            capture: true,
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Request headers masked in recorded API calls (case-insensitive)
    pub redact_headers: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            redact_headers: [
                "authorization",
                "x-authorization",
                "proxy-authorization",
                "cookie",
                "set-cookie",
                "x-api-key",
            ]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        }
    }
}

impl StorylineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
