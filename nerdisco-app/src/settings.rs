//! Persistent application settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use nerdisco_core::PipelineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Input device name; `None` uses the system default.
    pub capture_device: Option<String>,
    /// How often the console meter line is refreshed.
    pub meter_interval_ms: u64,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            capture_device: None,
            meter_interval_ms: 250,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.capture_device = self
            .capture_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.meter_interval_ms = self.meter_interval_ms.clamp(50, 5_000);
        self.pipeline.normalize();
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("NerDisco")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("nerdisco")
            .join("settings.json")
    }
}

/// Read settings, falling back to defaults when the file is missing or corrupt.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
