//! Tool settings stored as JSON
//!
//! Every field has a serde default so older or hand-trimmed config files
//! keep loading after new settings are added.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::{android, capture, config};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Package name of the camera whose stores are patched
    #[serde(default = "default_camera_package")]
    pub camera_package: String,

    /// Directory holding `preferences_0` and `mmkv` (empty = derived from package)
    #[serde(default)]
    pub store_dir: String,

    /// Capture file written by the hook (empty = derived from package)
    #[serde(default)]
    pub capture_file: String,

    /// Where the full store directory is snapshotted before each write
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// App-writable directory the store file is patched in
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Binary used for privileged commands; empty runs through plain `sh`
    #[serde(default = "default_su_binary")]
    pub su_binary: String,

    /// Time given to the camera to exit before a rollback copies files back
    #[serde(default = "default_rollback_settle_ms")]
    pub rollback_settle_ms: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_camera_package() -> String {
    android::CAMERA_PACKAGE.to_string()
}

fn default_backup_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(config::APP_DIR);
    path.push("backup");
    path
}

fn default_scratch_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(config::APP_DIR);
    path.push("scratch");
    path
}

fn default_su_binary() -> String {
    "su".to_string()
}

fn default_rollback_settle_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            camera_package: default_camera_package(),
            store_dir: String::new(),
            capture_file: String::new(),
            backup_dir: default_backup_dir(),
            scratch_dir: default_scratch_dir(),
            su_binary: default_su_binary(),
            rollback_settle_ms: default_rollback_settle_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Load settings from JSON, writing a default file when none exists
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, creating default config");
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON config from {:?}", path))?;

        info!(path = %path.display(), package = %settings.camera_package, "Loaded config");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        fs::write(path, json).with_context(|| format!("Failed to write config to {:?}", path))?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Camera MMKV directory, derived from the package unless overridden
    pub fn store_dir(&self) -> PathBuf {
        if !self.store_dir.is_empty() {
            return PathBuf::from(&self.store_dir);
        }
        Path::new(android::DATA_ROOT)
            .join(&self.camera_package)
            .join("files")
            .join("mmkv")
    }

    pub fn capture_file(&self) -> PathBuf {
        if !self.capture_file.is_empty() {
            return PathBuf::from(&self.capture_file);
        }
        Path::new(android::DATA_ROOT)
            .join(&self.camera_package)
            .join("files")
            .join(capture::FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths_follow_package() {
        let settings = Settings {
            camera_package: "com.example.cam".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.store_dir(), PathBuf::from("/data/data/com.example.cam/files/mmkv"));
        assert_eq!(
            settings.capture_file(),
            PathBuf::from("/data/data/com.example.cam/files/filter_capture.json")
        );
    }

    #[test]
    fn test_explicit_paths_override_derived() {
        let settings = Settings {
            store_dir: "/tmp/store".to_string(),
            capture_file: "/tmp/capture.json".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.store_dir(), PathBuf::from("/tmp/store"));
        assert_eq!(settings.capture_file(), PathBuf::from("/tmp/capture.json"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"su_binary": ""}"#).unwrap();
        assert_eq!(settings.su_binary, "");
        assert_eq!(settings.camera_package, android::CAMERA_PACKAGE);
        assert_eq!(settings.rollback_settle_ms, 500);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(settings, Settings::default());

        let reloaded = Settings::load(&path).unwrap();
        assert_eq!(reloaded, settings);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
