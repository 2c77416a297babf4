//! Application paths and persisted settings.
//!
//! Directory priority:
//! 1. CLI `--config-dir`
//! 2. `VVSTUDIO_CONFIG_DIR` environment variable
//! 3. Current directory, if it already holds `vvstudio.json` or `vvstudio.log`
//! 4. Platform directories from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/vvstudio, ~/.local/share/vvstudio
//! - macOS: ~/Library/Application Support/vvstudio
//! - Windows: %APPDATA%\vvstudio

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::entities::MediaPolicy;
use crate::store::atomic;
use crate::store::versions::DEFAULT_RETENTION;

pub const APP_DIR_NAME: &str = "vvstudio";
pub const SETTINGS_FILE: &str = "vvstudio.json";
pub const LOG_FILE: &str = "vvstudio.log";
pub const RECENT_FILE: &str = "recent_projects.json";
pub const TRASH_DIR: &str = "Trash";
pub const CONFIG_DIR_ENV: &str = "VVSTUDIO_CONFIG_DIR";

/// Overrides for the default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args, then `VVSTUDIO_CONFIG_DIR`, then defaults.
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Data files: recent projects, logs, trash.
    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir().join(name)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_file(SETTINGS_FILE)
    }

    pub fn default_trash_dir(&self) -> PathBuf {
        self.data_file(TRASH_DIR)
    }

    /// Create the config and data directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        let config_dir = self.config_dir();
        let data_dir = self.data_dir();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
        }
        if data_dir != config_dir && !data_dir.exists() {
            fs::create_dir_all(&data_dir)
                .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        }
        Ok(())
    }

    fn config_dir(&self) -> PathBuf {
        self.resolve(dirs_next::config_dir())
    }

    fn data_dir(&self) -> PathBuf {
        self.resolve(dirs_next::data_dir())
    }

    fn resolve(&self, platform_dir: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Ok(current_dir) = std::env::current_dir() {
            if has_local_config_files(&current_dir) {
                return current_dir;
            }
        }
        platform_dir
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// User settings, `vvstudio.json` in the config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub autosave_interval_secs: u64,
    pub version_retention: usize,
    /// 0 = derive from CPU count
    pub background_workers: usize,
    pub background_queue_capacity: usize,
    pub trash_dir: Option<PathBuf>,
    pub default_media_policy: MediaPolicy,
    pub treat_unknown_as_video: bool,
    pub recent_projects_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autosave_interval_secs: 30,
            version_retention: DEFAULT_RETENTION,
            background_workers: 0,
            background_queue_capacity: 64,
            trash_dir: None,
            default_media_policy: MediaPolicy::Copy,
            treat_unknown_as_video: false,
            recent_projects_limit: 10,
        }
    }
}

impl Settings {
    /// Missing file gives defaults; a malformed one is reported and ignored.
    pub fn load(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No settings at {} ({}), using defaults", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic::write_atomic(path, &json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }

    pub fn worker_count(&self) -> usize {
        match self.background_workers {
            0 => (num_cpus::get() / 2).max(1),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_files_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config.settings_file(), PathBuf::from("/custom/vvstudio.json"));
        assert_eq!(config.data_file(RECENT_FILE), PathBuf::from("/custom/recent_projects.json"));
        assert_eq!(config.default_trash_dir(), PathBuf::from("/custom/Trash"));
    }

    #[test]
    fn test_cli_dir_wins() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/cfg");
        let config = PathConfig {
            config_dir: Some(dir.clone()),
        };
        config.ensure_dirs().unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_settings_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{ "version_retention": 5, "default_media_policy": "link" }"#).unwrap();

        let settings = Settings::load(&path);
        assert_eq!(settings.version_retention, 5);
        assert_eq!(settings.default_media_policy, MediaPolicy::Link);
        assert_eq!(settings.autosave_interval_secs, 30);
        assert_eq!(settings.recent_projects_limit, 10);
    }

    #[test]
    fn test_settings_malformed_or_missing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);
        assert_eq!(Settings::load(&path), Settings::default());

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_settings_save_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cfg").join(SETTINGS_FILE);
        let settings = Settings {
            background_workers: 3,
            trash_dir: Some(tmp.path().join("bin")),
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);
        assert_eq!(settings.worker_count(), 3);
    }
}
