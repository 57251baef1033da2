//! Persisted evaluation preference, stored as a small JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CevalResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CevalSettings {
    #[serde(default = "default_enable_ceval")]
    pub enable_ceval: bool,
}

fn default_enable_ceval() -> bool {
    true
}

impl Default for CevalSettings {
    fn default() -> Self {
        Self {
            enable_ceval: default_enable_ceval(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored settings. A missing or unreadable file yields the
    /// defaults.
    pub async fn load(&self) -> CevalSettings {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No settings file, using defaults");
                return CevalSettings::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read settings");
                return CevalSettings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Invalid settings file, using defaults");
                CevalSettings::default()
            }
        }
    }

    pub async fn save(&self, settings: &CevalSettings) -> CevalResult<()> {
        let json = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ceval-settings-{}-{name}.json", std::process::id()))
    }

    #[tokio::test]
    async fn test_missing_file_defaults_to_enabled() {
        let store = SettingsStore::new(temp_path("missing"));
        assert!(store.load().await.enable_ceval);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path = temp_path("saved");
        let store = SettingsStore::new(&path);
        store.save(&CevalSettings { enable_ceval: false }).await.unwrap();
        assert!(!store.load().await.enable_ceval);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_garbage_falls_back() {
        let path = temp_path("garbage");
        std::fs::write(&path, "not json").unwrap();
        let store = SettingsStore::new(&path);
        assert_eq!(store.load().await, CevalSettings::default());
        let _ = std::fs::remove_file(path);
    }
}
