//! Persistent application settings.
//!
//! Settings are stored as JSON in the app data directory and survive restarts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::remote::DEFAULT_COLLECTION;

/// Application settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Menu database location. `None` = `<data dir>/delivery_menu.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Write the built-in sample menu into an empty database on startup.
    #[serde(default = "default_true")]
    pub seed_catalog: bool,
    /// Remote catalog connection.
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Remote document store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// When false the app runs against a process-local catalog only.
    #[serde(default)]
    pub enabled: bool,
    /// Firestore project id.
    #[serde(default)]
    pub project_id: String,
    /// REST endpoint root.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Collection holding the menu documents.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Optional OAuth bearer token sent with every request.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Upper bound on a full catalog fetch during refresh.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Upper bound on a single outbound document write.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_api_base() -> String {
    "https://firestore.googleapis.com/v1".into()
}
fn default_collection() -> String {
    DEFAULT_COLLECTION.into()
}
fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_write_timeout_secs() -> u64 {
    15
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            project_id: String::new(),
            api_base: default_api_base(),
            collection: default_collection(),
            auth_token: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: None,
            seed_catalog: true,
            remote: RemoteConfig::default(),
        }
    }
}

/// Get the app data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.delivery.menu")
}

/// Default location of the settings file.
pub fn default_settings_path() -> PathBuf {
    app_data_dir().join("settings.json")
}

impl Settings {
    /// Load settings from a JSON file. Returns defaults if file doesn't exist.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse settings file: {}, using defaults", e);
                Self::default()
            }),
            Err(_) => {
                tracing::info!("No settings file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Resolved database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.database_path {
            Some(path) => PathBuf::from(path),
            None => app_data_dir().join("delivery_menu.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.seed_catalog);
        assert!(!settings.remote.enabled);
        assert_eq!(settings.remote.collection, "menu_items");
        assert_eq!(settings.remote.fetch_timeout_secs, 10);
        assert!(settings.database_path().ends_with("delivery_menu.db"));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = std::env::temp_dir().join("delivery_menu_test_settings.json");
        let mut settings = Settings::default();
        settings.database_path = Some("/tmp/menu.db".into());
        settings.remote.enabled = true;
        settings.remote.project_id = "demo-project".into();
        settings.save(&tmp).unwrap();

        let loaded = Settings::load(&tmp);
        assert_eq!(loaded.database_path(), PathBuf::from("/tmp/menu.db"));
        assert!(loaded.remote.enabled);
        assert_eq!(loaded.remote.project_id, "demo-project");

        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"remote": {"enabled": true, "project_id": "p"}}"#).unwrap();
        assert!(settings.seed_catalog);
        assert_eq!(settings.remote.api_base, "https://firestore.googleapis.com/v1");
        assert_eq!(settings.remote.write_timeout_secs, 15);
    }

    #[test]
    fn test_load_missing_file() {
        let settings = Settings::load(&PathBuf::from("/nonexistent/settings.json"));
        assert!(settings.database_path.is_none());
    }
}
