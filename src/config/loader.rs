// Configuration file loading

use crate::file_storage::get_default_state_dir;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which session store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Persist nothing
    Noop,
    /// In-process memory only
    Memory,
    /// JSON state file with atomic replace
    #[default]
    File,
    /// SQLite database
    Sqlite,
}

impl BackendKind {
    /// File name used when no explicit path is configured
    pub fn default_file_name(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sessions.db",
            _ => "sessions.json",
        }
    }
}

/// SQLite journal mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    #[default]
    Wal,
    Delete,
}

impl SqliteJournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            SqliteJournalMode::Wal => "wal",
            SqliteJournalMode::Delete => "delete",
        }
    }
}

/// SQLite synchronous mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest)
    #[default]
    Full,
    Normal,
}

impl SqliteSyncMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            SqliteSyncMode::Full => "full",
            SqliteSyncMode::Normal => "normal",
        }
    }
}

/// SQLite backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSettings {
    /// Busy timeout in milliseconds
    #[serde(
        rename = "busyTimeoutMs",
        alias = "busy_timeout_ms",
        default = "default_busy_timeout_ms"
    )]
    pub busy_timeout_ms: u64,
    #[serde(rename = "journalMode", alias = "journal_mode", default)]
    pub journal_mode: SqliteJournalMode,
    #[serde(default)]
    pub synchronous: SqliteSyncMode,
}

fn default_busy_timeout_ms() -> u64 { 5000 }

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteJournalMode::default(),
            synchronous: SqliteSyncMode::default(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Backend to open
    #[serde(default)]
    pub backend: BackendKind,
    /// State file or database path; defaults under ~/.lock-session-store
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// SQLite settings (ignored by other backends)
    #[serde(default)]
    pub sqlite: SqliteSettings,
}

impl StoreConfig {
    /// Path the file or SQLite backend will use
    pub fn state_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| get_default_state_dir().join(self.backend.default_file_name()))
    }
}

/// Config loader
pub struct ConfigLoader {
    /// Default config path
    default_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            default_path: Some(Self::get_default_config_path()),
        }
    }

    /// Get the default config path (~/.lock-session-store/config.toml)
    pub fn get_default_config_path() -> PathBuf {
        get_default_state_dir().join("config.toml")
    }

    /// Load from an explicit path, or from the default path if it exists
    ///
    /// An explicitly named file must exist; a missing default file means
    /// defaults.
    pub fn load(&self, explicit: Option<&Path>) -> Result<StoreConfig> {
        if let Some(path) = explicit {
            return self
                .load_from_path(path)?
                .ok_or_else(|| anyhow!("Config file '{}' does not exist", path.display()));
        }

        match self.default_path {
            Some(ref path) => Ok(self.load_from_path(path)?.unwrap_or_default()),
            None => Ok(StoreConfig::default()),
        }
    }

    /// Load config from a specific path
    pub fn load_from_path(&self, path: &Path) -> Result<Option<StoreConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: StoreConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        self.validate_config(&config)?;

        Ok(Some(config))
    }

    /// Validate config values
    fn validate_config(&self, config: &StoreConfig) -> Result<()> {
        if let Some(ref path) = config.path {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("path cannot be empty"));
            }
            if path.is_dir() {
                return Err(anyhow!(
                    "path '{}' is a directory, expected a file",
                    path.display()
                ));
            }
        }

        if config.sqlite.busy_timeout_ms == 0 {
            return Err(anyhow!("busy_timeout_ms must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn loader_without_default() -> ConfigLoader {
        ConfigLoader { default_path: None }
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, BackendKind::File);
        assert!(config.path.is_none());
        assert!(config.state_path().ends_with("sessions.json"));
        assert_eq!(config.sqlite.busy_timeout_ms, 5000);
        assert_eq!(config.sqlite.synchronous, SqliteSyncMode::Full);
    }

    #[test]
    fn test_sqlite_default_path() {
        let config = StoreConfig {
            backend: BackendKind::Sqlite,
            ..StoreConfig::default()
        };
        assert!(config.state_path().ends_with("sessions.db"));
    }

    #[test]
    fn test_loads_config_file() {
        let temp_dir = create_test_dir();
        let config_path = temp_dir.path().join("config.toml");

        let config_content = r#"
backend = "sqlite"
path = "/var/lib/locks/sessions.db"

[sqlite]
busy_timeout_ms = 250
journalMode = "delete"
synchronous = "normal"
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = loader_without_default().load(Some(&config_path)).unwrap();
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(
            config.state_path(),
            PathBuf::from("/var/lib/locks/sessions.db")
        );
        assert_eq!(config.sqlite.busy_timeout_ms, 250);
        assert_eq!(config.sqlite.journal_mode, SqliteJournalMode::Delete);
        assert_eq!(config.sqlite.synchronous, SqliteSyncMode::Normal);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = create_test_dir();
        let missing = temp_dir.path().join("nope.toml");
        assert!(loader_without_default().load(Some(&missing)).is_err());
    }

    #[test]
    fn test_missing_default_file_gives_defaults() {
        let temp_dir = create_test_dir();
        let loader = ConfigLoader {
            default_path: Some(temp_dir.path().join("config.toml")),
        };
        let config = loader.load(None).unwrap();
        assert_eq!(config.backend, BackendKind::File);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let temp_dir = create_test_dir();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "backend = \"etcd\"\n").unwrap();

        let err = loader_without_default().load(Some(&config_path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_rejects_directory_path() {
        let temp_dir = create_test_dir();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            format!("path = {:?}\n", temp_dir.path().display().to_string()),
        )
        .unwrap();

        let err = loader_without_default().load(Some(&config_path)).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_rejects_zero_busy_timeout() {
        let temp_dir = create_test_dir();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[sqlite]\nbusyTimeoutMs = 0\n").unwrap();

        assert!(loader_without_default().load(Some(&config_path)).is_err());
    }
}
