// Layered store configuration: config file, then CLI/env overrides

pub mod loader;

// Re-export main types
pub use loader::{
    BackendKind, ConfigLoader, SqliteJournalMode, SqliteSettings, SqliteSyncMode, StoreConfig,
};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Values given on the command line or in the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<BackendKind>,
    pub path: Option<PathBuf>,
}

/// Load the config file and apply overrides
/// Priority: CLI/env -> config file -> defaults
pub fn load_config(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<StoreConfig> {
    let mut config = ConfigLoader::new().load(config_path)?;

    if let Some(backend) = overrides.backend {
        config.backend = backend;
    }
    if let Some(path) = overrides.path {
        config.path = Some(path);
    }

    log::debug!(
        "Session store config: backend={:?} path={}",
        config.backend,
        config.state_path().display()
    );
    Ok(config)
}
