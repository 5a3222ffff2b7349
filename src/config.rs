//! Engine configuration.
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - A TOML file: `--config`, else `$TXFS_CONFIG`, else `./txfs.toml` if present
//! - Command-line flags
//!
//! ```toml
//! storage_root = "/srv/store"
//! staging_root = "/srv/store.staging"
//! sync_staged = true
//! ```

use crate::error::{Result, TxfsError};

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TXFS_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "txfs.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root directory of the shared physical store.
    pub storage_root: PathBuf,

    /// Parent of the per-transaction staging directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<PathBuf>,

    /// Fsync staged payloads on prepare and replayed files on commit.
    #[serde(default = "default_sync_staged")]
    pub sync_staged: bool,
}

fn default_sync_staged() -> bool {
    true
}

/// Partial configuration as read from a file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    storage_root: Option<PathBuf>,
    staging_root: Option<PathBuf>,
    sync_staged: Option<bool>,
}

impl ConfigFile {
    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TxfsError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut file: ConfigFile = toml::from_str(&content)
            .map_err(|e| TxfsError::Config(format!("{}: {}", path.display(), e)))?;

        // Relative paths are relative to the file's directory.
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        file.storage_root = file.storage_root.map(|p| base.join(p));
        file.staging_root = file.staging_root.map(|p| base.join(p));

        log::debug!("Loaded config from {}", path.display());
        Ok(file)
    }
}

/// Command-line values that override file settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub storage_root: Option<PathBuf>,
    pub staging_root: Option<PathBuf>,
}

impl Config {
    /// Default configuration for a store at `storage_root`.
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            staging_root: None,
            sync_staged: default_sync_staged(),
        }
    }

    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(staging_root.into());
        self
    }

    pub fn with_sync_staged(mut self, sync_staged: bool) -> Self {
        self.sync_staged = sync_staged;
        self
    }

    /// Loads a complete configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = ConfigFile::read(path)?;
        let storage_root = file.storage_root.ok_or_else(|| {
            TxfsError::Config(format!("{}: missing `storage_root`", path.display()))
        })?;

        let mut config = Config::new(storage_root);
        config.staging_root = file.staging_root;
        if let Some(sync) = file.sync_staged {
            config.sync_staged = sync;
        }
        config.validate()?;
        Ok(config)
    }

    /// Merges defaults, the discovered config file and `overrides`.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let file = match discover(overrides.config.as_deref())? {
            Some(path) => ConfigFile::read(&path)?,
            None => ConfigFile::default(),
        };

        let storage_root = overrides
            .storage_root
            .or(file.storage_root)
            .ok_or_else(|| {
                TxfsError::Config(
                    "no storage root configured (use --root or `storage_root`)".to_string(),
                )
            })?;

        let config = Config {
            storage_root,
            staging_root: overrides.staging_root.or(file.staging_root),
            sync_staged: file.sync_staged.unwrap_or_else(default_sync_staged),
        };
        config.validate()?;
        Ok(config)
    }

    /// Effective staging root: the configured one, or `<storage_root>.staging`.
    pub fn staging_root(&self) -> PathBuf {
        if let Some(staging) = &self.staging_root {
            return staging.clone();
        }
        match self.storage_root.file_name() {
            Some(name) => {
                let mut sibling = name.to_os_string();
                sibling.push(".staging");
                self.storage_root.with_file_name(sibling)
            }
            None => env::temp_dir().join("txfs-staging"),
        }
    }

    /// Rejects layouts where staging would be visible inside the store.
    pub fn validate(&self) -> Result<()> {
        let storage = std::path::absolute(&self.storage_root)?;
        let staging = std::path::absolute(self.staging_root())?;

        if staging.starts_with(&storage) {
            return Err(TxfsError::Config(format!(
                "staging root {} must not lie inside storage root {}",
                staging.display(),
                storage.display()
            )));
        }
        if storage.starts_with(&staging) {
            return Err(TxfsError::Config(format!(
                "storage root {} must not lie inside staging root {}",
                storage.display(),
                staging.display()
            )));
        }
        Ok(())
    }
}

/// Finds the config file to use, if any.
fn discover(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Ok(Some(PathBuf::from(path)));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    Ok(local.is_file().then_some(local))
}
