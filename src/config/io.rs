//! Configuration file I/O operations

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;

use super::Config;

/// Write `content` to `path` atomically while holding an exclusive lock.
///
/// The lock lives in a sibling `.lock` file so the rename cannot invalidate
/// it; the content goes to a `.tmp` sibling first and is renamed into place.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let lock_path = sibling(path, "lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;

    // Blocks until available
    lock_file
        .lock_exclusive()
        .with_context(|| format!("Failed to acquire lock: {}", lock_path.display()))?;

    let temp_path = sibling(path, "tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    temp_file
        .sync_all()
        .with_context(|| format!("Failed to sync {}", temp_path.display()))?;

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename into place: {}", path.display()))?;

    // Lock is released when lock_file is dropped
    Ok(())
}

/// `config.toml` -> `config.toml.lock`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl Config {
    /// Get the global config directory path (~/.voxgen/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".voxgen")
    }

    /// Get the global config file path (~/.voxgen/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration with atomic write and file locking
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;
        write_atomic(path, content.as_bytes())
    }

    /// Load `path` if it exists, otherwise defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load global configuration from ~/.voxgen/config.toml
    pub fn load() -> Result<Self> {
        Self::load_or_default(&Self::global_config_path())
    }

    /// Write a default config unless one exists. Returns true when created.
    pub fn init_at(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        Self::default().save_to_file(path)?;
        Ok(true)
    }
}
