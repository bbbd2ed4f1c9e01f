//! Init command implementation

use anyhow::{Result, bail};
use std::path::PathBuf;

use voxgen::config::Config;
use voxgen::services::{PRIMARY_KEY_ENV, SECONDARY_KEY_ENV};

/// Write a default `config.toml`
pub fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Config::global_config_path);

    if !Config::init_at(&config_path, force)? {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    println!("Created: {}", config_path.display());
    println!(
        "Add your API keys under [credentials] or set {} / {}.",
        PRIMARY_KEY_ENV, SECONDARY_KEY_ENV
    );
    Ok(())
}
