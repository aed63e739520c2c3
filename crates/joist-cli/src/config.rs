//! The joist config file.
//!
//! A small TOML file at `~/.config/joist/config.toml` holding the database
//! URL, resolved behind CLI flags and environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use joist_db::config::DbConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// The joist config directory: `$XDG_CONFIG_HOME/joist`, else
/// `~/.config/joist`. XDG layout on every platform; `dirs::config_dir()`
/// would give `~/Library/Application Support` on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("joist");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("joist")
}

/// Path of the joist config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

fn write_config(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // Owner read/write only on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Parse the config file at its standard location. Missing file is an error.
pub fn load_config() -> Result<ConfigFile> {
    read_config(&config_path())
}

/// Write the config file to its standard location, creating parent dirs.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    write_config(&config_path(), config)
}

/// Fully resolved configuration for a CLI invocation.
#[derive(Debug)]
pub struct JoistConfig {
    pub db_config: DbConfig,
}

impl JoistConfig {
    /// Resolve the database URL: `cli_db_url`, then `JOIST_DATABASE_URL`,
    /// then the config file, then [`DbConfig::DEFAULT_URL`].
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("JOIST_DATABASE_URL") {
            url
        } else if let Some(cfg) = file_config {
            cfg.database.url
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
        })
    }
}
