//! Path resolution for sensuform
//!
//! # Environment Variables
//!
//! - `SENSUFORM_CONFIG` - Use this configuration file
//! - `SENSUFORM_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/sensuform`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `SENSUFORM_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/sensuform` (if set)
//! 3. `~/.config/sensuform`
//!
//! For config_file():
//! 1. `--config` / `SENSUFORM_CONFIG`
//! 2. `config.toml` in the config dir
//! 3. `config.json` in the config dir

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "SENSUFORM_CONFIG_DIR";

const APP_DIR: &str = "sensuform";

/// Config file names tried in order
pub const CONFIG_FILES: [&str; 2] = ["config.toml", "config.json"];

/// Get the sensuform config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(|key| std::env::var(key).ok(), dirs::home_dir())
}

fn resolve_config_dir(
    env: impl Fn(&str) -> Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = env(ENV_CONFIG_DIR).filter(|d| !d.is_empty()) {
        let path = expand_path(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = env("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Locate the configuration file.
///
/// `explicit` comes from `--config` (clap also reads `SENSUFORM_CONFIG`).
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        let path = expand_path(&path.to_string_lossy());
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(path);
    }

    let dir = config_dir()?;
    find_config_in(&dir).with_context(|| {
        format!(
            "No config file found in {} (expected {})",
            dir.display(),
            CONFIG_FILES.join(" or ")
        )
    })
}

fn find_config_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
