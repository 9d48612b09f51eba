//! Path resolution for aixconf
//!
//! # Environment Variables
//!
//! - `AIXCONF_CONFIG_DIR` - Override config directory
//! - `AIXCONF_MANIFEST` - Override the manifest file itself
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `AIXCONF_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/aixconf` (if set)
//! 3. `~/.config/aixconf`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "AIXCONF_CONFIG_DIR";

/// Environment variable for manifest file override
pub const ENV_MANIFEST: &str = "AIXCONF_MANIFEST";

/// Manifest file name inside the config directory
pub const MANIFEST_FILE: &str = "config.toml";

/// Get the aixconf config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
    )
}

fn resolve_config_dir(
    override_dir: Option<String>,
    xdg_config: Option<String>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Some(xdg_config) = xdg_config.filter(|x| !x.is_empty()) {
        let path = PathBuf::from(xdg_config).join("aixconf");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = home.context("Could not determine home directory")?;
    let path = home.join(".config").join("aixconf");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Resolve the manifest to load
///
/// Priority: `--file`, then `AIXCONF_MANIFEST`, then `config.toml` in the
/// config directory.
pub fn manifest(file: Option<&Path>) -> Result<PathBuf> {
    if let Some(file) = file {
        return Ok(expand(&file.to_string_lossy()));
    }
    if let Ok(file) = std::env::var(ENV_MANIFEST) {
        let path = expand(&file);
        log::debug!("Using manifest from {}: {}", ENV_MANIFEST, path.display());
        return Ok(path);
    }
    Ok(config_dir()?.join(MANIFEST_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
