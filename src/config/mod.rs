pub mod schema;

pub use schema::{LifecyclePolicy, ScoringConfig, VettingConfig};

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{ConfigError, Result};

/// Load the vetting policy.
///
/// With an explicit path the file must exist and parse. Without one, the
/// per-user config file is used when present, otherwise stock defaults.
pub fn load(path: Option<&Path>) -> Result<VettingConfig> {
    let config = match path {
        Some(explicit) => read_config_file(explicit)?,
        None => match default_config_path() {
            Some(candidate) if candidate.is_file() => read_config_file(&candidate)?,
            _ => VettingConfig::default(),
        },
    };
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<VettingConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    let config = toml::from_str(&raw)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    Ok(config)
}

/// `~/.config/skillvet/config.toml` (or the platform equivalent).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "skillvet").map(|dirs| dirs.config_dir().join("config.toml"))
}
