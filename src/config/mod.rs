pub mod model;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub use model::{resolve_profile, Config, ServerProfile, TimeoutConfig};

/// Candidate config locations, in order: `~/.config/xget/config.toml`, then
/// `./xget.toml`.
fn default_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("xget").join("config.toml"));
    }
    paths.push(PathBuf::from("xget.toml"));
    paths
}

/// Load configuration.
///
/// An explicitly given path must exist; the default locations are optional
/// and fall back to built-in defaults when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => default_paths().into_iter().find(|p| p.exists()),
    };

    let Some(path) = path else {
        return Ok(Config::default());
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}
