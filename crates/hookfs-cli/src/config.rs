//! CLI configuration.
//!
//! Loaded from `--config <file>` or `~/.config/hookfs/config.toml`. A
//! missing file means defaults; a file that exists but does not parse is
//! an error.
//!
//! ```toml
//! cwd = "/mem"
//! preload = ["~/.config/hookfs/memfs.rhai"]
//!
//! [engine]
//! max_operations = 1000000
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hookfs_rhai::EngineLimits;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HookfsConfig {
    /// Initial working directory of the interpreter.
    pub cwd: Option<String>,
    pub engine: EngineLimits,
    /// Scripts evaluated before any file named on the command line.
    pub preload: Vec<PathBuf>,
}

/// Default config file location (`~/.config/hookfs/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hookfs").join("config.toml"))
}

impl HookfsConfig {
    /// Load from `path`, or the default location when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.preload = config.preload.into_iter().map(expand_home).collect();
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}
