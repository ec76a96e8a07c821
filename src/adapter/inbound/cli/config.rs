//! Config file resolution for CLI commands.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::infrastructure::config::Config;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => write!(f, "built-in defaults"),
        }
    }
}

/// Load the configuration for a command.
///
/// An explicit path must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
/// loaded if present and defaults are used otherwise.
#[allow(clippy::result_large_err)]
pub fn load(path: Option<&Path>) -> Result<(Config, ConfigSource)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !default.exists() {
                return Ok((Config::default(), ConfigSource::Defaults));
            }
            default
        }
    };
    let config = Config::load(&path)?;
    Ok((config, ConfigSource::File(path)))
}
