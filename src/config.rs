//! Converter configuration.
//!
//! Settings come from a `calcsql.toml` file and can be overridden on the
//! command line. Lookup order: an explicit `--config` path, `./calcsql.toml`,
//! then `<config dir>/calcsql/config.toml`. With none present the defaults
//! below apply.
//!
//! ```toml
//! date_function = "TO_CHAR(CURRENT_DATE, 'YYYYMMDD')"
//! projection_alias = "J1"
//! strip_trailing_comma = false
//! extensions = ["xml", "calculationview"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConvertError, ConvertResult};

pub const CONFIG_FILE: &str = "calcsql.toml";
pub const DEFAULT_DATE_FUNCTION: &str = "TO_CHAR(CURRENT_DATE, 'YYYYMMDD')";
pub const DEFAULT_PROJECTION_ALIAS: &str = "J1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQL substituted for the `"today"` filter reference.
    pub date_function: String,
    /// Table alias used inside every projection block.
    pub projection_alias: String,
    /// Drop the comma after the last WITH block.
    pub strip_trailing_comma: bool,
    /// File extensions converted in directory mode, without the dot.
    pub extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            date_function: DEFAULT_DATE_FUNCTION.to_string(),
            projection_alias: DEFAULT_PROJECTION_ALIAS.to_string(),
            strip_trailing_comma: false,
            extensions: vec!["xml".to_string(), "calculationview".to_string()],
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> ConvertResult<Self> {
        toml::from_str(content).map_err(|e| ConvertError::Config(e.to_string()))
    }

    /// Load the configuration. An explicit path must exist; otherwise the
    /// first file found in the default locations is used.
    pub fn load(explicit: Option<&Path>) -> ConvertResult<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConvertError::PathNotFound(path.to_path_buf()));
            }
            return Self::from_file(path);
        }

        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> ConvertResult<Self> {
        debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("calcsql").join("config.toml"));
        }
        paths
    }

    /// Whether a file has one of the configured extensions (case-insensitive).
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Extensions formatted for messages: `.xml, .calculationview`.
    pub fn extension_list(&self) -> String {
        self.extensions
            .iter()
            .map(|e| format!(".{}", e.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
