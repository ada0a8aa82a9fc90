//! Engine configuration.
//!
//! The configuration document is owned by the control panel and is read
//! once per engine run. It is normally JSON, but a `.toml` file with the
//! same keys is accepted as well.
//!
//! # Configuration File Format
//!
//! ```json
//! {
//!   "file_types": { "Images": [".jpg", ".png"], "Documents": [".pdf"] },
//!   "folder_paths": { "Images": "Pictures", "Documents": "Docs" },
//!   "monitored_folders": [
//!     { "path": "Downloads", "name": "Downloads", "enabled": true, "use_home_path": true }
//!   ],
//!   "engine": {
//!     "stability_wait_secs": 2.0,
//!     "retry_delay_secs": 2.0,
//!     "ignore_patterns": ["~$*"]
//!   }
//! }
//! ```
//!
//! `file_types` and `folder_paths` fall back to a built-in table when
//! omitted; the `engine` section and every key inside it is optional.

use crate::file_category::{CategoryTable, standard_file_types, standard_folder_paths};
use glob::Pattern;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the history document placed in the home directory.
pub const DEFAULT_HISTORY_FILE: &str = "FileOrganizer_history.json";

/// File name of the log file placed in the home directory.
pub const DEFAULT_LOG_FILE: &str = "FileOrganizer.log";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// No configuration file was given and none was found in the default locations.
    #[error("no configuration file found (searched {})", .searched.join(", "))]
    NoConfig { searched: Vec<String> },
    /// Invalid JSON or TOML syntax or structure.
    #[error("invalid configuration in {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },
    /// Invalid glob pattern in `engine.ignore_patterns`.
    #[error("invalid ignore pattern '{pattern}': {reason}")]
    InvalidGlobPattern { pattern: String, reason: String },
    /// A duration setting is negative or not finite.
    #[error("invalid value for {key}: {value}")]
    InvalidDuration { key: &'static str, value: f64 },
    /// The home directory is needed but could not be determined.
    #[error("could not determine the home directory")]
    NoHomeDirectory,
    /// IO error while reading configuration.
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The configuration document as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Category name → extensions, in declaration order.
    #[serde(default = "standard_file_types")]
    pub file_types: IndexMap<String, Vec<String>>,

    /// Category name → destination subfolder name.
    #[serde(default = "standard_folder_paths")]
    pub folder_paths: IndexMap<String, String>,

    /// Directories the engine watches.
    #[serde(default)]
    pub monitored_folders: Vec<MonitoredFolder>,

    /// Engine tuning knobs.
    #[serde(default)]
    pub engine: EngineSettings,
}

/// A directory the engine watches for new files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredFolder {
    /// Absolute path, or a path relative to the home directory when
    /// `use_home_path` is set.
    pub path: String,

    /// Display label. Defaults to the path.
    #[serde(default)]
    pub name: Option<String>,

    /// Disabled folders are never watched.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Resolve `path` relative to the home directory.
    #[serde(default)]
    pub use_home_path: bool,
}

fn default_true() -> bool {
    true
}

impl MonitoredFolder {
    /// Display label for logs.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }

    /// Resolves the folder to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoHomeDirectory` when `use_home_path` is set and
    /// the home directory cannot be determined.
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        if self.use_home_path {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
            Ok(home.join(&self.path))
        } else {
            Ok(PathBuf::from(&self.path))
        }
    }
}

/// Optional `engine` section of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Seconds between the two size reads of a stability check.
    pub stability_wait_secs: f64,
    /// Seconds to sleep after a failed stability check before retrying.
    pub retry_delay_secs: f64,
    /// Extra glob patterns, matched against the file name, for files that
    /// are never processed.
    pub ignore_patterns: Vec<String>,
    /// Location of the history document.
    pub history_file: Option<PathBuf>,
    /// Location of the log file.
    pub log_file: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stability_wait_secs: 2.0,
            retry_delay_secs: 2.0,
            ignore_patterns: Vec::new(),
            history_file: None,
            log_file: None,
        }
    }
}

impl EngineSettings {
    /// Interval between the two size reads of a stability check.
    pub fn stability_wait(&self) -> Result<Duration, ConfigError> {
        to_duration("stability_wait_secs", self.stability_wait_secs)
    }

    /// Sleep between failed stability checks.
    pub fn retry_delay(&self) -> Result<Duration, ConfigError> {
        to_duration("retry_delay_secs", self.retry_delay_secs)
    }

    /// Compiles `ignore_patterns`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidGlobPattern` for the first pattern that
    /// does not parse.
    pub fn compile_ignore_patterns(&self) -> Result<IgnoreRules, ConfigError> {
        let patterns = self
            .ignore_patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlobPattern {
                    pattern: pattern.clone(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IgnoreRules { patterns })
    }

    /// History document location, defaulting to the home directory.
    pub fn history_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.history_file {
            Some(path) => Ok(path.clone()),
            None => home_file(DEFAULT_HISTORY_FILE),
        }
    }

    /// Log file location, defaulting to the home directory.
    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.log_file {
            Some(path) => Ok(path.clone()),
            None => home_file(DEFAULT_LOG_FILE),
        }
    }
}

fn to_duration(key: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidDuration { key, value })
}

fn home_file(name: &str) -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(name))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Compiled `ignore_patterns`.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    /// Returns true if the file name matches any ignore pattern.
    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(file_name))
    }
}

impl EngineConfig {
    /// Load configuration from a file, or from the default locations.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. `config.json` then `config.toml` in the current directory
    /// 3. `~/.config/tidywatch/config.json`
    ///
    /// Unlike a missing optional setting, a missing configuration document
    /// is an error: the engine has nothing to watch without one.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let candidates = Self::default_locations();
        for candidate in &candidates {
            if candidate.exists() {
                return Self::load_from_file(candidate);
            }
        }

        Err(ConfigError::NoConfig {
            searched: candidates
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        })
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from("config.json"), PathBuf::from("config.toml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(
                home
                    .join(".config")
                    .join("tidywatch")
                    .join("config.json"),
            );
        }
        candidates
    }

    /// Load configuration from a specific file.
    ///
    /// The format is chosen by extension: `.toml` files are parsed as TOML,
    /// anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigNotFound` if file does not exist.
    /// Returns `ConfigError::ConfigInvalid` if parsing fails.
    /// Returns `ConfigError::Io` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        };

        parsed.map_err(|reason| ConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Parses a TOML configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Builds the classification table from `file_types` and `folder_paths`.
    pub fn category_table(&self) -> CategoryTable {
        CategoryTable::new(&self.file_types, &self.folder_paths)
    }

    /// Monitored folders with `enabled` set.
    pub fn enabled_folders(&self) -> impl Iterator<Item = &MonitoredFolder> {
        self.monitored_folders.iter().filter(|folder| folder.enabled)
    }
}
