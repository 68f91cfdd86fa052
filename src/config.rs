//! Configuration file parser for `config.toml` in the feeder config directory.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`. Unknown keys are accepted and logged as warnings so
//! typos do not go unnoticed. Command-line flags override file values.
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name used under the XDG config and data homes.
pub const APP_DIR: &str = "feeder";

/// File name of the config file inside [`config_dir`].
pub const CONFIG_FILE: &str = "config.toml";

const KNOWN_KEYS: [&str; 5] = [
    "db_dir",
    "db_file",
    "max_items",
    "request_timeout_secs",
    "verbose",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Neither the XDG variable nor `HOME` is set.
    #[error("Cannot locate the {0} directory: set HOME or {1}")]
    NoHome(&'static str, &'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Values read from `config.toml`.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database. `None` means [`data_dir`].
    pub db_dir: Option<PathBuf>,

    /// Database file name inside `db_dir`.
    pub db_file: String,

    /// Candidate cap per fetch and number of items kept per feed by trim.
    pub max_items: u32,

    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// Log debug events from feeder.
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: None,
            db_file: "feeder.db".to_string(),
            max_items: 100,
            request_timeout_secs: 30,
            verbose: false,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(path = %path.display(), max_items = config.max_items, "Loaded configuration");
        Ok(config)
    }

    /// Full path of the database file.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        let dir = match &self.db_dir {
            Some(dir) => dir.clone(),
            None => data_dir()?,
        };
        Ok(dir.join(&self.db_file))
    }
}

/// `$XDG_CONFIG_HOME/feeder`, else `$HOME/.config/feeder`.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    app_dir(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
        ".config",
    )
    .ok_or(ConfigError::NoHome("config", "XDG_CONFIG_HOME"))
}

/// `$XDG_DATA_HOME/feeder`, else `$HOME/.local/share/feeder`.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    app_dir(
        std::env::var_os("XDG_DATA_HOME"),
        std::env::var_os("HOME"),
        ".local/share",
    )
    .ok_or(ConfigError::NoHome("data", "XDG_DATA_HOME"))
}

/// XDG base directories must be absolute; relative values are ignored.
fn app_dir(xdg: Option<OsString>, home: Option<OsString>, home_suffix: &str) -> Option<PathBuf> {
    let xdg = xdg.map(PathBuf::from).filter(|p| p.is_absolute());
    let base = match xdg {
        Some(base) => base,
        None => PathBuf::from(home.filter(|h| !h.is_empty())?).join(home_suffix),
    };
    Some(base.join(APP_DIR))
}

// ============================================================================
// Tests
// ============================================================================
