//! Layered harness configuration.
//!
//! # Responsibility
//! - Assemble one immutable `HarnessConfig` from defaults, an optional TOML
//!   file, environment variables and command-line overrides.
//! - Write the default configuration file for first-time setup.
//!
//! # Invariants
//! - Precedence increases: defaults < file < environment < overrides.
//! - The assembled value is validated once; callers pass it by reference.
//! - `write_default_config` never overwrites an existing file.

use crate::logging::{default_log_level, normalize_level};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name looked up in the home directory when no path is given.
pub const CONFIG_FILE_NAME: &str = ".dbtest.toml";
pub const ENV_SEC_DB: &str = "DBTEST_SEC_DB";
pub const ENV_APP_DB: &str = "DBTEST_APP_DB";
pub const ENV_LOG_LEVEL: &str = "DBTEST_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "DBTEST_LOG_DIR";

const DEFAULT_SEC_DB_PATH: &str = "dbtest-secdb.sqlite3";
const DEFAULT_APP_DB_PATH: &str = "dbtest-appdb.sqlite3";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
    AlreadyExists(PathBuf),
    InvalidValue { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "config io error at `{}`: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "invalid config file `{}`: {source}", path.display())
            }
            Self::Serialize(err) => write!(f, "failed to serialize config: {err}"),
            Self::AlreadyExists(path) => {
                write!(f, "config file `{}` already exists", path.display())
            }
            Self::InvalidValue { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
            Self::AlreadyExists(_) => None,
            Self::InvalidValue { .. } => None,
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// One of trace|debug|info|warn|error.
    pub level: String,
    /// Rotating log file directory; stderr when `None`.
    pub dir: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            dir: None,
        }
    }
}

/// Effective harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub sec_db_path: PathBuf,
    pub app_db_path: PathBuf,
    pub log: LogSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sec_db_path: PathBuf::from(DEFAULT_SEC_DB_PATH),
            app_db_path: PathBuf::from(DEFAULT_APP_DB_PATH),
            log: LogSettings::default(),
        }
    }
}

/// Command-line values; `None` keeps the lower layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub sec_db_path: Option<PathBuf>,
    pub app_db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Parses TOML text; missing fields take their defaults.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Applies `DBTEST_*` variables read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(value) = read(ENV_SEC_DB) {
            self.sec_db_path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_APP_DB) {
            self.app_db_path = PathBuf::from(value);
        }
        if let Some(value) = read(ENV_LOG_LEVEL) {
            self.log.level = value;
        }
        if let Some(value) = read(ENV_LOG_DIR) {
            self.log.dir = Some(PathBuf::from(value));
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.sec_db_path {
            self.sec_db_path = path.clone();
        }
        if let Some(path) = &overrides.app_db_path {
            self.app_db_path = path.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.log.level = level.clone();
        }
        if let Some(dir) = &overrides.log_dir {
            self.log.dir = Some(dir.clone());
        }
    }

    /// Normalizes the log level and rejects unusable paths.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.log.level = normalize_level(&self.log.level)
            .map_err(|err| ConfigError::InvalidValue {
                field: "log.level",
                message: err.to_string(),
            })?
            .to_string();
        if self.sec_db_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sec_db_path",
                message: "path cannot be empty".to_string(),
            });
        }
        if self.app_db_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "app_db_path",
                message: "path cannot be empty".to_string(),
            });
        }
        if self.sec_db_path == self.app_db_path {
            return Err(ConfigError::InvalidValue {
                field: "app_db_path",
                message: "secdb and appdb must use different files".to_string(),
            });
        }
        Ok(())
    }
}

/// `$HOME/.dbtest.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
}

/// Assembles the effective configuration from every layer.
///
/// An explicit `path` must exist; the home-directory file is optional.
pub fn load_config<F>(
    path: Option<&Path>,
    lookup_env: F,
    overrides: &ConfigOverrides,
) -> Result<HarnessConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => HarnessConfig::load_file(path)?,
        None => match default_config_path().filter(|candidate| candidate.is_file()) {
            Some(home_file) => HarnessConfig::load_file(&home_file)?,
            None => HarnessConfig::default(),
        },
    };
    config.apply_env(lookup_env);
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}

/// Writes the default configuration as TOML to `path`.
///
/// # Errors
/// - `AlreadyExists` when `path` exists; the file is left untouched.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let text = HarnessConfig::default().to_toml_string()?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                ConfigError::AlreadyExists(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
    file.write_all(text.as_bytes())
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}
