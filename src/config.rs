//! Runtime configuration for webcapt.
//!
//! Values come from three layers: built-in defaults, environment variables
//! (after loading a `.env` file if one exists) and explicit overrides, which
//! the command line uses. Later layers win.

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;

use dotenvy::dotenv;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::request::{DEFAULT_HEIGHT, DEFAULT_MAX_WAIT, DEFAULT_MIN_WIDTH};

/// Verbosity level for webcapt logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Minimal,
    #[default]
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

/// Engine and capture defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct WebcaptConfig {
    pub chrome_executable: Option<PathBuf>,
    pub headless: bool,
    pub sandbox: bool,
    pub chrome_args: Vec<String>,
    pub user_data_dir: Option<PathBuf>,
    pub min_width: u32,
    pub default_height: u32,
    pub delay_ms: u64,
    /// Zero disables the timeout.
    pub max_wait_ms: u64,
    pub verbose: Verbosity,
}

impl Default for WebcaptConfig {
    fn default() -> Self {
        WebcaptConfig {
            chrome_executable: None,
            headless: true,
            sandbox: true,
            chrome_args: Vec::new(),
            user_data_dir: None,
            min_width: DEFAULT_MIN_WIDTH,
            default_height: DEFAULT_HEIGHT,
            delay_ms: 0,
            max_wait_ms: DEFAULT_MAX_WAIT.as_millis() as u64,
            verbose: Verbosity::default(),
        }
    }
}

impl WebcaptConfig {
    /// Construct a configuration by reading `WEBCAPT_*` environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = WebcaptConfig::default();

        if let Some(value) = env_var("WEBCAPT_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("WEBCAPT_HEADLESS") {
            config.headless = parse_bool("WEBCAPT_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_SANDBOX") {
            config.sandbox = parse_bool("WEBCAPT_SANDBOX", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_CHROME_ARGS") {
            config.chrome_args = parse_string_list("WEBCAPT_CHROME_ARGS", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_USER_DATA_DIR") {
            config.user_data_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = env_var("WEBCAPT_MIN_WIDTH") {
            config.min_width = parse_u32("WEBCAPT_MIN_WIDTH", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_DEFAULT_HEIGHT") {
            config.default_height = parse_u32("WEBCAPT_DEFAULT_HEIGHT", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_DELAY_MS") {
            config.delay_ms = parse_u64("WEBCAPT_DELAY_MS", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_MAX_WAIT_MS") {
            config.max_wait_ms = parse_u64("WEBCAPT_MAX_WAIT_MS", &value)?;
        }

        if let Some(value) = env_var("WEBCAPT_VERBOSE") {
            let parsed = parse_u8("WEBCAPT_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                ConfigError::InvalidEnumVariant {
                    field: "WEBCAPT_VERBOSE",
                    value: parsed.to_string(),
                }
            })?;
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: ConfigOverrides) -> WebcaptConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.sandbox {
            next.sandbox = value;
        }
        if let Some(value) = overrides.chrome_args {
            next.chrome_args = value;
        }
        if let Some(value) = overrides.user_data_dir {
            next.user_data_dir = value;
        }
        if let Some(value) = overrides.min_width {
            next.min_width = value;
        }
        if let Some(value) = overrides.default_height {
            next.default_height = value;
        }
        if let Some(value) = overrides.delay_ms {
            next.delay_ms = value;
        }
        if let Some(value) = overrides.max_wait_ms {
            next.max_wait_ms = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }

        next
    }
}

/// Field-level overrides for [`WebcaptConfig::with_overrides`].
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub chrome_executable: Option<Option<PathBuf>>,
    pub headless: Option<bool>,
    pub sandbox: Option<bool>,
    pub chrome_args: Option<Vec<String>>,
    pub user_data_dir: Option<Option<PathBuf>>,
    pub min_width: Option<u32>,
    pub default_height: Option<u32>,
    pub delay_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
    pub verbose: Option<Verbosity>,
}

impl ConfigOverrides {
    /// Builder-style helper to set the `chrome_executable` override.
    pub fn chrome_executable<T: Into<Option<PathBuf>>>(mut self, path: T) -> Self {
        self.chrome_executable = Some(path.into());
        self
    }

    /// Builder-style helper to set the `verbose` override.
    pub fn verbose(mut self, verbose: Verbosity) -> Self {
        self.verbose = Some(verbose);
        self
    }
}

/// Errors that can arise while constructing a [`WebcaptConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} must be a JSON array of strings")]
    InvalidJsonType { field: &'static str },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_string_list(field: &'static str, value: &str) -> Result<Vec<String>, ConfigError> {
    let parsed: JsonValue = serde_json::from_str(value)
        .map_err(|source| ConfigError::InvalidJson { field, source })?;
    match parsed {
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::String(arg) => Ok(arg),
                _ => Err(ConfigError::InvalidJsonType { field }),
            })
            .collect(),
        _ => Err(ConfigError::InvalidJsonType { field }),
    }
}
