//! Construction-time configuration
//!
//! Loads a [`StorageConfig`] (device capacities, initial component placement
//! and engine tuning) from TOML, JSON or YAML.
//!
//! ## Features
//!
//! - Auto-detection of format from file extension
//! - Environment variable substitution (`${VAR}` and `$VAR` syntax)
//! - Environment overrides with a prefix and `__` nesting separator
//! - Validation of the construction contract via [`StorageConfig::validate`]

mod storage;
pub use storage::{ComponentSpec, DeviceSpec, EngineTuning, StorageConfig};

use config::{Config as Cfg, Environment, File};
pub use config::FileFormat;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::OnceLock;

use crate::ids::{ComponentId, DeviceId};

/// Configuration loading and construction-contract errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage system has no devices")]
    EmptySystem,

    #[error("Device {0} has non-positive capacity")]
    InvalidCapacity(DeviceId),

    #[error("Device {0} is declared more than once")]
    DuplicateDevice(DeviceId),

    #[error("Component {0} is placed more than once")]
    DuplicateComponent(ComponentId),

    #[error("Component {component} is placed on unknown device {device}")]
    UnknownDevice {
        component: ComponentId,
        device: DeviceId,
    },

    #[error("Initial placement of {placed} components exceeds capacity {capacity} of {device}")]
    CapacityExceeded {
        device: DeviceId,
        capacity: usize,
        placed: usize,
    },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for config operations.
///
/// Equivalent to `Result<T, error_stack::Report<ConfigError>>`.
pub type ConfigResult<T> = Result<T, error_stack::Report<ConfigError>>;

/// Detect configuration format from file extension
///
/// # Supported Extensions
///
/// - YAML: `.yaml`, `.yml`
/// - TOML: `.toml`
/// - JSON: `.json`
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string()).into()),
    }
}

fn braced_var() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

fn simple_var() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex"))
}

/// Substitute environment variables in a string
///
/// Supports both `${VAR_NAME}` and `$VAR_NAME`. Unset variables are left as
/// written.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = braced_var().replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    simple_var()
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

fn build<T>(builder: config::ConfigBuilder<config::builder::DefaultState>) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let config = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()).into())
}

/// Load configuration from a file
///
/// Detects the format from the file extension and performs environment
/// variable substitution on the loaded content.
///
/// ```rust,ignore
/// use stowage_kernel::config::{load_config, StorageConfig};
///
/// let config: StorageConfig = load_config("storage.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    let substituted = substitute_env_vars(&content);
    tracing::debug!(path, ?format, "loading configuration");

    build(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted = substitute_env_vars(content);
    build(Cfg::builder().add_source(File::from_str(&substituted, format)))
}

/// Load configuration with environment variable overrides
///
/// Environment variables are prefixed with `env_prefix` and use `__` for
/// nesting, e.g. `STOWAGE_TUNING__STARVATION_WARN_THRESHOLD=4`.
pub fn load_with_env<T>(path: &str, env_prefix: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    let substituted = substitute_env_vars(&content);
    tracing::debug!(path, ?format, env_prefix, "loading configuration with env overrides");

    build(
        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            ),
    )
}
