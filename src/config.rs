//! Client configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `remote_camera.toml`)
//! 2. environment variables prefixed with `REMOTE_CAMERA_`, nested keys
//!    separated by a double underscore
//!
//! ```text
//! REMOTE_CAMERA_CAMERA__URI=10.0.0.12:9000/camera
//! REMOTE_CAMERA_LOGGING__LEVEL=debug
//! REMOTE_CAMERA_FOCUSING__COARSE__TIMEOUT=900
//! ```
//!
//! The camera client does not hold on to the whole configuration. It is
//! given a [`CameraSettings`] value and, optionally, a [`ConfigLookup`]
//! capability for the few values it resolves at call time (the autofocus
//! timeouts).
//!
//! # Example
//!
//! ```toml
//! [camera]
//! uri = "10.0.0.12:9000/camera"
//! name = "cam00"
//! readout_timeout = "10s"
//! readout_poll_interval = "100ms"
//!
//! [focusing.coarse]
//! timeout = 900.0
//!
//! [logging]
//! level = "debug"
//! ```

use crate::proxy::Endpoint;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "remote_camera.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "REMOTE_CAMERA_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Camera client settings
    #[serde(default)]
    pub camera: CameraSettings,
    /// Autofocus settings
    #[serde(default)]
    pub focusing: FocusingConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings consumed by [`crate::camera::RemoteCamera`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Remote camera endpoint, `host:port/object`
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Name reported until the remote name is fetched
    #[serde(default = "default_name")]
    pub name: String,
    /// Model reported until the remote model is fetched
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional port identifier of the physical camera
    #[serde(default)]
    pub port: Option<String>,
    /// Client-side margin added to exposure time plus readout time
    #[serde(default = "default_readout_timeout", with = "humantime_serde")]
    pub readout_timeout: Duration,
    /// Interval between `is_reading_out` polls
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub readout_poll_interval: Duration,
    /// TCP connect timeout for each remote call
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            name: default_name(),
            model: default_model(),
            port: None,
            readout_timeout: default_readout_timeout(),
            readout_poll_interval: default_poll_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Autofocus timeouts, in seconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FocusingConfig {
    /// Coarse focus settings
    #[serde(default)]
    pub coarse: FocusRunConfig,
    /// Fine focus settings
    #[serde(default)]
    pub fine: FocusRunConfig,
}

/// Settings for one kind of focus run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusRunConfig {
    /// Client-side completion timeout in seconds
    #[serde(default = "default_focus_timeout")]
    pub timeout: f64,
}

impl Default for FocusRunConfig {
    fn default() -> Self {
        Self {
            timeout: default_focus_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_uri() -> String {
    "127.0.0.1:9000/camera".to_string()
}

fn default_name() -> String {
    "Pyro Camera".to_string()
}

fn default_model() -> String {
    "pyro".to_string()
}

fn default_readout_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Fallback autofocus timeout in seconds.
pub const DEFAULT_FOCUS_TIMEOUT_SECS: f64 = 600.0;

fn default_focus_timeout() -> f64 {
    DEFAULT_FOCUS_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl ClientConfig {
    /// Build the figment for `path`: defaults, then the file, then `REMOTE_CAMERA_*`.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(ClientConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from [`DEFAULT_CONFIG_FILE`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(path))
    }

    /// Extract and validate from an already-built figment.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - The camera uri parses as an endpoint
    /// - The poll interval is non-zero
    /// - Focus timeouts are positive
    /// - Log level is valid (trace, debug, info, warn, error)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = self.camera.uri.parse::<Endpoint>() {
            return Err(ConfigError::ValidationError(e.to_string()));
        }

        if self.camera.readout_poll_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "camera.readout_poll_interval must be greater than zero".to_string(),
            ));
        }

        for (kind, run) in [("coarse", &self.focusing.coarse), ("fine", &self.focusing.fine)] {
            if !(run.timeout.is_finite() && run.timeout > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "focusing.{}.timeout must be a positive number of seconds, got {}",
                    kind, run.timeout
                )));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Config lookup capability
// ============================================================================

/// Key/value access to configuration, injected into the camera client.
pub trait ConfigLookup: Send + Sync {
    /// Look up a dotted key such as `focusing.coarse.timeout`.
    ///
    /// `Ok(None)` means the key is not set.
    fn get_config(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// [`ConfigLookup`] over a figment.
#[derive(Debug, Clone)]
pub struct FigmentLookup {
    figment: Figment,
}

impl FigmentLookup {
    /// Wrap a figment.
    pub fn new(figment: Figment) -> Self {
        Self { figment }
    }
}

impl ConfigLookup for FigmentLookup {
    fn get_config(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        if !self.figment.contains(key) {
            return Ok(None);
        }
        let value: Value = self.figment.extract_inner(key)?;
        Ok(Some(value))
    }
}
