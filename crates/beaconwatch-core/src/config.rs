//! Application configuration management.
//!
//! Handles loading, saving, and validating beaconwatch configuration:
//! - Scanner backend, network and behaviour profile
//! - Geofence radius
//! - Notification buffering
//! - Data directory and audit identity
//! - HTTP bind address
//!
//! Configuration is read from a TOML file and layered with environment
//! overrides of the form `BEACONWATCH__SECTION__KEY`, e.g.
//! `BEACONWATCH__SCANNER__NETWORK_ID=42`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geofence::DEFAULT_RADIUS_M;
use crate::notify::DEFAULT_CAPACITY;
use crate::scanner::{BackendKind, ScanBehavior, ScannerOptions};
use crate::types::NetworkId;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "BEACONWATCH";

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// One field holds an invalid value.
    #[error("invalid {field}: {message}")]
    ValidationError {
        /// Dotted field name.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanner settings.
    pub scanner: ScannerConfig,
    /// Geofence settings.
    pub geofence: GeofenceConfig,
    /// Notification settings.
    pub notifications: NotificationConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Audit identity.
    pub audit: AuditConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

/// `[scanner]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Network to scan for when auto-starting.
    pub network_id: Option<NetworkId>,
    /// Scanning backend.
    pub backend: BackendKind,
    /// Behaviour profile applied on start.
    pub behavior: Option<ScanBehavior>,
    /// The process was launched by a geofence event.
    pub launched_by_geofence: bool,
    /// Start scanning `network_id` at boot.
    pub auto_start: bool,
    /// Capacity of the raw event channel.
    pub event_buffer: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            network_id: None,
            backend: BackendKind::default(),
            behavior: None,
            launched_by_geofence: false,
            auto_start: false,
            event_buffer: 256,
        }
    }
}

/// `[geofence]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    /// Radius of geofence regions in meters.
    pub radius_m: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            radius_m: DEFAULT_RADIUS_M,
        }
    }
}

/// `[notifications]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Buffered notifications per subscriber.
    pub capacity: usize,
    /// Recent notifications kept by the server.
    pub history: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            history: 100,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override of the data directory.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured data directory, or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if no default data directory can be determined.
    pub fn resolve_data_dir(&self) -> crate::error::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::storage::default_data_dir(),
        }
    }
}

/// `[audit]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Identifier of this installation in uploaded audit batches.
    pub instance_ref: String,
    /// Identifier of this device in uploaded audit batches.
    pub device_id: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            instance_ref: uuid::Uuid::new_v4().to_string(),
            device_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Production logging (JSON file plus compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
            production: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, layered with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file does not exist, a load
    /// error if it does not parse, or the validation errors.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::build(Some(path))
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    /// (still layered with environment overrides).
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file does not parse or validate.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::build(Some(path))
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
            Self::build(None)
        }
    }

    fn build(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path` as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field and report all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        check(
            self.scanner.event_buffer > 0,
            "scanner.event_buffer",
            "must be greater than zero",
        );
        check(
            self.geofence.radius_m.is_finite() && self.geofence.radius_m > 0.0,
            "geofence.radius_m",
            "must be a positive number of meters",
        );
        check(
            self.notifications.capacity > 0,
            "notifications.capacity",
            "must be greater than zero",
        );
        check(
            self.notifications.history > 0,
            "notifications.history",
            "must be greater than zero",
        );
        check(
            !self.audit.instance_ref.trim().is_empty(),
            "audit.instance_ref",
            "must not be empty",
        );
        check(
            self.server.bind.parse::<SocketAddr>().is_ok(),
            "server.bind",
            "must be an address like 0.0.0.0:3000",
        );
        check(
            !(self.scanner.auto_start && self.scanner.network_id.is_none()),
            "scanner.network_id",
            "is required when scanner.auto_start is set",
        );

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Scanner options derived from this configuration.
    #[must_use]
    pub fn scanner_options(&self) -> ScannerOptions {
        ScannerOptions {
            launched_by_geofence: self.scanner.launched_by_geofence,
            geofence_radius_m: self.geofence.radius_m,
            event_buffer: self.scanner.event_buffer,
        }
    }
}

/// Default configuration file path.
///
/// On Linux: `/etc/beaconwatch/config.toml`
/// Elsewhere: the platform config directory, e.g. `~/.config/beaconwatch/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/beaconwatch/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "beaconwatch").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}
