//! Unified error types for the beaconwatch core library.
//!
//! This module provides a unified error type [`BeaconError`] that covers the
//! failure modes of the engine. Module-specific errors ([`ConfigError`],
//! [`MapError`]) are used internally and convert into [`BeaconError`].
//!
//! Most runtime conditions the engine meets while scanning (a spurious zero
//! RSSI, an unknown beacon, a duplicate start) are *not* errors: they are
//! dropped or reported as a [`ScanStatus`](crate::types::ScanStatus) with a
//! warning in the log. [`BeaconError`] is reserved for operations that really
//! failed, such as a backend that refused to bind or a config file that does
//! not parse.
//!
//! # Example
//!
//! ```rust
//! use beaconwatch_core::error::{BeaconError, Result};
//!
//! fn require_network(network_id: Option<u64>) -> Result<u64> {
//!     network_id.ok_or(BeaconError::MissingNetworkId)
//! }
//!
//! assert!(require_network(None).is_err());
//! ```
//!
//! [`ConfigError`]: crate::config::ConfigError
//! [`MapError`]: crate::mapper::MapError

use std::path::PathBuf;
use thiserror::Error;

use crate::scanner::ScannerState;

/// The unified error type for all beaconwatch operations.
#[derive(Debug, Error)]
pub enum BeaconError {
    // =========================================================================
    // HARDWARE / BACKEND ERRORS
    // =========================================================================
    /// The radio hardware is absent or cannot do Bluetooth Low Energy.
    #[error("Scan not started because BLE is not supported")]
    BleUnsupported,

    /// The radio is present but switched off.
    #[error("Scan not started because BLE is not enabled")]
    BleDisabled,

    /// The requested scanning backend was not compiled into this build.
    #[error("Scan backend '{0}' is not available in this build")]
    BackendUnavailable(String),

    /// The backend refused or failed to bind its scanning service.
    #[error("Failed to bind the scanning service: {0}")]
    BindFailed(String),

    /// The backend reported a failure while monitoring or ranging.
    #[error("Scan backend failure: {0}")]
    BackendFailure(String),

    // =========================================================================
    // LIFECYCLE ERRORS
    // =========================================================================
    /// No network identifier was supplied, so there is nothing to scan for.
    #[error("Network identifier is undefined; scanner not initialized")]
    MissingNetworkId,

    /// Runtime location permission was not granted.
    #[error("Location permission was not granted")]
    PermissionDenied,

    /// An operation was attempted in a lifecycle state that does not allow it.
    #[error("Operation '{operation}' is not allowed while the scanner is {state}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// The state the scanner was in.
        state: ScannerState,
    },

    /// The scanner was stopped while an asynchronous step was in flight.
    #[error("Scanner was stopped before '{0}' completed")]
    Cancelled(&'static str),

    /// A named scan behaviour profile does not exist.
    #[error("Unknown scan behavior '{0}'. Only 'proactive' or 'aggressive' are applicable.")]
    UnknownBehavior(String),

    // =========================================================================
    // REFERENCE DATA ERRORS
    // =========================================================================
    /// A raw backend event could not be mapped to a signal.
    #[error("Failed to map backend event: {0}")]
    Mapping(#[from] crate::mapper::MapError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// An error occurred while persisting or reading data.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Stored data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beaconwatch operations.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Returns `true` if this error comes from the radio hardware or a backend.
    #[inline]
    #[must_use]
    pub const fn is_hardware_error(&self) -> bool {
        matches!(
            self,
            Self::BleUnsupported
                | Self::BleDisabled
                | Self::BackendUnavailable(_)
                | Self::BindFailed(_)
                | Self::BackendFailure(_)
        )
    }

    /// Returns `true` if this error concerns the scanner lifecycle.
    #[inline]
    #[must_use]
    pub const fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::MissingNetworkId
                | Self::PermissionDenied
                | Self::InvalidState { .. }
                | Self::Cancelled(_)
                | Self::UnknownBehavior(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::PersistenceError(_) | Self::Serialization(_) | Self::IoError(_)
        )
    }

    /// Returns `true` if retrying later may succeed without user intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BindFailed(_) | Self::BackendFailure(_) | Self::Cancelled(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::MissingNetworkId | Self::UnknownBehavior(_) | Self::Mapping(_) => 400,

            // 403 Forbidden - the platform refused
            Self::PermissionDenied => 403,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 409 Conflict - not allowed in the current state
            Self::InvalidState { .. } | Self::Cancelled(_) => 409,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::PersistenceError(_) | Self::Serialization(_) | Self::IoError(_) => 500,

            // 503 Service Unavailable - radio hardware issues
            Self::BleUnsupported
            | Self::BleDisabled
            | Self::BackendUnavailable(_)
            | Self::BindFailed(_)
            | Self::BackendFailure(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BleUnsupported => "BLE_UNSUPPORTED",
            Self::BleDisabled => "BLE_DISABLED",
            Self::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            Self::BindFailed(_) => "BIND_FAILED",
            Self::BackendFailure(_) => "BACKEND_FAILURE",
            Self::MissingNetworkId => "MISSING_NETWORK_ID",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Cancelled(_) => "CANCELLED",
            Self::UnknownBehavior(_) => "UNKNOWN_BEHAVIOR",
            Self::Mapping(_) => "MAPPING_FAILED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for BeaconError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {source}", path.display()))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {source}", path.display()))
            }
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
