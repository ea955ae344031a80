//! Error types for the remote camera client.
//!
//! Two layers of error are defined here using the `thiserror` crate:
//!
//! - **`ConnectionError`**: anything that goes wrong on a single remote round
//!   trip. The transport could not reach the camera host, the request or the
//!   reply could not be (de)serialized, or the remote object raised an
//!   exception. These are never retried by the client.
//! - **`CameraError`**: the error returned by every `RemoteCamera` operation.
//!   It wraps `ConnectionError` via `#[from]` and adds the client-side failure
//!   modes: readout timeout, focus-wait timeout, missing sub-device, use
//!   before connection and type coercion failures.
//!
//! A camera host answering `get_uid()` with an empty identity is not an
//! error; see [`crate::camera::ConnectOutcome`].
//!
//! Both enums are `Clone` so a settled readout outcome can be handed to any
//! number of waiters.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results returned by camera operations.
pub type CameraResult<T> = std::result::Result<T, CameraError>;

/// Failure of a single remote call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Camera host {endpoint} unreachable: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("Serialization failure talking to {endpoint}: {reason}")]
    Serialization { endpoint: String, reason: String },

    #[error("Remote exception from {endpoint} ({kind}): {message}")]
    Remote {
        endpoint: String,
        kind: String,
        message: String,
    },
}

impl ConnectionError {
    /// Endpoint the failed call was addressed to.
    pub fn endpoint(&self) -> &str {
        match self {
            ConnectionError::Unreachable { endpoint, .. }
            | ConnectionError::Serialization { endpoint, .. }
            | ConnectionError::Remote { endpoint, .. } => endpoint,
        }
    }
}

/// Errors returned by [`crate::camera::RemoteCamera`] and its sub-devices.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Camera {camera} is not connected to {endpoint}")]
    NotConnected { camera: String, endpoint: String },

    #[error(
        "Timeout of {:.3}s reached while waiting for readout to finish on camera client {camera} ({endpoint})",
        .timeout.as_secs_f64()
    )]
    ReadoutTimeout {
        camera: String,
        endpoint: String,
        timeout: Duration,
    },

    #[error("Readout wait task for camera {camera} ended without reporting an outcome")]
    ReadoutAborted { camera: String },

    #[error("Camera {camera} on {endpoint} has no {capability}")]
    Capability {
        camera: String,
        endpoint: String,
        capability: &'static str,
    },

    #[error(
        "Autofocus on camera {camera} ({endpoint}) did not signal completion within {:.3}s",
        .timeout.as_secs_f64()
    )]
    FocusWaitTimeout {
        camera: String,
        endpoint: String,
        timeout: Duration,
    },

    #[error("Remote property '{property}' is not a {expected}: {value}")]
    UnexpectedType {
        property: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid camera endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CameraError {
    /// True for the two client-side wait timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CameraError::ReadoutTimeout { .. } | CameraError::FocusWaitTimeout { .. }
        )
    }
}
