//! Error types used by the devicevisor runtime, its hardware backends and configuration.
//!
//! This module defines three enums:
//!
//! - [`HardwareError`]: failures raised by a [`Hardware`](crate::Hardware) backend.
//! - [`ConfigError`]: settings could not be loaded or failed validation.
//! - [`RuntimeError`]: errors raised by the orchestration runtime itself.
//!
//! All of them provide `as_label` for logs; hardware errors never leave a device
//! supervisor, they are converted into registry updates and events.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by hardware backends.
///
/// The supervisor does not distinguish between variants when deciding what to do;
/// every one of them drives the subsystem into `WAITING` and schedules a backoff.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HardwareError {
    /// Device is present but refused the stream/link request.
    #[error("device {target} rejected open request: {reason}")]
    Rejected {
        /// Target that was opened.
        target: String,
        /// Backend-specific detail.
        reason: String,
    },

    /// Nothing was found at the target (missing node, no serial ports).
    #[error("no device at {target}")]
    NotFound {
        /// Target that was looked up.
        target: String,
    },

    /// Hardware did not answer in time.
    #[error("device {target} timed out after {timeout:?}")]
    Timeout {
        /// Target that was queried.
        target: String,
        /// Time waited.
        timeout: Duration,
    },

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devicevisor::HardwareError;
    ///
    /// let err = HardwareError::NotFound { target: "/dev/video0".into() };
    /// assert_eq!(err.as_label(), "hardware_not_found");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HardwareError::Rejected { .. } => "hardware_rejected",
            HardwareError::NotFound { .. } => "hardware_not_found",
            HardwareError::Timeout { .. } => "hardware_timeout",
            HardwareError::Io(_) => "hardware_io",
        }
    }
}

/// # Errors produced while loading [`Settings`](crate::Settings).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Sources could not be read or deserialized.
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was read but is out of range.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Load(_) => "config_load",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by the devicevisor runtime.
///
/// These represent failures in the orchestration system itself,
/// such as a shutdown sequence exceeding its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some device supervisors were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Subsystems whose supervisors did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use devicevisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
