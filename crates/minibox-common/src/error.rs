//! Unified error type for the minibox workspace.
//!
//! Variants follow the failure classes of a container run: setup and jail
//! failures are fatal, resource-control and supervision failures are
//! reported by the caller and the run continues.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MiniboxError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A launch request or configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Host-side preparation failed before any workload started.
    #[error("setup failed ({step}): {message}")]
    Setup {
        /// Setup step that failed.
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// One of the filesystem jail steps failed inside the container.
    #[error("jail construction failed ({step}): {message}")]
    Jail {
        /// Jail step that failed.
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A resource-control group operation failed.
    #[error("resource control failed ({control}) at {path}: {source}")]
    ResourceControl {
        /// Control file or group action that failed.
        control: String,
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Signalling or reaping the container process failed.
    #[error("supervision error: {message}")]
    Supervision {
        /// Description of the failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl MiniboxError {
    /// Returns whether this error must abort the run.
    ///
    /// Resource accounting and termination of an already-finished process
    /// are best-effort; everything else stops the launch.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::ResourceControl { .. } | Self::Supervision { .. } | Self::NotFound { .. }
        )
    }

    /// Builds a [`MiniboxError::ResourceControl`] for a control file.
    pub fn resource_control(
        control: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::ResourceControl {
            control: control.into(),
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MiniboxError>;
