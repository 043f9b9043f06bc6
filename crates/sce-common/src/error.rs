//! Unified error type for the sce workspace.
//!
//! Every failure is either a configuration error, fatal and reported before
//! the contained program runs, or a runtime error that is logged and tolerated.
//! [`SceError::class`] tells the two apart.

use std::path::PathBuf;

use thiserror::Error;

/// Severity class of an [`SceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal: printed to stderr and the process exits non-zero.
    Configuration,
    /// Non-fatal: logged, the supervised run continues.
    Runtime,
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SceError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The bridge interface is missing or carries no IPv4 address.
    #[error(
        "unable to find bridge interface {bridge} ({reason}); is it configured as a bridge with an IPv4 address on it?"
    )]
    Bridge {
        /// Name of the bridge that was looked up.
        bridge: String,
        /// Why the lookup failed.
        reason: String,
    },

    /// Random identity generation failed.
    #[error("unable to generate {what}: {message}")]
    Identity {
        /// Which identifier was being generated.
        what: &'static str,
        /// Underlying RNG failure.
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

    /// A permission or syscall error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A host tool (`ip`, `nsenter`) failed.
    #[error("{program} failed: {message}")]
    Command {
        /// Program that was invoked.
        program: String,
        /// Exit status or stderr of the invocation.
        message: String,
    },

    /// The contained process could not be launched.
    #[error("unable to launch container: {message}")]
    Start {
        /// Description of the launch failure.
        message: String,
    },

    /// A signal could not be relayed to the contained process.
    #[error("error sending signal {signal}: {message}")]
    Signal {
        /// Name of the signal.
        signal: String,
        /// Underlying failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl SceError {
    /// Returns whether this error aborts the run or is merely logged.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Signal { .. } => ErrorClass::Runtime,
            _ => ErrorClass::Configuration,
        }
    }

    /// Returns `true` for errors that must halt the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Configuration)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_errors_are_not_fatal() {
        let err = SceError::Signal {
            signal: "SIGINT".into(),
            message: "no such process".into(),
        };
        assert_eq!(err.class(), ErrorClass::Runtime);
        assert!(!err.is_fatal());
    }

    #[test]
    fn bridge_errors_are_configuration_errors() {
        let err = SceError::Bridge {
            bridge: "br0".into(),
            reason: "interface not found".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("br0"));
    }
}
