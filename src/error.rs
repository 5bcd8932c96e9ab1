//! Error handling for the deimos orchestrator
//!
//! Pre-flight connection errors are returned synchronously from
//! `start_connection` and commit no state; in-flight outcomes (failures,
//! timeouts) are only visible through the stats snapshot.

use std::io;
use thiserror::Error;

/// Main error type for orchestration operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Every registered source address is saturated, or none are registered.
    #[error("No source address capacity available")]
    NoCapacity,

    /// Every connection slot is occupied.
    #[error("Connection slot pool exhausted")]
    PoolExhausted,

    #[error("Socket creation failed: {0}")]
    SocketCreateFailed(#[source] io::Error),

    #[error("Bind to source address failed: {0}")]
    BindFailed(#[source] io::Error),

    #[error("Connect initiation failed: {0}")]
    ConnectFailed(#[source] io::Error),

    #[error("Reactor registration failed: {0}")]
    RegistrationFailed(#[source] io::Error),

    /// The source address registry is full.
    #[error("Source address registry full (max {max})")]
    CapacityExceeded { max: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A fault in the poll call itself, distinct from per-connection errors.
    #[error("Reactor error: {0}")]
    ReactorError(#[source] io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl OrchestratorError {
    /// Pre-flight errors are synchronous, commit no state, and are locally
    /// recoverable by retrying later or against a different target.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::NoCapacity
                | Self::PoolExhausted
                | Self::SocketCreateFailed(_)
                | Self::BindFailed(_)
                | Self::ConnectFailed(_)
                | Self::RegistrationFailed(_)
        )
    }
}

impl From<std::net::AddrParseError> for OrchestratorError {
    fn from(e: std::net::AddrParseError) -> Self {
        OrchestratorError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_classification() {
        assert!(OrchestratorError::NoCapacity.is_preflight());
        assert!(OrchestratorError::PoolExhausted.is_preflight());
        assert!(!OrchestratorError::ConfigError("bad".to_string()).is_preflight());
        assert!(!OrchestratorError::CapacityExceeded { max: 16 }.is_preflight());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "boom");
        let err: OrchestratorError = io_err.into();
        assert!(matches!(err, OrchestratorError::IoError(_)));
    }
}
