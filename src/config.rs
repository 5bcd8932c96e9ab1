//! Configuration module for the deimos orchestrator

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the connection engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of simultaneously tracked connections (slot pool size)
    pub max_connections: usize,

    /// Timeout for each connection attempt in milliseconds
    pub connect_timeout: u64,

    /// Extra file descriptors requested on top of max_connections when
    /// raising the process limit
    pub fd_headroom: u64,

    /// Capacity of the reactor's event buffer per poll call
    pub poll_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            connect_timeout: 5000,
            fd_headroom: 128,
            poll_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for the given connection count
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set the connect timeout in milliseconds
    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout = timeout_ms;
        self
    }

    /// Set the file descriptor headroom
    pub fn with_fd_headroom(mut self, headroom: u64) -> Self {
        self.fd_headroom = headroom;
        self
    }

    /// Set the reactor event buffer capacity
    pub fn with_poll_capacity(mut self, capacity: usize) -> Self {
        self.poll_capacity = capacity;
        self
    }

    /// Get the connect timeout as a Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            crate::OrchestratorError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            crate::OrchestratorError::ConfigError(format!("Failed to parse TOML: {}", e))
        })?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_connections == 0 {
            return Err(crate::OrchestratorError::ConfigError(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout == 0 {
            return Err(crate::OrchestratorError::ConfigError(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        if self.poll_capacity == 0 {
            return Err(crate::OrchestratorError::ConfigError(
                "poll_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
