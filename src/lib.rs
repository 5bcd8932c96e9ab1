//! Deimos - scalable outbound TCP connection orchestration
//!
//! Establishes tens of thousands of concurrent non-blocking connections,
//! spread across several locally bound source addresses, driven by a
//! single-threaded event reactor with timeout reclamation and aggregate
//! outcome statistics.

pub mod config;
pub mod engine;
pub mod error;
pub mod limits;
pub mod stats;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{ConnectionState, Credential, Orchestrator, ProtocolPhase, MAX_SOURCE_ADDRS};
pub use error::OrchestratorError;
pub use stats::{EngineStats, Snapshot, SourceStats};

pub type Result<T> = std::result::Result<T, OrchestratorError>;
