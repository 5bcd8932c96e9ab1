//! Aggregate connection outcome statistics

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Monotonically increasing outcome counters.
///
/// `successful + failed + timed_out <= total_attempts`, with equality once
/// every in-flight connection has resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    /// Connections committed by `start_connection`
    pub total_attempts: u64,

    /// Completed TCP handshakes
    pub successful: u64,

    /// Connections that ended with a socket error or hangup
    pub failed: u64,

    /// Connections reclaimed after exceeding the connect timeout
    pub timed_out: u64,
}

impl EngineStats {
    /// Number of attempts that have reached a terminal state
    pub fn resolved(&self) -> u64 {
        self.successful + self.failed + self.timed_out
    }
}

/// Per-source-address utilization at snapshot time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub addr: Ipv4Addr,
    pub active: usize,
    pub capacity: usize,
}

/// Read-only view of the orchestrator state, queryable on demand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub stats: EngineStats,

    /// Connections currently occupying slots
    pub active_connections: usize,

    pub sources: Vec<SourceStats>,
}

impl Snapshot {
    /// Sum of active counts across all source addresses. Always equal to
    /// `active_connections` while the engine invariants hold.
    pub fn total_source_load(&self) -> usize {
        self.sources.iter().map(|s| s.active).sum()
    }
}
