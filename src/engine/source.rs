//! Source address pool
//!
//! Each locally bound address owns an independent ephemeral-port range, so
//! spreading outbound connections across N addresses multiplies the usable
//! port space by N. Selection always picks the least-loaded address with
//! spare capacity.

use crate::error::OrchestratorError;
use log::debug;
use std::net::Ipv4Addr;

/// Maximum number of distinct source addresses the registry holds
pub const MAX_SOURCE_ADDRS: usize = 16;

/// A local address with an independent capacity cap
#[derive(Debug, Clone)]
pub struct SourceAddress {
    pub addr: Ipv4Addr,
    active: usize,
    capacity: usize,
}

impl SourceAddress {
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn has_spare(&self) -> bool {
        self.active < self.capacity
    }
}

/// Registry of source addresses with least-loaded selection
#[derive(Debug, Default)]
pub struct SourcePool {
    addrs: Vec<SourceAddress>,
}

impl SourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source address with a fixed capacity. Fails once the
    /// registry holds `MAX_SOURCE_ADDRS` entries.
    pub fn register(&mut self, addr: Ipv4Addr, capacity: usize) -> crate::Result<()> {
        if self.addrs.len() >= MAX_SOURCE_ADDRS {
            return Err(OrchestratorError::CapacityExceeded {
                max: MAX_SOURCE_ADDRS,
            });
        }

        debug!("Registered source address {} (capacity {})", addr, capacity);
        self.addrs.push(SourceAddress {
            addr,
            active: 0,
            capacity,
        });
        Ok(())
    }

    /// Index of the registered address with spare capacity and the smallest
    /// active count. Ties break toward the earliest registration: the scan
    /// runs in registration order and only a strictly smaller load replaces
    /// the current pick.
    pub fn select_least_loaded(&self) -> crate::Result<usize> {
        let mut best: Option<usize> = None;

        for (idx, src) in self.addrs.iter().enumerate() {
            if !src.has_spare() {
                continue;
            }
            match best {
                Some(b) if self.addrs[b].active <= src.active => {}
                _ => best = Some(idx),
            }
        }

        best.ok_or(OrchestratorError::NoCapacity)
    }

    /// Record a connection start against the address at `idx`
    pub fn increment(&mut self, idx: usize) {
        let src = &mut self.addrs[idx];
        assert!(
            src.active < src.capacity,
            "source address {} incremented past capacity {}",
            src.addr,
            src.capacity
        );
        src.active += 1;
    }

    /// Record a connection end against the address at `idx`.
    ///
    /// Decrementing an idle address is a programming-contract violation
    /// inside the engine, not a caller-reachable condition, and panics
    /// rather than underflowing.
    pub fn decrement(&mut self, idx: usize) {
        let src = &mut self.addrs[idx];
        assert!(
            src.active > 0,
            "source address {} decremented below zero",
            src.addr
        );
        src.active -= 1;
    }

    pub fn get(&self, idx: usize) -> &SourceAddress {
        &self.addrs[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceAddress> {
        self.addrs.iter()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Sum of active counts across all addresses
    pub fn total_active(&self) -> usize {
        self.addrs.iter().map(|s| s.active).sum()
    }
}
