//! Fixed-capacity connection slot pool
//!
//! Slots are handed out and reclaimed as connections start and finish,
//! avoiding per-connection allocation. Acquisition goes through a free-list
//! stack of indices, so it is O(1) while keeping the behavior of a
//! first-free scan. Slots are addressed by stable index; the reactor uses
//! that index as its dispatch token, never a pointer into the backing
//! storage.

use crate::engine::{ConnectionState, Credential};
use crate::error::OrchestratorError;
use mio::net::TcpStream;
use std::net::SocketAddrV4;
use std::time::Instant;

/// A reusable connection record
#[derive(Debug)]
pub struct ConnectionSlot {
    /// The registered stream; `None` marks the slot free
    pub(crate) stream: Option<TcpStream>,
    pub(crate) state: ConnectionState,
    pub(crate) target: SocketAddrV4,
    /// Registration index of the source address this connection is bound
    /// to, stored at creation so reclamation never re-derives it
    pub(crate) source: usize,
    pub(crate) started_at: Instant,
    pub(crate) credential: Option<Credential>,
}

impl ConnectionSlot {
    fn vacant() -> Self {
        Self {
            stream: None,
            state: ConnectionState::Connecting,
            target: SocketAddrV4::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
            source: 0,
            started_at: Instant::now(),
            credential: None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.stream.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }
}

/// Fixed pool of connection slots with a free-list
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<ConnectionSlot>,
    /// Stack of free indices; the top is the next slot handed out
    free: Vec<usize>,
}

impl SlotPool {
    /// Create a pool with `capacity` free slots. The first reservation
    /// yields index 0, then 1, and so on.
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| ConnectionSlot::vacant()).collect();
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    /// Index of the slot the next `commit` will occupy. Nothing is marked
    /// yet, so failures between `reserve` and `commit` need no rollback.
    pub fn reserve(&self) -> crate::Result<usize> {
        self.free
            .last()
            .copied()
            .ok_or(OrchestratorError::PoolExhausted)
    }

    /// Occupy the reserved slot with a freshly registered stream
    pub fn commit(
        &mut self,
        idx: usize,
        stream: TcpStream,
        target: SocketAddrV4,
        source: usize,
        credential: Credential,
    ) {
        let popped = self.free.pop();
        debug_assert_eq!(popped, Some(idx), "commit does not match reservation");

        let slot = &mut self.slots[idx];
        slot.stream = Some(stream);
        slot.state = ConnectionState::Connecting;
        slot.target = target;
        slot.source = source;
        slot.started_at = Instant::now();
        slot.credential = Some(credential);
    }

    /// Reset the slot to free and return its stream so the caller can
    /// deregister and close it
    pub fn release(&mut self, idx: usize) -> Option<TcpStream> {
        let slot = &mut self.slots[idx];
        let stream = slot.stream.take();
        if stream.is_some() {
            slot.credential = None;
            self.free.push(idx);
        }
        stream
    }

    pub fn get(&self, idx: usize) -> Option<&ConnectionSlot> {
        self.slots.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ConnectionSlot> {
        self.slots.get_mut(idx)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Indices of all occupied slots, in index order
    pub fn occupied_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_occupied())
            .map(|(i, _)| i)
            .collect()
    }
}
