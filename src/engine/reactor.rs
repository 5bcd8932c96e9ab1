//! Event reactor and connection state machine
//!
//! A single `mio::Poll` drives every in-flight connection: `start_connection`
//! performs the synchronous pre-flight (select source, reserve slot, create,
//! bind, connect, register) and `process_events` resolves readiness,
//! timeouts, and reclamation. One thread executes both; the only blocking
//! point is the bounded poll wait.

use crate::config::EngineConfig;
use crate::engine::slots::SlotPool;
use crate::engine::source::SourcePool;
use crate::engine::{ConnectionState, Credential};
use crate::error::OrchestratorError;
use crate::limits;
use crate::stats::{EngineStats, Snapshot, SourceStats};
use log::{debug, info, trace, warn};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Scalable outbound-connection orchestration engine.
///
/// Owns the source address registry, the fixed slot pool, and the reactor
/// handle. All mutation happens on the calling thread; no locks.
#[derive(Debug)]
pub struct Orchestrator {
    config: EngineConfig,
    poll: Poll,
    sources: SourcePool,
    slots: SlotPool,
    stats: EngineStats,
    active: usize,
}

impl Orchestrator {
    /// Initialize the engine for `config.max_connections` concurrent
    /// connections. Raises the process file-descriptor ceiling best-effort;
    /// a refused raise is logged and never fatal.
    pub fn new(config: EngineConfig) -> crate::Result<Self> {
        config.validate()?;

        let effective = limits::raise_fd_limit(config.max_connections, config.fd_headroom);
        if (effective as usize) < config.max_connections {
            warn!(
                "File descriptor limit {} is below the configured {} connections",
                effective, config.max_connections
            );
        }

        let poll = Poll::new().map_err(OrchestratorError::ReactorError)?;
        let slots = SlotPool::new(config.max_connections);

        info!(
            "Orchestrator initialized: {} slots, {}ms connect timeout",
            config.max_connections, config.connect_timeout
        );

        Ok(Self {
            config,
            poll,
            sources: SourcePool::new(),
            slots,
            stats: EngineStats::default(),
            active: 0,
        })
    }

    /// Register a local source address with an independent capacity cap
    pub fn register_source(&mut self, addr: Ipv4Addr, capacity: usize) -> crate::Result<()> {
        self.sources.register(addr, capacity)
    }

    /// Initiate one non-blocking connection toward `target`, bound to the
    /// least-loaded source address.
    ///
    /// Every error here is pre-flight: nothing is committed, no counter
    /// moves, and the caller may retry immediately or later.
    pub fn start_connection(
        &mut self,
        target: SocketAddrV4,
        credential: Credential,
    ) -> crate::Result<()> {
        let source_idx = self.sources.select_least_loaded()?;
        let slot_idx = self.slots.reserve()?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(OrchestratorError::SocketCreateFailed)?;
        socket
            .set_nonblocking(true)
            .map_err(OrchestratorError::SocketCreateFailed)?;
        socket
            .set_reuse_address(true)
            .map_err(OrchestratorError::SocketCreateFailed)?;

        let source_addr = self.sources.get(source_idx).addr;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(source_addr, 0));
        socket
            .bind(&bind_addr.into())
            .map_err(OrchestratorError::BindFailed)?;

        // Anything other than "in progress" (or an instant loopback
        // completion) is a failed initiation; dropping the socket closes it.
        let target_addr = SocketAddr::V4(target);
        if let Err(e) = socket.connect(&target_addr.into()) {
            if !connect_in_progress(&e) {
                return Err(OrchestratorError::ConnectFailed(e));
            }
        }

        let mut stream = TcpStream::from_std(socket.into());
        self.poll
            .registry()
            .register(
                &mut stream,
                Token(slot_idx),
                Interest::READABLE | Interest::WRITABLE,
            )
            .map_err(OrchestratorError::RegistrationFailed)?;

        // Commit point: only now does any state move.
        self.slots
            .commit(slot_idx, stream, target, source_idx, credential);
        self.sources.increment(source_idx);
        self.stats.total_attempts += 1;
        self.active += 1;

        trace!(
            "Connection {} -> {} started in slot {}",
            source_addr,
            target,
            slot_idx
        );
        Ok(())
    }

    /// Block on the reactor for up to `timeout`, advance ready connections
    /// through the state machine, then reclaim every terminal slot.
    ///
    /// Returns the number of readiness events dispatched; a fault in the
    /// poll call itself surfaces as `ReactorError`.
    pub fn process_events(&mut self, timeout: Duration) -> crate::Result<usize> {
        let mut events = Events::with_capacity(self.config.poll_capacity);
        self.poll
            .poll(&mut events, Some(timeout))
            .map_err(OrchestratorError::ReactorError)?;

        let connect_timeout = self.config.timeout_duration();
        let mut dispatched = 0;

        for event in events.iter() {
            let Token(idx) = event.token();
            dispatched += 1;

            let Some(slot) = self.slots.get_mut(idx) else {
                warn!("Event for unknown slot {}", idx);
                continue;
            };
            // Stale readiness for a slot already resolved in this batch
            if !slot.is_occupied() || slot.state != ConnectionState::Connecting {
                continue;
            }

            if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
                debug!("Slot {}: error/hangup from reactor", idx);
                slot.state = ConnectionState::Error;
                self.stats.failed += 1;
            } else if slot.started_at.elapsed() > connect_timeout {
                debug!("Slot {}: connect timeout", idx);
                slot.state = ConnectionState::Error;
                self.stats.timed_out += 1;
            } else if event.is_writable() {
                // A writable in-progress connect resolved; the pending
                // socket error says which way.
                let pending = slot
                    .stream
                    .as_ref()
                    .map(|s| s.take_error())
                    .unwrap_or(Ok(None));
                match pending {
                    Ok(None) => {
                        debug_assert!(slot
                            .state
                            .can_transition(ConnectionState::Connected));
                        slot.state = ConnectionState::Connected;
                        trace!("Slot {}: handshake complete with {}", idx, slot.target);
                        // Payload delivery and credential verification are
                        // unimplemented extension phases; a completed
                        // handshake goes straight to Done.
                        debug_assert!(slot.state.can_transition(ConnectionState::Done));
                        slot.state = ConnectionState::Done;
                        self.stats.successful += 1;
                    }
                    Ok(Some(err)) => {
                        debug!("Slot {}: pending socket error: {}", idx, err);
                        slot.state = ConnectionState::Error;
                        self.stats.failed += 1;
                    }
                    Err(err) => {
                        debug!("Slot {}: SO_ERROR query failed: {}", idx, err);
                        slot.state = ConnectionState::Error;
                        self.stats.failed += 1;
                    }
                }
            }
        }

        self.sweep_and_reclaim(connect_timeout);

        Ok(dispatched)
    }

    /// Expire overdue connects (targets that drop SYNs never produce a
    /// readiness event) and reclaim every terminal slot.
    fn sweep_and_reclaim(&mut self, connect_timeout: Duration) {
        for idx in self.slots.occupied_indices() {
            let mut expired = false;
            let mut terminal = false;

            if let Some(slot) = self.slots.get_mut(idx) {
                if slot.state == ConnectionState::Connecting
                    && slot.started_at.elapsed() > connect_timeout
                {
                    slot.state = ConnectionState::Error;
                    expired = true;
                }
                terminal = slot.state.is_terminal();
            }

            if expired {
                debug!("Slot {}: reclaimed as timed out", idx);
                self.stats.timed_out += 1;
            }
            if terminal {
                self.reclaim(idx);
            }
        }

        debug_assert_eq!(self.active, self.slots.occupied());
        debug_assert_eq!(self.active, self.sources.total_active());
    }

    /// Deregister, close, and free one terminal slot, returning its load to
    /// the source address recorded at creation time.
    fn reclaim(&mut self, idx: usize) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };
        let source_idx = slot.source;

        if let Some(mut stream) = self.slots.release(idx) {
            if let Err(e) = self.poll.registry().deregister(&mut stream) {
                warn!("Slot {}: deregister failed: {}", idx, e);
            }
            // Dropping the stream closes the descriptor.
            drop(stream);
            self.sources.decrement(source_idx);
            self.active -= 1;
        }
    }

    /// Read-only copy of the aggregate counters and per-address utilization
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            stats: self.stats.clone(),
            active_connections: self.active,
            sources: self
                .sources
                .iter()
                .map(|s| SourceStats {
                    addr: s.addr,
                    active: s.active(),
                    capacity: s.capacity(),
                })
                .collect(),
        }
    }

    /// Connections currently occupying slots
    pub fn active_connections(&self) -> usize {
        self.active
    }

    /// Close every socket, release every slot, and return all source loads
    /// to zero. Connections discarded here are not counted in any outcome
    /// counter.
    pub fn shutdown(&mut self) {
        let open = self.slots.occupied_indices();
        if !open.is_empty() {
            info!("Shutting down with {} connections still open", open.len());
        }
        for idx in open {
            self.reclaim(idx);
        }
        debug_assert_eq!(self.active, 0);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A non-blocking connect reports completion later through the reactor;
/// `EINPROGRESS` (or `WouldBlock` from the portability layer) is the normal
/// path, not an error.
fn connect_in_progress(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINPROGRESS) || e.kind() == io::ErrorKind::WouldBlock
}
