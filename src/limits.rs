//! Process resource limit tuning
//!
//! Raising the open-file ceiling is best-effort: the orchestrator can still
//! operate below the requested scale, so failures are logged and never
//! propagated to the caller.

use log::{debug, info, warn};

/// Extra descriptors on top of the connection target covering the reactor
/// handle, stdio, and listener sockets owned by the caller.
pub const DEFAULT_FD_HEADROOM: u64 = 128;

/// Fallback soft limit reported on platforms without rlimit support.
const NON_UNIX_FD_LIMIT: u64 = 8192;

/// Attempt to raise `RLIMIT_NOFILE` so that `target_connections` descriptors
/// plus `headroom` fit under the soft limit. Returns the soft limit that is
/// effective afterwards.
#[cfg(unix)]
pub fn raise_fd_limit(target_connections: usize, headroom: u64) -> u64 {
    use rlimit::Resource;

    let desired = target_connections as u64 + headroom;

    let (soft, hard) = match Resource::NOFILE.get() {
        Ok(limits) => limits,
        Err(e) => {
            warn!("Could not read file descriptor limit: {}", e);
            return desired.min(NON_UNIX_FD_LIMIT);
        }
    };

    if soft >= desired {
        debug!("File descriptor limit {} already covers {}", soft, desired);
        return soft;
    }

    // The soft limit can only be raised up to the hard limit without
    // privileges.
    let requested = desired.min(hard);
    match Resource::NOFILE.set(requested, hard) {
        Ok(()) => {
            info!("Raised file descriptor limit {} -> {}", soft, requested);
            if requested < desired {
                warn!(
                    "Hard limit {} caps descriptors below the requested {}; \
                     connection count may be limited",
                    hard, desired
                );
            }
            requested
        }
        Err(e) => {
            warn!(
                "Failed to raise file descriptor limit to {}: {}. Continuing with {}",
                requested, e, soft
            );
            soft
        }
    }
}

#[cfg(not(unix))]
pub fn raise_fd_limit(_target_connections: usize, _headroom: u64) -> u64 {
    NON_UNIX_FD_LIMIT
}
