//! Connection engine: source address pool, slot pool, and event reactor

pub mod reactor;
pub mod slots;
pub mod source;

use serde::{Deserialize, Serialize};

pub use reactor::Orchestrator;
pub use slots::{ConnectionSlot, SlotPool};
pub use source::{SourceAddress, SourcePool, MAX_SOURCE_ADDRS};

/// Username/password pair carried per connection.
///
/// The engine stores the pair and reports the connection outcome; selection
/// and adaptive weighting of credentials belong to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Protocol phases beyond the transport handshake.
///
/// Declared so the unimplemented part of the pipeline is structurally
/// visible; no runtime path constructs these today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPhase {
    PayloadDelivery,
    CredentialVerification,
}

/// Per-connection state machine.
///
/// Legal transitions: `Connecting -> Connected -> Done` on a clean
/// handshake, `Connecting -> Error` on failure or timeout. Never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Non-blocking connect issued, awaiting writability
    Connecting,
    /// TCP handshake completed; immediately advanced to `Done` in the
    /// current scope
    Connected,
    /// Terminal: counted as successful
    Done,
    /// Terminal: counted as failed or timed out
    Error,
    /// Unreached extension phases (see [`ProtocolPhase`])
    NotImplemented(ProtocolPhase),
}

impl ConnectionState {
    /// True when the slot holding this state must be reclaimed
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Done | ConnectionState::Error)
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Connected) | (Connecting, Error) | (Connected, Done)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        use ConnectionState::*;
        assert!(Connecting.can_transition(Connected));
        assert!(Connecting.can_transition(Error));
        assert!(Connected.can_transition(Done));
    }

    #[test]
    fn test_backward_and_skip_transitions_rejected() {
        use ConnectionState::*;
        assert!(!Connected.can_transition(Connecting));
        assert!(!Done.can_transition(Connecting));
        assert!(!Connecting.can_transition(Done));
        assert!(!Error.can_transition(Connected));
        assert!(!Connecting.can_transition(NotImplemented(ProtocolPhase::PayloadDelivery)));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Done.is_terminal());
        assert!(ConnectionState::Error.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
    }
}
