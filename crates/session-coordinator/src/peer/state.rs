//! Peer connection state machine.
//!
//! ```text
//! New ──► Connecting ──► Connected ◄──► Disconnected
//!  │          │              │               │
//!  └──────────┴──────► Failed ◄──────────────┘
//!
//! any non-Closed state ──► Closed (terminal)
//! ```

use serde::Serialize;
use std::fmt;

/// State of a connection to one remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Negotiation role of the local side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationRole {
    /// We send the offer.
    Initiator,
    /// We answer the remote offer.
    Responder,
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid connection state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// Bounded label for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::{Closed, Connected, Connecting, Disconnected, Failed, New};

        matches!(
            (self, next),
            (New, Connecting)
                | (New | Connecting | Connected | Disconnected, Failed)
                | (Connecting | Disconnected, Connected)
                | (Connected, Disconnected)
                | (New | Connecting | Connected | Disconnected | Failed, Closed)
        )
    }

    /// Perform the transition or report why it is illegal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if `self -> next` is not an edge of the
    /// state machine (including any transition out of `Closed`).
    pub const fn transition(self, next: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    /// A connection that can still carry media or recover.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        !matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ConnectionState::{Closed, Connected, Connecting, Disconnected, Failed, New};

    const ALL: [ConnectionState; 6] = [New, Connecting, Connected, Disconnected, Failed, Closed];

    #[test]
    fn test_happy_path() {
        let state = New
            .transition(Connecting)
            .and_then(|s| s.transition(Connected))
            .and_then(|s| s.transition(Disconnected))
            .and_then(|s| s.transition(Connected))
            .and_then(|s| s.transition(Closed))
            .unwrap();
        assert_eq!(state, Closed);
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(Closed.transition(next).is_err(), "Closed -> {next} allowed");
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_every_live_state_can_close() {
        for state in ALL.into_iter().filter(|s| *s != Closed) {
            assert_eq!(state.transition(Closed), Ok(Closed));
        }
    }

    #[test]
    fn test_failed_only_closes() {
        for next in ALL {
            assert_eq!(Failed.can_transition_to(next), next == Closed);
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_new_cannot_skip_to_connected() {
        assert_eq!(
            New.transition(Connected),
            Err(InvalidTransition {
                from: New,
                to: Connected
            })
        );
    }
}
