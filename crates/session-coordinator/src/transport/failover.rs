//! Transport failover policy.
//!
//! A pure transition function over an explicit state enum. The router owns the
//! side effects (opening sockets, starting the poll ticker); this module only
//! decides where to go next.
//!
//! ```text
//! PrimaryPending ──opened──► PrimaryActive
//!       │                         │
//!  timeout/error               error
//!       ▼                         ▼
//!   HttpPoll ◄────────────────────┘
//!       │
//!  poll or send error threshold
//!       ▼
//!  DirectFallback (terminal)
//! ```
//!
//! Failover is monotonic: no event ever moves to a better strategy.

use std::fmt;

/// Signaling transport strategy, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    PrimarySocket,
    HttpPoll,
    DirectFallback,
}

impl TransportKind {
    /// Bounded label for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::PrimarySocket => "primary_socket",
            TransportKind::HttpPoll => "http_poll",
            TransportKind::DirectFallback => "direct_fallback",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router failover state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    /// Primary socket requested, waiting for it to report open.
    PrimaryPending,
    /// Primary socket open.
    PrimaryActive,
    /// Polling over HTTP.
    HttpPoll,
    /// No server; self view only.
    DirectFallback,
}

/// Input to the failover policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverEvent {
    PrimaryOpened,
    PrimaryOpenTimeout,
    PrimaryError,
    PollErrorThreshold,
    SendErrorThreshold,
}

impl FailoverEvent {
    /// Bounded label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailoverEvent::PrimaryOpened => "primary_opened",
            FailoverEvent::PrimaryOpenTimeout => "primary_open_timeout",
            FailoverEvent::PrimaryError => "primary_error",
            FailoverEvent::PollErrorThreshold => "poll_error_threshold",
            FailoverEvent::SendErrorThreshold => "send_error_threshold",
        }
    }
}

impl FailoverState {
    /// Transport in use (or being attempted) in this state.
    #[must_use]
    pub const fn transport(self) -> TransportKind {
        match self {
            FailoverState::PrimaryPending | FailoverState::PrimaryActive => {
                TransportKind::PrimarySocket
            }
            FailoverState::HttpPoll => TransportKind::HttpPoll,
            FailoverState::DirectFallback => TransportKind::DirectFallback,
        }
    }

    /// Apply `event`. Events that do not apply in this state leave it unchanged.
    #[must_use]
    pub const fn next(self, event: FailoverEvent) -> FailoverState {
        use FailoverEvent::{
            PollErrorThreshold, PrimaryError, PrimaryOpenTimeout, PrimaryOpened,
            SendErrorThreshold,
        };
        use FailoverState::{DirectFallback, HttpPoll, PrimaryActive, PrimaryPending};

        match (self, event) {
            (PrimaryPending, PrimaryOpened) => PrimaryActive,
            (PrimaryPending, PrimaryOpenTimeout | PrimaryError) | (PrimaryActive, PrimaryError) => {
                HttpPoll
            }
            (HttpPoll, PollErrorThreshold | SendErrorThreshold) => DirectFallback,
            (state, _) => state,
        }
    }
}

/// Consecutive-error counter with a trip threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCounter {
    consecutive: u32,
    threshold: u32,
}

impl ErrorCounter {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold,
        }
    }

    /// Count a failure. Returns true once the threshold is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.is_tripped()
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    #[must_use]
    pub const fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }

    #[must_use]
    pub const fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use FailoverEvent::{
        PollErrorThreshold, PrimaryError, PrimaryOpenTimeout, PrimaryOpened, SendErrorThreshold,
    };
    use FailoverState::{DirectFallback, HttpPoll, PrimaryActive, PrimaryPending};

    const STATES: [FailoverState; 4] = [PrimaryPending, PrimaryActive, HttpPoll, DirectFallback];
    const EVENTS: [FailoverEvent; 5] = [
        PrimaryOpened,
        PrimaryOpenTimeout,
        PrimaryError,
        PollErrorThreshold,
        SendErrorThreshold,
    ];

    #[test]
    fn test_transition_table() {
        let expected = |state: FailoverState, event: FailoverEvent| match (state, event) {
            (PrimaryPending, PrimaryOpened) => PrimaryActive,
            (PrimaryPending, PrimaryOpenTimeout | PrimaryError) => HttpPoll,
            (PrimaryActive, PrimaryError) => HttpPoll,
            (HttpPoll, PollErrorThreshold | SendErrorThreshold) => DirectFallback,
            (s, _) => s,
        };

        for state in STATES {
            for event in EVENTS {
                assert_eq!(
                    state.next(event),
                    expected(state, event),
                    "{state:?} + {event:?}"
                );
            }
        }
    }

    #[test]
    fn test_failover_is_monotonic() {
        for state in STATES {
            for event in EVENTS {
                assert!(state.next(event).transport() >= state.transport());
            }
        }
    }

    #[test]
    fn test_direct_fallback_is_terminal() {
        for event in EVENTS {
            assert_eq!(DirectFallback.next(event), DirectFallback);
        }
    }

    #[test]
    fn test_stale_open_timeout_after_open_is_ignored() {
        assert_eq!(PrimaryActive.next(PrimaryOpenTimeout), PrimaryActive);
    }

    #[test]
    fn test_every_sequence_ends_no_better_than_it_started() {
        // All event sequences up to length 4 from the initial state.
        let mut frontier = vec![PrimaryPending];
        for _ in 0..4 {
            let mut next_frontier = Vec::new();
            for state in frontier {
                for event in EVENTS {
                    let next = state.next(event);
                    assert!(next.transport() >= state.transport());
                    next_frontier.push(next);
                }
            }
            frontier = next_frontier;
        }
    }

    #[test]
    fn test_error_counter_trips_at_threshold_and_resets() {
        let mut counter = ErrorCounter::new(3);

        assert!(!counter.record_failure());
        assert!(!counter.record_failure());
        counter.record_success();
        assert_eq!(counter.consecutive(), 0);

        assert!(!counter.record_failure());
        assert!(!counter.record_failure());
        assert!(counter.record_failure());
        assert!(counter.is_tripped());
    }
}
