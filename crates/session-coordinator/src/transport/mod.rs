//! Signaling transports.
//!
//! - [`backend`] - the seam to the signaling service
//! - [`http`] - REST polling and WebSocket implementation of that seam
//! - [`failover`] - the pure failover policy
//! - [`router`] - the actor that applies the policy

pub mod backend;
pub mod failover;
pub mod http;
pub mod router;

pub use backend::{PollBatch, SignalingBackend, SocketChannel, SocketEvent, TransportError};
pub use failover::{ErrorCounter, FailoverEvent, FailoverState, TransportKind};
pub use http::HttpSignalingBackend;
pub use router::{
    RouterOutput, TransportRouterActor, TransportRouterHandle, FALLBACK_PARTICIPANT_ID,
};
