//! Peer Connection Manager.
//!
//! One [`PeerActor`](connection::PeerActor) per remote participant, owned by
//! the [`PeerManagerActor`](manager::PeerManagerActor). The link engine behind
//! each connection is abstracted by [`PeerLink`] / [`PeerLinkFactory`].

pub mod connection;
pub mod link;
pub mod manager;
pub mod state;

pub use link::{LinkError, LinkEvent, LinkState, PeerLink, PeerLinkFactory, SenderId};
pub use manager::{PeerManagerActor, PeerManagerHandle};
pub use state::{ConnectionState, InvalidTransition, NegotiationRole};
