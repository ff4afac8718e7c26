//! Session Coordinator Library
//!
//! This library establishes and maintains direct audio/video exchange between
//! the participants of a named session. A signaling channel carries the
//! negotiation messages, and the coordinator degrades across three signaling
//! transports when the preferred one is unavailable:
//!
//! 1. **Primary Socket** - persistent bidirectional channel
//! 2. **HTTP Poll** - periodic polling plus POST for sends
//! 3. **Direct Fallback** - no server; a labelled self-view loopback
//!
//! # Architecture
//!
//! The coordinator uses an actor hierarchy over tokio channels:
//!
//! ```text
//! SessionActor (one per session, owns roster and local media)
//! ├── TransportRouterActor (one active signaling transport, failover policy)
//! └── PeerManagerActor (one connection per remote participant)
//!     └── PeerActor (one per remote participant, sequential negotiation)
//! ```
//!
//! Every actor holds a child of the session's `CancellationToken`, so leaving
//! (or dropping) the session tears the whole tree down.
//!
//! # Modules
//!
//! - [`session`] - Public entry point ([`SessionCoordinator`])
//! - [`peer`] - Per-peer connection actors and their manager
//! - [`transport`] - Signaling transports and the failover router
//! - [`media`] - Local media tracks and the capture device seam
//! - [`events`] - Events delivered to the presentation layer
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types

pub mod config;
pub mod errors;
pub mod events;
pub mod media;
pub mod observability;
pub mod peer;
pub mod session;
pub mod transport;

pub use config::Config;
pub use errors::ScError;
pub use events::SessionEvent;
pub use session::{Collaborators, ParticipantInfo, SessionCoordinator};
