//! Signaling protocol for the session coordinator.
//!
//! This crate defines the messages peers exchange to discover each other and
//! negotiate direct media links (join, leave, offer, answer, ICE candidate),
//! and the JSON wire format those messages travel in over every signaling
//! transport. It holds no state.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod message;

pub use codec::{decode_message, encode_message, CodecError, WireMessage};
pub use message::{
    IceCandidate, ParticipantAnnouncement, SessionDescription, SignalBody, SignalKind,
    SignalMessage,
};
