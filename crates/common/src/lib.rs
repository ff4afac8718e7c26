//! Common utilities and types shared across the session coordinator crates.

#![warn(clippy::pedantic)]

/// Module for identifier types (sessions, participants)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
