//! # SC Test Utilities
//!
//! Shared test utilities for the Session Coordinator (SC).
//!
//! This crate provides mock collaborators and fixtures for exercising the
//! coordinator without a signaling server, capture devices or a media
//! engine.
//!
//! ## Modules
//!
//! - `mock_signaling` - Mock signaling backend (socket, polling, posting)
//! - `mock_media` - Mock capture devices
//! - `mock_links` - Mock peer links that record negotiation operations
//! - `fixtures` - Identities, signal builders and the `TestSession` harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let mut session = TestSession::poll_only();
//!     session.join().await;
//!
//!     // Primary socket never opens; polling takes over after 3s.
//!     session.advance(Duration::from_secs(3)).await;
//!     session.signaling.deliver(join_from("bob", "Bob"));
//! }
//! ```

pub mod fixtures;
pub mod mock_links;
pub mod mock_media;
pub mod mock_signaling;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_links::*;
pub use mock_media::*;
pub use mock_signaling::*;
