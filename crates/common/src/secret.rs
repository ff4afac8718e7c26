//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. The session
//! authorization token handed to the coordinator by the auth layer is carried
//! as a [`SecretString`] from the public API down to the transport that puts
//! it on the wire, so it never shows up in `{:?}` output or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Credentials {
//!     session_id: String,
//!     token: SecretString,
//! }
//!
//! let creds = Credentials {
//!     session_id: "S1".to_string(),
//!     token: SecretString::from("bearer-abc"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("bearer-abc"));
//! assert_eq!(creds.token.expose_secret(), "bearer-abc");
//! ```
//!
//! Use `SecretString` for bearer tokens and anything else the auth layer hands
//! over. Only the transport layer should call `expose_secret()`, and only to
//! build a request header or socket URL.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
