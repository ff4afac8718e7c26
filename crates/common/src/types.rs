//! Identifier types for sessions and participants.
//!
//! Both identifiers are opaque strings issued by the session/auth layer. The
//! newtypes exist so a participant id can never be passed where a session id
//! is expected; they serialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a real-time session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a participant (local or remote) within a session.
///
/// Ordering is lexicographic on the raw string; the peer manager uses it to
/// break offer collisions deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant ID from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let participant = ParticipantId::from("alice");
        let json = serde_json::to_string(&participant).unwrap();
        assert_eq!(json, "\"alice\"");

        let session: SessionId = serde_json::from_str("\"S1\"").unwrap();
        assert_eq!(session.as_str(), "S1");
    }

    #[test]
    fn test_participant_ordering_is_lexicographic() {
        assert!(ParticipantId::from("alice") < ParticipantId::from("bob"));
        assert!(ParticipantId::from("peer-10") < ParticipantId::from("peer-9"));
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionId::new("room-7").to_string(), "room-7");
        assert_eq!(ParticipantId::new(String::from("p1")).to_string(), "p1");
    }
}
