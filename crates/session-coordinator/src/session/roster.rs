//! Remote participant roster.

use chrono::{DateTime, Utc};
use common::types::ParticipantId;
use serde::Serialize;
use std::collections::BTreeMap;

/// A remote participant known to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// Roster keyed by participant id, so no participant appears twice.
#[derive(Debug, Default)]
pub struct Roster {
    participants: BTreeMap<ParticipantId, Participant>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant. Returns true if it was not already present.
    ///
    /// A known participant keeps its `joined_at` but takes the new display
    /// name, since an offer can add a peer before its join arrives.
    pub fn add(&mut self, id: ParticipantId, display_name: impl Into<String>) -> bool {
        let display_name = display_name.into();
        if let Some(existing) = self.participants.get_mut(&id) {
            existing.display_name = display_name;
            return false;
        }

        self.participants.insert(
            id.clone(),
            Participant {
                id,
                display_name,
                joined_at: Utc::now(),
            },
        );
        true
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        self.participants.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Participants ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_unique_per_id() {
        let mut roster = Roster::new();

        assert!(roster.add(ParticipantId::from("bob"), "Bob"));
        assert!(!roster.add(ParticipantId::from("bob"), "Bob"));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_re_add_updates_name_and_keeps_join_time() {
        let mut roster = Roster::new();
        let id = ParticipantId::from("bob");

        roster.add(id.clone(), "bob");
        let joined_at = roster.snapshot().first().unwrap().joined_at;

        roster.add(id, "Bob Smith");
        let bob = roster.snapshot().into_iter().next().unwrap();
        assert_eq!(bob.display_name, "Bob Smith");
        assert_eq!(bob.joined_at, joined_at);
    }

    #[test]
    fn test_remove_and_snapshot_order() {
        let mut roster = Roster::new();
        roster.add(ParticipantId::from("carol"), "Carol");
        roster.add(ParticipantId::from("alice"), "Alice");
        roster.add(ParticipantId::from("bob"), "Bob");

        let removed = roster.remove(&ParticipantId::from("bob")).unwrap();
        assert_eq!(removed.display_name, "Bob");
        assert!(roster.remove(&ParticipantId::from("bob")).is_none());

        let ids: Vec<_> = roster
            .snapshot()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["alice", "carol"]);
    }

    #[test]
    fn test_clear() {
        let mut roster = Roster::new();
        roster.add(ParticipantId::from("bob"), "Bob");
        roster.clear();
        assert!(roster.is_empty());
        assert!(!roster.contains(&ParticipantId::from("bob")));
    }
}
