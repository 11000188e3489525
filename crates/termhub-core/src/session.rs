//! Session types for terminal session management.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse visibility classification of a terminal session.
///
/// The tier sets the acceptable output latency: a focused terminal should see
/// bytes almost immediately, while a background terminal can tolerate a delay
/// of about a second since nobody is looking at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityTier {
    /// The terminal has keyboard focus
    Focused,
    /// The terminal is visible but not focused
    Visible,
    /// The terminal is hidden or in an inactive tab
    Background,
}

/// Watermark state of a session's batch queue.
///
/// Transitions to `Soft`/`Hard` happen immediately on crossing a watermark;
/// the transition back to `Normal` is held off by a dwell window so the state
/// does not oscillate when the queue depth hovers near a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Queue depth is below the soft watermark
    Normal,
    /// Queue depth crossed the soft watermark; flush cadence tightens
    Soft,
    /// Queue depth crossed the hard watermark; oldest data is dropped
    Hard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_creation() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2); // Should generate different IDs
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new();
        let display = format!("{id}");
        assert!(!display.is_empty());
        assert_eq!(display.len(), 36); // UUID format length
    }

    #[test]
    fn test_session_id_serialization() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn test_activity_tier_serde() {
        let json = serde_json::to_string(&ActivityTier::Background).unwrap();
        assert_eq!(json, "\"background\"");
        let tier: ActivityTier = serde_json::from_str("\"focused\"").unwrap();
        assert_eq!(tier, ActivityTier::Focused);
    }

    #[test]
    fn test_queue_state_serde() {
        let json = serde_json::to_string(&QueueState::Hard).unwrap();
        assert_eq!(json, "\"hard\"");
        let state: QueueState = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(state, QueueState::Normal);
    }
}
