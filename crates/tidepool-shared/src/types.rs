use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::PROBE_PEER_ID;

// Record identifier = opaque caller-generated string (UUID v4 for local writers)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Mint a fresh id for a locally submitted record.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Peer identifier = whatever opaque token the sync capability reports
// (relay URLs, transport ids). Compared verbatim, never parsed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// The reserved id asserted by a successful liveness probe.
    /// Prefixed so UI code can filter it out of visible peer lists.
    pub fn probe() -> Self {
        Self(PROBE_PEER_ID.to_string())
    }

    pub fn is_probe(&self) -> bool {
        self.0 == PROBE_PEER_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The externally authenticated local user, as handed over by the identity
/// provider. Stamped onto outgoing records; never validated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Display name or email, whichever the identity provider reported.
    pub label: Option<String>,
    /// Stable identity key assigned by the identity provider.
    pub key: Option<String>,
}

impl UserProfile {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            key: Some(key.into()),
        }
    }

    /// Whether a record carrying `sender_key` was written by this profile.
    /// Anonymous records (missing key on either side) are never "ours".
    pub fn authored(&self, sender_key: Option<&str>) -> bool {
        matches!((self.key.as_deref(), sender_key), (Some(a), Some(b)) if a == b)
    }
}

/// Current time in milliseconds since the Unix epoch, the unit every
/// record timestamp is stored in.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::from("m1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"m1\"");
    }

    #[test]
    fn probe_peer_is_flagged() {
        assert!(PeerId::probe().is_probe());
        assert!(!PeerId::from("wss://relay.example/gun").is_probe());
    }

    #[test]
    fn authored_requires_matching_keys() {
        let profile = UserProfile::new("Alice", "uid-1");
        assert!(profile.authored(Some("uid-1")));
        assert!(!profile.authored(Some("uid-2")));
        assert!(!profile.authored(None));

        let anonymous = UserProfile::default();
        assert!(!anonymous.authored(Some("uid-1")));
        assert!(!anonymous.authored(None));
    }
}
