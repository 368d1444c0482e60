//! Wire-facing record types for the two chatroom collections.
//!
//! The underlying graph store replays tombstones, half-populated nodes, and
//! duplicates as a matter of course, so every record kind knows how to judge
//! a raw node complete enough to display. Anything that fails the check is
//! dropped silently; there is no error to report for an expected shape.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{now_millis, RecordId, UserProfile};

/// Behaviour shared by every record kind a record store can hold.
pub trait StoreRecord: Clone + PartialEq + Serialize + Send + 'static {
    /// Dedup key. At most one record per id survives reconciliation.
    fn id(&self) -> &RecordId;

    /// Milliseconds since the Unix epoch, as stamped by the writer.
    fn timestamp_ms(&self) -> i64;

    /// Parse a raw graph node, returning `None` for anything that is not a
    /// complete record of this kind: null, non-objects, tombstones, nodes
    /// with missing or empty required fields.
    fn parse_raw(raw: &Value) -> Option<Self>;

    /// The JSON shape handed to the sync gateway.
    fn to_raw(&self) -> Value {
        serde_json::to_value(self).expect("record serializes to JSON")
    }

    /// Submission time as a UTC datetime, for display formatting.
    fn sent_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms()).single()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Caller-generated unique id; doubles as the node key.
    pub id: RecordId,
    /// Submission time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Display name of the sender, when the identity layer provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_label: Option<String>,
    /// Stable identity key of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_key: Option<String>,
    /// Message body. Never empty in a valid record.
    pub text: String,
}

impl Message {
    /// Stamp a new message from the local writer: fresh id, current
    /// timestamp, sender fields from the profile.
    pub fn new(profile: &UserProfile, text: impl Into<String>) -> Self {
        Self {
            id: RecordId::generate(),
            timestamp: now_millis(),
            sender_label: profile.label.clone(),
            sender_key: profile.key.clone(),
            text: text.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.id.is_empty() && self.timestamp > 0 && !self.text.is_empty()
    }
}

impl StoreRecord for Message {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    fn parse_raw(raw: &Value) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }
        let record: Message = serde_json::from_value(raw.clone()).ok()?;
        record.is_complete().then_some(record)
    }
}

// ---------------------------------------------------------------------------
// GalleryImage
// ---------------------------------------------------------------------------

/// One shared image entry. The payload is a self-contained data URI
/// produced by the encoding pipeline, displayable without further fetches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    /// Caller-generated unique id; doubles as the node key.
    pub id: RecordId,
    /// Submission time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Stable identity key of the uploader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_key: Option<String>,
    /// MIME-tagged base64 data URI, bounded by the encoding budget.
    pub encoded_payload: String,
    /// File name as picked by the uploader, for captions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    /// Display name of the uploader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_label: Option<String>,
}

impl GalleryImage {
    /// Stamp a new image entry from the local writer.
    pub fn new(
        profile: &UserProfile,
        encoded_payload: impl Into<String>,
        original_file_name: Option<String>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            timestamp: now_millis(),
            sender_key: profile.key.clone(),
            encoded_payload: encoded_payload.into(),
            original_file_name,
            uploader_label: profile.label.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.id.is_empty() && self.timestamp > 0 && !self.encoded_payload.is_empty()
    }
}

impl StoreRecord for GalleryImage {
    fn id(&self) -> &RecordId {
        &self.id
    }

    fn timestamp_ms(&self) -> i64 {
        self.timestamp
    }

    fn parse_raw(raw: &Value) -> Option<Self> {
        if !raw.is_object() {
            return None;
        }
        let record: GalleryImage = serde_json::from_value(raw.clone()).ok()?;
        record.is_complete().then_some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_round_trips_with_camel_case_wire_names() {
        let profile = UserProfile::new("Alice", "uid-1");
        let msg = Message::new(&profile, "hello");
        let raw = msg.to_raw();

        assert_eq!(raw["senderLabel"], "Alice");
        assert_eq!(raw["senderKey"], "uid-1");
        assert_eq!(Message::parse_raw(&raw), Some(msg));
    }

    #[test]
    fn message_rejects_incomplete_nodes() {
        assert_eq!(Message::parse_raw(&Value::Null), None);
        assert_eq!(Message::parse_raw(&json!("just a string")), None);
        assert_eq!(Message::parse_raw(&json!({})), None);
        // tombstone leftovers: id survives, content is gone
        assert_eq!(Message::parse_raw(&json!({ "id": "m1" })), None);
        assert_eq!(
            Message::parse_raw(&json!({ "id": "m1", "text": "", "timestamp": 1_000 })),
            None
        );
        assert_eq!(
            Message::parse_raw(&json!({ "id": "m1", "text": "hi", "timestamp": 0 })),
            None
        );
        assert_eq!(
            Message::parse_raw(&json!({ "id": "", "text": "hi", "timestamp": 1_000 })),
            None
        );
    }

    #[test]
    fn message_tolerates_unknown_fields_and_missing_sender() {
        // graph stores attach their own metadata to nodes; it must not
        // poison an otherwise complete record
        let raw = json!({
            "_": { "#": "chatroom/messages/m1", ">": { "text": 1 } },
            "id": "m1",
            "text": "hi",
            "timestamp": 1_000,
        });
        let msg = Message::parse_raw(&raw).expect("complete record");
        assert_eq!(msg.sender_label, None);
        assert_eq!(msg.sender_key, None);
    }

    #[test]
    fn image_requires_payload() {
        let raw = json!({ "id": "i1", "timestamp": 1_000, "encodedPayload": "" });
        assert_eq!(GalleryImage::parse_raw(&raw), None);

        let raw = json!({
            "id": "i1",
            "timestamp": 1_000,
            "encodedPayload": "data:image/jpeg;base64,AAAA",
            "uploaderLabel": "Bob",
        });
        let img = GalleryImage::parse_raw(&raw).expect("complete record");
        assert_eq!(img.uploader_label.as_deref(), Some("Bob"));
        assert_eq!(img.original_file_name, None);
    }

    #[test]
    fn sent_at_converts_epoch_millis() {
        let raw = json!({ "id": "m1", "text": "hi", "timestamp": 1_700_000_000_000_i64 });
        let msg = Message::parse_raw(&raw).unwrap();
        let at = msg.sent_at().expect("in range");
        assert_eq!(at.timestamp_millis(), 1_700_000_000_000);
    }
}
