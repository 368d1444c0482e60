//! Keyed reconciliation of out-of-order record streams.
//!
//! Maintains an in-memory map of records keyed by id, absorbing raw child
//! updates as they arrive.  Duplicates collapse, invalid nodes are dropped,
//! and a later write under an existing id replaces the stored record, so the
//! map converges on the same contents regardless of delivery order.

use std::collections::HashMap;

use serde_json::Value;
use tracing::trace;

use tidepool_shared::{RecordId, StoreRecord};

/// Snapshot ordering for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPolicy {
    /// Ascending timestamp: transcripts, oldest at the top.
    OldestFirst,
    /// Descending timestamp: galleries, newest at the top.
    NewestFirst,
}

/// Outcome of feeding one raw child update into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorb {
    /// First complete record seen under this id.
    Inserted,
    /// An existing id re-arrived with different contents.
    Updated,
    /// Byte-for-byte replay of what is already stored.
    Unchanged,
    /// Not a complete record; the store is untouched.
    Rejected,
}

impl Absorb {
    /// Whether the update altered what a snapshot would return.
    pub fn changed(self) -> bool {
        matches!(self, Absorb::Inserted | Absorb::Updated)
    }
}

struct Entry<R> {
    record: R,
    /// Acceptance order, used to break timestamp ties deterministically.
    seq: u64,
}

/// Deduplicating, validity-filtered record map for one collection.
pub struct RecordStore<R: StoreRecord> {
    entries: HashMap<RecordId, Entry<R>>,
    order: OrderPolicy,
    next_seq: u64,
}

impl<R: StoreRecord> RecordStore<R> {
    /// Create an empty store with the given snapshot ordering.
    pub fn new(order: OrderPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            order,
            next_seq: 0,
        }
    }

    /// Absorb one raw child update from the subscription stream.
    ///
    /// The `key` is the child key the graph delivered the node under; the
    /// record's own id is authoritative for dedup.  Nodes that do not parse
    /// as a complete record are rejected without touching existing state,
    /// so a tombstone replay can never clobber a record already held.
    pub fn absorb(&mut self, key: &str, raw: &Value) -> Absorb {
        let Some(record) = R::parse_raw(raw) else {
            trace!(key, "dropping incomplete node");
            return Absorb::Rejected;
        };
        if key != record.id().as_str() {
            trace!(key, id = %record.id(), "child key differs from record id");
        }

        match self.entries.get_mut(record.id()) {
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries
                    .insert(record.id().clone(), Entry { record, seq });
                Absorb::Inserted
            }
            Some(entry) if entry.record == record => Absorb::Unchanged,
            Some(entry) => {
                entry.record = record;
                Absorb::Updated
            }
        }
    }

    /// Number of distinct records held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no record has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a single record by id.
    pub fn get(&self, id: &RecordId) -> Option<&R> {
        self.entries.get(id).map(|entry| &entry.record)
    }

    /// Current contents, ordered per the store's [`OrderPolicy`].
    ///
    /// Records sharing a timestamp keep their acceptance order, so repeated
    /// snapshots of identical contents are identical lists.
    pub fn snapshot(&self) -> Vec<R> {
        let mut entries: Vec<&Entry<R>> = self.entries.values().collect();
        match self.order {
            OrderPolicy::OldestFirst => {
                entries.sort_by_key(|e| (e.record.timestamp_ms(), e.seq));
            }
            OrderPolicy::NewestFirst => {
                entries.sort_by(|a, b| {
                    b.record
                        .timestamp_ms()
                        .cmp(&a.record.timestamp_ms())
                        .then(a.seq.cmp(&b.seq))
                });
            }
        }
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}
