//! # tidepool-store
//!
//! Client-side reconciliation for eventually-consistent record streams.
//!
//! The graph layer delivers child updates with no ordering or exactly-once
//! guarantees.  [`RecordStore`] turns that stream back into a stable,
//! deduplicated, time-ordered collection, and [`refresh`] provides the
//! debounce and grace timers that pace how often downstream consumers get
//! told about it.

pub mod records;
pub mod refresh;

pub use records::{Absorb, OrderPolicy, RecordStore};
pub use refresh::{Debounce, GraceTimer};
