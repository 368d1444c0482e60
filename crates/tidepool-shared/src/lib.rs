//! # tidepool-shared
//!
//! Record types, identifiers, and shared constants for the Tidepool
//! reconciliation layer. Records cross the sync gateway as loosely-shaped
//! JSON nodes; this crate is the single place where a raw node is judged
//! complete enough to display.

pub mod constants;
pub mod record;
pub mod types;

pub use record::{GalleryImage, Message, StoreRecord};
pub use types::{now_millis, PeerId, RecordId, UserProfile};
