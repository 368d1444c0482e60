//! # tidepool-sync
//!
//! Contract with the external graph-sync layer, plus the liveness tracker
//! that decides whether writes are actually leaving this device.
//!
//! The graph layer itself lives outside this workspace.  Everything here
//! talks to it through the [`SyncGateway`] trait; [`MemoryHub`] provides an
//! in-process implementation with the same delivery quirks for tests and
//! demos.

pub mod gateway;
pub mod liveness;
pub mod memory;

pub use gateway::{ChildUpdate, GatewayError, PeerEvent, Subscription, SyncGateway};
pub use liveness::{LivenessConfig, LivenessState, LivenessTracker, SyncStatus};
pub use memory::{MemoryGateway, MemoryHub};
