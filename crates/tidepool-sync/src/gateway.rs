//! The contract every graph-sync backend must satisfy.
//!
//! A gateway hands records to the external sync layer and replays what the
//! layer knows back to us.  The guarantees are deliberately weak, matching
//! what eventually-consistent graph stores actually provide: child updates
//! arrive in no particular order, the same node may be delivered any number
//! of times, and our own writes echo back through the subscription.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use tidepool_shared::PeerId;

/// Errors surfaced by a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend could not be reached at all.
    #[error("sync backend unreachable: {0}")]
    Unreachable(String),

    /// The backend did not answer within the allotted time.
    #[error("sync backend timed out")]
    Timeout,

    /// The gateway has been shut down.
    #[error("gateway closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// One child node delivered by a collection subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildUpdate {
    /// Child key the node was filed under.
    pub key: String,
    /// Raw node contents.  May be a tombstone or partial state.
    pub value: Value,
}

/// Transport-level peer activity reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}

/// Interface to the external graph-sync layer.
#[async_trait]
pub trait SyncGateway: Send + Sync {
    /// Write a full node at `path`.  Resolves once the write is accepted
    /// locally; replication to peers happens in the background.
    async fn put(&self, path: &str, record: Value) -> Result<()>;

    /// Read the node at `path`, or `None` if the graph holds nothing there.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Subscribe to every child of `collection`: already-known children are
    /// replayed first in arbitrary order, then live updates follow,
    /// including echoes of this client's own puts.
    async fn subscribe_all(&self, collection: &str) -> Result<Subscription>;

    /// Peer connect and disconnect notifications from the transport.
    fn peer_events(&self) -> broadcast::Receiver<PeerEvent>;
}

/// Live feed of child updates for one collection.
///
/// Dropping the subscription detaches it from the backend.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChildUpdate>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a raw update channel.  `on_drop` runs exactly once when the
    /// subscription is released, and is where backends unregister it.
    pub fn new(
        rx: mpsc::UnboundedReceiver<ChildUpdate>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Next child update, or `None` once the backend hangs up.
    pub async fn recv(&mut self) -> Option<ChildUpdate> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = ChildUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChildUpdate>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.on_drop.take() {
            unregister();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
