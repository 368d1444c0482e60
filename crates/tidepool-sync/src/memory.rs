//! In-process gateway used by tests and demos.
//!
//! [`MemoryHub`] stands in for a real relay.  Puts land in a shared node map
//! and fan out to every live subscription on the collection, including the
//! writer's own, which is exactly how the real backend echoes local writes
//! back to their author.  Backfill replays existing children in arbitrary
//! map order, so consumers get the same out-of-order delivery they have to
//! survive in production.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use tidepool_shared::PeerId;

use crate::gateway::{ChildUpdate, GatewayError, PeerEvent, Result, Subscription, SyncGateway};

const PEER_EVENT_CAPACITY: usize = 64;

type SubscriberMap = HashMap<String, HashMap<u64, mpsc::UnboundedSender<ChildUpdate>>>;

struct HubInner {
    nodes: Mutex<HashMap<String, Value>>,
    subscribers: Mutex<SubscriberMap>,
    peer_tx: broadcast::Sender<PeerEvent>,
    next_sub: AtomicU64,
    offline: AtomicBool,
    put_count: AtomicUsize,
}

/// Shared in-memory graph that any number of [`MemoryGateway`] handles
/// read and write through.
#[derive(Clone)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        let (peer_tx, _) = broadcast::channel(PEER_EVENT_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                nodes: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                peer_tx,
                next_sub: AtomicU64::new(0),
                offline: AtomicBool::new(false),
                put_count: AtomicUsize::new(0),
            }),
        }
    }

    /// A gateway handle onto this hub, as one client would hold.
    pub fn gateway(&self) -> MemoryGateway {
        MemoryGateway {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Announce a transport peer to every gateway.
    pub fn connect_peer(&self, peer: impl Into<PeerId>) {
        let _ = self.inner.peer_tx.send(PeerEvent::Connected(peer.into()));
    }

    /// Announce the loss of a transport peer to every gateway.
    pub fn disconnect_peer(&self, peer: impl Into<PeerId>) {
        let _ = self.inner.peer_tx.send(PeerEvent::Disconnected(peer.into()));
    }

    /// While offline, every put and get fails with
    /// [`GatewayError::Unreachable`].  Subscriptions stay attached.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Direct look at a stored node, for assertions.
    pub fn node(&self, path: &str) -> Option<Value> {
        self.inner.nodes.lock().ok()?.get(path).cloned()
    }

    /// Total put calls received, including ones refused while offline.
    pub fn put_count(&self) -> usize {
        self.inner.put_count.load(Ordering::SeqCst)
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's handle onto a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryGateway {
    inner: Arc<HubInner>,
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

#[async_trait]
impl SyncGateway for MemoryGateway {
    async fn put(&self, path: &str, record: Value) -> Result<()> {
        self.inner.put_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("hub is offline".into()));
        }

        // nodes is locked before subscribers here and in subscribe_all,
        // so a put lands in either the backfill or the live stream of a
        // racing subscription, never both and never neither
        let mut nodes = self
            .inner
            .nodes
            .lock()
            .map_err(|_| GatewayError::Closed)?;
        nodes.insert(path.to_string(), record.clone());

        let (collection, key) = split_path(path);
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .map_err(|_| GatewayError::Closed)?;
        if let Some(subs) = subscribers.get(collection) {
            for tx in subs.values() {
                let _ = tx.send(ChildUpdate {
                    key: key.to_string(),
                    value: record.clone(),
                });
            }
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("hub is offline".into()));
        }
        let nodes = self
            .inner
            .nodes
            .lock()
            .map_err(|_| GatewayError::Closed)?;
        Ok(nodes.get(path).cloned())
    }

    async fn subscribe_all(&self, collection: &str) -> Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_sub.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{collection}/");

        {
            let nodes = self
                .inner
                .nodes
                .lock()
                .map_err(|_| GatewayError::Closed)?;
            let mut subscribers = self
                .inner
                .subscribers
                .lock()
                .map_err(|_| GatewayError::Closed)?;
            for (path, value) in nodes.iter() {
                if let Some(key) = path.strip_prefix(&prefix) {
                    let _ = tx.send(ChildUpdate {
                        key: key.to_string(),
                        value: value.clone(),
                    });
                }
            }
            subscribers
                .entry(collection.to_string())
                .or_default()
                .insert(id, tx);
        }
        debug!(collection, id, "subscription attached");

        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        Ok(Subscription::new(rx, move || {
            if let Ok(mut subscribers) = inner.subscribers.lock() {
                if let Some(subs) = subscribers.get_mut(&collection) {
                    subs.remove(&id);
                }
            }
            debug!(collection, id, "subscription detached");
        }))
    }

    fn peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.inner.peer_tx.subscribe()
    }
}
