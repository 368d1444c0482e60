//! A reconciled, debounced view over one collection subscription.
//!
//! Each feed owns a task that absorbs child updates into a
//! [`RecordStore`] and publishes ordered snapshots on a watch channel,
//! paced by the debounce window.  A fresh feed reports a loading phase
//! until the first record lands or the grace period gives up on one ever
//! arriving, so an empty room and a slow backfill look different to the UI.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use tidepool_shared::StoreRecord;
use tidepool_store::{Debounce, GraceTimer, OrderPolicy, RecordStore};
use tidepool_sync::{Subscription, SyncGateway};

use crate::error::Result;

/// Loading phase of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    /// Nothing shown yet; the backfill may still be in flight.
    Loading,
    /// A record arrived, or the grace period expired on an empty room.
    Ready,
}

/// Snapshot plus phase, as published to watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView<R> {
    pub phase: FeedPhase,
    pub records: Vec<R>,
}

impl<R> FeedView<R> {
    fn loading() -> Self {
        Self {
            phase: FeedPhase::Loading,
            records: Vec::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FeedPhase::Loading
    }
}

/// Handle to one running feed task.
///
/// Dropping the handle tears the task down; [`stop`](FeedHandle::stop)
/// does the same but waits for it to finish, guaranteeing no snapshot is
/// published afterwards.
pub struct FeedHandle<R: StoreRecord> {
    view_rx: watch::Receiver<FeedView<R>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<R: StoreRecord + Sync> FeedHandle<R> {
    /// Subscribe to `collection` and spawn the reconciliation task.
    pub async fn start(
        gateway: &dyn SyncGateway,
        collection: &str,
        order: OrderPolicy,
        debounce_window: Duration,
        loading_grace: Duration,
    ) -> Result<Self> {
        let subscription = gateway.subscribe_all(collection).await?;
        let (view_tx, view_rx) = watch::channel(FeedView::loading());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_feed(
            subscription,
            order,
            debounce_window,
            loading_grace,
            view_tx,
            shutdown_rx,
            collection.to_string(),
        ));
        Ok(Self {
            view_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Watch handle for published views.
    pub fn watch(&self) -> watch::Receiver<FeedView<R>> {
        self.view_rx.clone()
    }

    /// Latest published view.
    pub fn current(&self) -> FeedView<R> {
        self.view_rx.borrow().clone()
    }

    /// Detach from the collection and wait for the task to wind down.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<R: StoreRecord> Drop for FeedHandle<R> {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn run_feed<R: StoreRecord>(
    mut subscription: Subscription,
    order: OrderPolicy,
    debounce_window: Duration,
    loading_grace: Duration,
    view_tx: watch::Sender<FeedView<R>>,
    mut shutdown: oneshot::Receiver<()>,
    collection: String,
) {
    let mut store: RecordStore<R> = RecordStore::new(order);
    let mut phase = FeedPhase::Loading;

    let (flush_tx, mut flush_rx) = mpsc::unbounded_channel();
    let debounce = Debounce::new(debounce_window, move || {
        let _ = flush_tx.send(());
    });

    let (grace_tx, mut grace_rx) = mpsc::unbounded_channel();
    let mut grace = Some(GraceTimer::once(loading_grace, move || {
        let _ = grace_tx.send(());
    }));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            update = subscription.recv() => match update {
                Some(update) => {
                    if !store.absorb(&update.key, &update.value).changed() {
                        continue;
                    }
                    if phase == FeedPhase::Loading {
                        // first real record: end the loading phase right
                        // away instead of making it wait out the debounce
                        phase = FeedPhase::Ready;
                        if let Some(mut timer) = grace.take() {
                            timer.cancel();
                        }
                        publish(&view_tx, phase, &store);
                    } else {
                        debounce.schedule();
                    }
                }
                None => {
                    debug!(collection, "subscription closed by backend");
                    break;
                }
            },

            Some(_) = flush_rx.recv() => {
                publish(&view_tx, phase, &store);
            }

            Some(_) = grace_rx.recv() => {
                if phase == FeedPhase::Loading {
                    phase = FeedPhase::Ready;
                    publish(&view_tx, phase, &store);
                }
            }
        }
    }
    debug!(collection, "feed stopped");
}

fn publish<R: StoreRecord>(
    view_tx: &watch::Sender<FeedView<R>>,
    phase: FeedPhase,
    store: &RecordStore<R>,
) {
    let records = store.snapshot();
    trace!(count = records.len(), "feed snapshot published");
    let _ = view_tx.send(FeedView { phase, records });
}
