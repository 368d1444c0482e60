//! Decides whether writes are actually leaving this device.
//!
//! The graph layer accepts puts even with no peer on the other end, so a
//! client that only watches its own calls succeed can believe it is chatting
//! with the world while talking to its own disk.  The tracker combines two
//! evidence sources: transport peer events from the gateway, and a bounded
//! budget of write-then-read probes against a scratch node.  Verdicts are
//! published on a watch channel as [`LivenessState`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tidepool_shared::{constants, now_millis, PeerId};

use crate::gateway::{GatewayError, PeerEvent, SyncGateway};

/// Whether recent evidence says our writes reach anyone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// At least one peer, or a successful probe round-trip, confirms
    /// replication.
    Synced,
    /// No reachable peer.  Writes stay on this device until one appears.
    LocalOnly,
}

/// Snapshot published by the tracker after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessState {
    /// Reachable peers, including the synthetic probe peer while a probe
    /// round-trip stands as the only evidence.
    pub peers: BTreeSet<PeerId>,
    pub status: SyncStatus,
}

impl LivenessState {
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_synced(&self) -> bool {
        self.status == SyncStatus::Synced
    }
}

impl Default for LivenessState {
    fn default() -> Self {
        Self {
            peers: BTreeSet::new(),
            status: SyncStatus::LocalOnly,
        }
    }
}

/// Tuning knobs for the tracker.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often to probe while budget remains.  Default 2s.
    pub probe_interval: Duration,
    /// Probe budget for the tracker's lifetime.  Default 5.
    pub probe_attempts: u32,
    /// Per-call deadline for the probe put and get.  Default 1s.
    pub probe_timeout: Duration,
    /// How long to stay `Synced` after the last peer drops, riding out
    /// transport flaps.  Default 500ms.
    pub demote_grace: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(constants::PROBE_INTERVAL_MS),
            probe_attempts: constants::PROBE_ATTEMPTS,
            probe_timeout: Duration::from_millis(constants::PROBE_TIMEOUT_MS),
            demote_grace: Duration::from_millis(constants::DEMOTE_GRACE_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// Peer bookkeeping
// ---------------------------------------------------------------------------

struct PeerTracker {
    peers: HashSet<PeerId>,
}

impl PeerTracker {
    fn new() -> Self {
        Self {
            peers: HashSet::new(),
        }
    }

    /// Record a reachable peer.  Returns `true` if it was not already known.
    fn mark_connected(&mut self, peer: PeerId) -> bool {
        if self.peers.contains(&peer) {
            return false;
        }
        debug!(peer = %peer, "peer connected");
        self.peers.insert(peer);
        true
    }

    /// Forget a peer.  Returns `true` if it was known.
    fn mark_disconnected(&mut self, peer: &PeerId) -> bool {
        let removed = self.peers.remove(peer);
        if removed {
            debug!(peer = %peer, "peer disconnected");
        }
        removed
    }

    fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn snapshot(&self) -> BTreeSet<PeerId> {
        self.peers.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tracker task
// ---------------------------------------------------------------------------

/// Handle to the spawned liveness task.
///
/// The task runs from [`start`](LivenessTracker::start) until
/// [`stop`](LivenessTracker::stop); dropping the handle aborts it.
pub struct LivenessTracker {
    state_rx: watch::Receiver<LivenessState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LivenessTracker {
    /// Spawn the tracker against `gateway`.
    pub fn start(gateway: Arc<dyn SyncGateway>, config: LivenessConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(LivenessState::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        // subscribe before spawning so no event can slip past startup
        let events = gateway.peer_events();
        let task = tokio::spawn(run(gateway, config, state_tx, events, shutdown_rx));
        Self {
            state_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Watch handle for state changes.
    pub fn watch(&self) -> watch::Receiver<LivenessState> {
        self.state_rx.clone()
    }

    /// Latest published state.
    pub fn current(&self) -> LivenessState {
        self.state_rx.borrow().clone()
    }

    /// Stop the tracker and wait for its task to wind down.  No probe is
    /// issued and no state published after this returns.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LivenessTracker {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn run(
    gateway: Arc<dyn SyncGateway>,
    config: LivenessConfig,
    state_tx: watch::Sender<LivenessState>,
    mut events: broadcast::Receiver<PeerEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut tracker = PeerTracker::new();
    let mut status = SyncStatus::LocalOnly;
    let mut probes_sent = 0u32;
    let mut demote_at: Option<Instant> = None;

    let mut probe_tick = time::interval_at(
        Instant::now() + config.probe_interval,
        config.probe_interval,
    );
    probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            event = events.recv() => match event {
                Ok(PeerEvent::Connected(peer)) => {
                    if tracker.mark_connected(peer) {
                        demote_at = None;
                        if status != SyncStatus::Synced {
                            status = SyncStatus::Synced;
                            info!("peer reachable, marking synced");
                        }
                        publish(&state_tx, &tracker, status);
                    }
                }
                Ok(PeerEvent::Disconnected(peer)) => {
                    if tracker.mark_disconnected(&peer) {
                        if tracker.is_empty() && status == SyncStatus::Synced {
                            demote_at = Some(Instant::now() + config.demote_grace);
                        }
                        publish(&state_tx, &tracker, status);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "peer event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },

            _ = probe_tick.tick(), if probes_sent < config.probe_attempts => {
                probes_sent += 1;
                let outcome = probe_round_trip(gateway.as_ref(), config.probe_timeout).await;
                match outcome {
                    Ok(true) => {
                        if tracker.mark_connected(PeerId::probe()) {
                            demote_at = None;
                            if status != SyncStatus::Synced {
                                status = SyncStatus::Synced;
                                info!(probe = probes_sent, "probe round-trip succeeded, marking synced");
                            }
                            publish(&state_tx, &tracker, status);
                        }
                    }
                    Ok(false) | Err(_) => {
                        if let Err(err) = outcome {
                            debug!(probe = probes_sent, error = %err, "probe failed");
                        } else {
                            debug!(probe = probes_sent, "probe read came back empty");
                        }
                        // only withdraw the probe's own evidence; real peers
                        // are vouched for by transport events
                        if tracker.mark_disconnected(&PeerId::probe()) {
                            if tracker.is_empty() && status == SyncStatus::Synced {
                                demote_at = Some(Instant::now() + config.demote_grace);
                            }
                            publish(&state_tx, &tracker, status);
                        }
                    }
                }
            }

            _ = wait_until(demote_at) => {
                demote_at = None;
                if tracker.is_empty() && status == SyncStatus::Synced {
                    status = SyncStatus::LocalOnly;
                    info!("no peers within grace period, marking local-only");
                    publish(&state_tx, &tracker, status);
                }
            }
        }
    }
    debug!("liveness tracker stopped");
}

fn publish(state_tx: &watch::Sender<LivenessState>, tracker: &PeerTracker, status: SyncStatus) {
    let _ = state_tx.send(LivenessState {
        peers: tracker.snapshot(),
        status,
    });
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Write a scratch node and read it back, both under `timeout`.
///
/// `Ok(true)` means the backend answered on both legs, which is the same
/// evidence of reachability a transport peer event gives us.
async fn probe_round_trip(
    gateway: &dyn SyncGateway,
    timeout: Duration,
) -> Result<bool, GatewayError> {
    let payload = serde_json::json!({
        "at": now_millis(),
        "nonce": rand::random::<u32>(),
    });
    time::timeout(timeout, gateway.put(constants::PROBE_PATH, payload))
        .await
        .map_err(|_| GatewayError::Timeout)??;
    let read = time::timeout(timeout, gateway.get(constants::PROBE_PATH))
        .await
        .map_err(|_| GatewayError::Timeout)??;
    Ok(read.is_some())
}
