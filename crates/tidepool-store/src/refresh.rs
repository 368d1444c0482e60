//! Refresh pacing: trailing-edge debounce and one-shot grace timers.
//!
//! Subscription bursts arrive far faster than consumers want to re-render.
//! [`Debounce`] coalesces a burst of schedule calls into a single callback
//! after a quiet window, and [`GraceTimer`] arms a single deadline that can
//! be disarmed when the awaited event shows up first.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

enum Cmd {
    Schedule,
    Cancel,
}

/// Trailing-edge debounce around a callback.
///
/// Every [`schedule`](Debounce::schedule) call re-arms the quiet window; the
/// callback runs once per burst, after the window passes with no new call.
/// Dropping the handle discards any pending run.
pub struct Debounce {
    tx: mpsc::UnboundedSender<Cmd>,
    task: JoinHandle<()>,
}

impl Debounce {
    /// Spawn the timer task.  `window` is the quiet period required before
    /// `callback` runs.
    pub fn new<F>(window: Duration, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            'idle: loop {
                match rx.recv().await {
                    Some(Cmd::Schedule) => {}
                    Some(Cmd::Cancel) => continue 'idle,
                    None => return,
                }
                let mut deadline = Instant::now() + window;
                loop {
                    tokio::select! {
                        _ = time::sleep_until(deadline) => {
                            callback();
                            continue 'idle;
                        }
                        cmd = rx.recv() => match cmd {
                            Some(Cmd::Schedule) => deadline = Instant::now() + window,
                            Some(Cmd::Cancel) => continue 'idle,
                            None => return,
                        },
                    }
                }
            }
        });
        Self { tx, task }
    }

    /// Request a run, re-arming the quiet window.
    pub fn schedule(&self) {
        let _ = self.tx.send(Cmd::Schedule);
    }

    /// Discard any pending run without tearing the timer down.
    pub fn cancel(&self) {
        let _ = self.tx.send(Cmd::Cancel);
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One-shot deadline with explicit disarm.
///
/// Used for "stop waiting eventually" paths, where the normal outcome is
/// that the awaited event arrives first and cancels the timer.
pub struct GraceTimer {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GraceTimer {
    /// Run `callback` once `delay` has elapsed, unless cancelled first.
    pub fn once<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => callback(),
                _ = cancel_rx => {}
            }
        });
        Self {
            cancel: Some(cancel_tx),
            task,
        }
    }

    /// Disarm the timer.  Harmless after it has already fired.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for GraceTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = hits.clone();
        (hits, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_edge_fires_once_per_burst() {
        let (hits, bump) = counter();
        let debounce = Debounce::new(Duration::from_millis(50), bump);

        for _ in 0..4 {
            debounce.schedule();
            time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0, "window keeps re-arming");

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        debounce.schedule();
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2, "debounce is reusable");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_run() {
        let (hits, bump) = counter();
        let debounce = Debounce::new(Duration::from_millis(50), bump);

        debounce.schedule();
        debounce.cancel();
        time::sleep(Duration::from_millis(200)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_discards_pending_run() {
        let (hits, bump) = counter();
        let debounce = Debounce::new(Duration::from_millis(50), bump);

        debounce.schedule();
        drop(debounce);
        time::sleep(Duration::from_millis(200)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_timer_fires_after_delay() {
        let (hits, bump) = counter();
        let mut timer = GraceTimer::once(Duration::from_millis(100), bump);

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // disarming after the fact is a no-op
        timer.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_grace_timer_never_fires() {
        let (hits, bump) = counter();
        let mut timer = GraceTimer::once(Duration::from_millis(100), bump);

        time::sleep(Duration::from_millis(50)).await;
        timer.cancel();
        time::sleep(Duration::from_millis(200)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
