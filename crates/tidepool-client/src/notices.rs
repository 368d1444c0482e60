//! Transient user-facing notices.
//!
//! Failures that happen after a send was accepted have no caller left to
//! return an error to, so they surface here: posted once, readable while
//! their TTL lasts, then silently gone.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// One transient notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
}

/// Fixed-TTL notice board shared across a session.
#[derive(Clone)]
pub struct NoticeBoard {
    ttl: Duration,
    entries: Arc<Mutex<Vec<(Instant, Notice)>>>,
    tx: broadcast::Sender<Notice>,
}

impl NoticeBoard {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            ttl,
            entries: Arc::new(Mutex::new(Vec::new())),
            tx,
        }
    }

    /// Post a notice.  It stays active for the configured TTL and goes out
    /// to every live subscriber immediately.
    pub fn post(&self, text: impl Into<String>) {
        let notice = Notice { text: text.into() };
        debug!(text = %notice.text, "notice posted");
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            entries.retain(|(expires_at, _)| *expires_at > now);
            entries.push((now + self.ttl, notice.clone()));
        }
        let _ = self.tx.send(notice);
    }

    /// Notices still inside their TTL, oldest first.
    pub fn active(&self) -> Vec<Notice> {
        let now = Instant::now();
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.retain(|(expires_at, _)| *expires_at > now);
                entries.iter().map(|(_, notice)| notice.clone()).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Live stream of notices as they are posted.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn notices_expire_after_their_ttl() {
        let board = NoticeBoard::new(Duration::from_millis(100));

        board.post("send failed");
        assert_eq!(board.active().len(), 1);

        time::sleep(Duration::from_millis(50)).await;
        board.post("still failing");
        assert_eq!(board.active().len(), 2);

        time::sleep(Duration::from_millis(60)).await;
        let active = board.active();
        assert_eq!(active.len(), 1, "first notice aged out");
        assert_eq!(active[0].text, "still failing");

        time::sleep(Duration::from_millis(60)).await;
        assert!(board.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_hear_posts_as_they_happen() {
        let board = NoticeBoard::new(Duration::from_millis(100));
        let mut rx = board.subscribe();

        board.post("image failed to send");
        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.text, "image failed to send");
    }
}
