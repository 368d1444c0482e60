//! One chatroom session wired end to end.
//!
//! [`Chatroom`] owns the two feeds, the liveness tracker, and the notice
//! board.  Sends go straight to the gateway; the sender's own feed picks
//! the record up through the subscription echo, exactly like everyone
//! else's records, so there is no separate local-append path to keep
//! consistent.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use tidepool_media::{encode_to_data_uri, validate_upload, EncodedImage, MediaError};
use tidepool_shared::{constants, GalleryImage, Message, RecordId, StoreRecord, UserProfile};
use tidepool_store::OrderPolicy;
use tidepool_sync::{LivenessState, LivenessTracker, SyncGateway};

use crate::config::ChatroomConfig;
use crate::error::{ClientError, Result};
use crate::feed::{FeedHandle, FeedView};
use crate::notices::NoticeBoard;

/// A live chatroom session.
pub struct Chatroom {
    gateway: Arc<dyn SyncGateway>,
    profile: UserProfile,
    config: ChatroomConfig,
    messages: FeedHandle<Message>,
    images: FeedHandle<GalleryImage>,
    liveness: LivenessTracker,
    notices: NoticeBoard,
}

impl Chatroom {
    /// Join the room: attach both feeds and start the liveness tracker.
    pub async fn start(
        gateway: Arc<dyn SyncGateway>,
        profile: UserProfile,
        config: ChatroomConfig,
    ) -> Result<Self> {
        let messages = FeedHandle::start(
            gateway.as_ref(),
            constants::MESSAGES_PATH,
            OrderPolicy::OldestFirst,
            config.debounce_window,
            config.loading_grace,
        )
        .await?;
        let images = FeedHandle::start(
            gateway.as_ref(),
            constants::IMAGES_PATH,
            OrderPolicy::NewestFirst,
            config.debounce_window,
            config.loading_grace,
        )
        .await?;
        let liveness = LivenessTracker::start(Arc::clone(&gateway), config.liveness.clone());
        let notices = NoticeBoard::new(config.notice_ttl);

        info!(
            user = profile.label.as_deref().unwrap_or("anonymous"),
            "chatroom session started"
        );
        Ok(Self {
            gateway,
            profile,
            config,
            messages,
            images,
            liveness,
            notices,
        })
    }

    /// The message feed, oldest first.
    pub fn messages(&self) -> watch::Receiver<FeedView<Message>> {
        self.messages.watch()
    }

    /// The gallery feed, newest first.
    pub fn images(&self) -> watch::Receiver<FeedView<GalleryImage>> {
        self.images.watch()
    }

    /// Liveness verdicts for this session.
    pub fn liveness(&self) -> watch::Receiver<LivenessState> {
        self.liveness.watch()
    }

    /// Transient error notices.
    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    /// The local writer's profile.
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Post a message.
    ///
    /// Returns the id the record was stamped with.  A gateway failure does
    /// not fail the call; it is posted to the notice board, because by then
    /// the send already happened from the caller's point of view.
    pub async fn send_message(&self, text: &str) -> Result<RecordId> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let record = Message::new(&self.profile, trimmed);
        debug!(id = %record.id, "sending message");
        Ok(self
            .put_record(constants::MESSAGES_PATH, &record, "Message only saved locally")
            .await)
    }

    /// Validate, encode, and post an image.
    ///
    /// Upload problems are returned as typed errors and also posted to the
    /// notice board, so embedders that only render notices still tell the
    /// user what went wrong.
    pub async fn send_image(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<RecordId> {
        let encoded = match self.encode_upload(mime, bytes).await {
            Ok(encoded) => encoded,
            Err(err) => {
                self.notices.post(media_notice(&err));
                return Err(err.into());
            }
        };
        debug!(
            file = file_name,
            bytes = encoded.estimated_bytes,
            quality = encoded.quality,
            "image encoded"
        );

        let record = GalleryImage::new(
            &self.profile,
            encoded.data_uri,
            Some(file_name.to_string()),
        );
        Ok(self
            .put_record(constants::IMAGES_PATH, &record, "Image only saved locally")
            .await)
    }

    /// Leave the room.  Feeds detach, the liveness tracker stops, and no
    /// timer fires or snapshot publishes after this returns.
    pub async fn stop(self) {
        self.messages.stop().await;
        self.images.stop().await;
        self.liveness.stop().await;
        debug!("chatroom session stopped");
    }

    async fn encode_upload(
        &self,
        mime: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<EncodedImage, MediaError> {
        validate_upload(mime, bytes.len())?;
        let options = self.config.encode.clone();
        tokio::task::spawn_blocking(move || encode_to_data_uri(&bytes, &options))
            .await
            .map_err(MediaError::Task)?
    }

    async fn put_record<R: StoreRecord>(
        &self,
        collection: &str,
        record: &R,
        failure_notice: &str,
    ) -> RecordId {
        let id = record.id().clone();
        let path = constants::record_path(collection, id.as_str());
        if let Err(err) = self.gateway.put(&path, record.to_raw()).await {
            warn!(path = %path, error = %err, "record put failed");
            self.notices.post(failure_notice);
        }
        id
    }
}

fn media_notice(err: &MediaError) -> &'static str {
    match err {
        MediaError::UnsupportedType(_) => "Only JPEG, PNG, GIF, or WebP images can be shared",
        MediaError::TooLarge { .. } => "Images must be under 5 MB",
        _ => "Image could not be processed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use image::{ImageBuffer, Rgb};
    use serde_json::json;
    use tokio::time;

    use crate::feed::FeedPhase;
    use tidepool_shared::PeerId;
    use tidepool_sync::{LivenessConfig, MemoryHub};

    fn fast_config() -> ChatroomConfig {
        ChatroomConfig {
            debounce_window: Duration::from_millis(10),
            loading_grace: Duration::from_millis(100),
            notice_ttl: Duration::from_millis(500),
            liveness: LivenessConfig {
                probe_interval: Duration::from_millis(10),
                probe_attempts: 2,
                probe_timeout: Duration::from_millis(50),
                demote_grace: Duration::from_millis(30),
            },
            ..ChatroomConfig::default()
        }
    }

    async fn join(hub: &MemoryHub, label: &str, key: &str) -> Chatroom {
        Chatroom::start(
            Arc::new(hub.gateway()),
            UserProfile::new(label, key),
            fast_config(),
        )
        .await
        .expect("session starts")
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut cursor = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[tokio::test(start_paused = true)]
    async fn messages_reach_every_client_in_order() {
        let hub = MemoryHub::new();
        let alice = join(&hub, "Alice", "uid-a").await;
        let bob = join(&hub, "Bob", "uid-b").await;

        alice.send_message("hello").await.unwrap();
        bob.send_message("hi yourself").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;

        let view = bob.messages().borrow().clone();
        assert_eq!(view.phase, FeedPhase::Ready);
        let texts: Vec<&str> = view.records.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["hello", "hi yourself"]);
        assert_eq!(view.records[0].sender_label.as_deref(), Some("Alice"));

        // the sender's own feed converges on the same contents via the echo
        assert_eq!(alice.messages().borrow().records, view.records);

        alice.stop().await;
        bob.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_late_joiner_backfills_existing_history() {
        let hub = MemoryHub::new();
        let alice = join(&hub, "Alice", "uid-a").await;

        alice.send_message("first").await.unwrap();
        // wall-clock stamps must differ for the backfill sort to be decisive
        std::thread::sleep(Duration::from_millis(3));
        alice.send_message("second").await.unwrap();

        let bob = join(&hub, "Bob", "uid-b").await;
        time::sleep(Duration::from_millis(50)).await;

        let view = bob.messages().borrow().clone();
        assert_eq!(view.phase, FeedPhase::Ready);
        let texts: Vec<&str> = view.records.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);

        alice.stop().await;
        bob.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_nodes_never_surface() {
        let hub = MemoryHub::new();
        let gateway = hub.gateway();
        gateway
            .put("chatroom/messages/junk", json!({ "note": "partial" }))
            .await
            .unwrap();

        let room = join(&hub, "Alice", "uid-a").await;
        room.send_message("real").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;

        let view = room.messages().borrow().clone();
        assert_eq!(view.records.len(), 1);
        assert_eq!(view.records[0].text, "real");

        room.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn an_empty_room_goes_ready_after_the_grace_period() {
        let hub = MemoryHub::new();
        let room = join(&hub, "Alice", "uid-a").await;

        assert!(room.messages().borrow().is_loading());

        time::sleep(Duration::from_millis(150)).await;
        let view = room.messages().borrow().clone();
        assert_eq!(view.phase, FeedPhase::Ready);
        assert!(view.records.is_empty());

        room.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn whitespace_messages_are_rejected() {
        let hub = MemoryHub::new();
        let room = join(&hub, "Alice", "uid-a").await;

        let err = room.send_message("   \n\t ").await;
        assert!(matches!(err, Err(ClientError::EmptyMessage)));

        time::sleep(Duration::from_millis(150)).await;
        assert!(room.messages().borrow().records.is_empty());

        room.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sends_surface_as_notices_not_errors() {
        let hub = MemoryHub::new();
        let room = join(&hub, "Alice", "uid-a").await;
        hub.set_offline(true);

        let mut notices = room.notices().subscribe();
        let id = room.send_message("into the void").await.unwrap();
        assert!(!id.as_str().is_empty(), "record was stamped regardless");

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.text, "Message only saved locally");
        assert_eq!(room.notices().active().len(), 1);

        // the put never landed, so no echo and no record
        time::sleep(Duration::from_millis(150)).await;
        assert!(room.messages().borrow().records.is_empty());

        room.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn images_arrive_newest_first_with_encoded_payloads() {
        let hub = MemoryHub::new();
        let alice = join(&hub, "Alice", "uid-a").await;
        let bob = join(&hub, "Bob", "uid-b").await;

        alice
            .send_image("one.png", "image/png", png_bytes(600, 400))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(3));
        alice
            .send_image("two.png", "image/png", png_bytes(300, 200))
            .await
            .unwrap();
        time::sleep(Duration::from_millis(50)).await;

        let view = bob.images().borrow().clone();
        let names: Vec<_> = view
            .records
            .iter()
            .map(|i| i.original_file_name.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(names, ["two.png", "one.png"]);
        assert!(view.records[0]
            .encoded_payload
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(view.records[0].uploader_label.as_deref(), Some("Alice"));

        alice.stop().await;
        bob.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn bad_uploads_are_rejected_before_anything_is_sent() {
        let hub = MemoryHub::new();
        let room = join(&hub, "Alice", "uid-a").await;
        let puts_before = hub.put_count();

        let err = room
            .send_image("notes.pdf", "application/pdf", vec![1, 2, 3])
            .await;
        assert!(matches!(
            err,
            Err(ClientError::Media(MediaError::UnsupportedType(_)))
        ));

        let err = room
            .send_image(
                "huge.png",
                "image/png",
                vec![0u8; constants::MAX_UPLOAD_BYTES + 1],
            )
            .await;
        assert!(matches!(
            err,
            Err(ClientError::Media(MediaError::TooLarge { .. }))
        ));

        // both failures are also explained on the notice board
        let texts: Vec<String> = room
            .notices()
            .active()
            .into_iter()
            .map(|n| n.text)
            .collect();
        assert_eq!(
            texts,
            [
                "Only JPEG, PNG, GIF, or WebP images can be shared",
                "Images must be under 5 MB",
            ]
        );
        assert_eq!(hub.put_count(), puts_before, "nothing reached the gateway");

        room.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_flows_through_the_session() {
        let hub = MemoryHub::new();
        let room = join(&hub, "Alice", "uid-a").await;

        time::sleep(Duration::from_millis(20)).await;
        assert!(room.liveness().borrow().is_synced(), "probe round-trip");

        hub.connect_peer("relay-7");
        time::sleep(Duration::from_millis(5)).await;
        let state = room.liveness().borrow().clone();
        assert!(state.peers.contains(&PeerId::from("relay-7")));

        room.stop().await;
        let puts = hub.put_count();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.put_count(), puts, "no probes after stop");
    }
}
