//! Two sessions sharing an in-memory hub.
//!
//! Run with: `cargo run -p tidepool-client --example local_room`

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use tidepool_client::{Chatroom, ChatroomConfig};
use tidepool_shared::UserProfile;
use tidepool_sync::MemoryHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tidepool_client::logging::init();

    let hub = MemoryHub::new();

    let alice = Chatroom::start(
        Arc::new(hub.gateway()),
        UserProfile::new("Alice", "demo-alice"),
        ChatroomConfig::default(),
    )
    .await?;
    let bob = Chatroom::start(
        Arc::new(hub.gateway()),
        UserProfile::new("Bob", "demo-bob"),
        ChatroomConfig::default(),
    )
    .await?;
    // sessions subscribe to peer events at start; announce the relay once
    // someone is listening
    hub.connect_peer("demo-relay");

    alice.send_message("anyone here?").await?;
    bob.send_message("just us").await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let transcript = bob.messages().borrow().clone();
    for message in &transcript.records {
        let own = bob.profile().authored(message.sender_key.as_deref());
        info!(
            from = message.sender_label.as_deref().unwrap_or("?"),
            own,
            text = %message.text,
            "message"
        );
    }

    let liveness = alice.liveness().borrow().clone();
    info!(status = ?liveness.status, peers = liveness.peer_count(), "session liveness");

    alice.stop().await;
    bob.stop().await;
    Ok(())
}
