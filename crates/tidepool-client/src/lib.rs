//! # tidepool-client
//!
//! The embeddable chatroom session: reconciled message and gallery feeds,
//! liveness verdicts, transient notices, and the send paths, all running
//! against a pluggable sync gateway.

pub mod config;
pub mod feed;
pub mod logging;
pub mod notices;
pub mod session;

mod error;

pub use config::ChatroomConfig;
pub use error::{ClientError, Result};
pub use feed::{FeedHandle, FeedPhase, FeedView};
pub use notices::{Notice, NoticeBoard};
pub use session::Chatroom;
