use thiserror::Error;

use tidepool_media::MediaError;
use tidepool_sync::GatewayError;

/// Errors surfaced to the embedding UI.
///
/// Only synchronous failures land here.  A put that fails after the record
/// was stamped is reported through the notice board instead, because the
/// send itself already happened from the caller's point of view.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Message text was empty after trimming.
    #[error("Message is empty")]
    EmptyMessage,

    /// Upload validation or encoding failed.
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// The sync layer refused a call during session setup.
    #[error("Sync error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
