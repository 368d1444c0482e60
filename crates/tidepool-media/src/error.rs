use thiserror::Error;

/// Errors produced by the encoding pipeline.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The upload's MIME type is not in the supported set.
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    /// The upload exceeds the raw size ceiling.
    #[error("Image is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    /// The bytes did not decode as an image.
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// Re-encoding at some quality failed.
    #[error("Image encode error: {0}")]
    Encode(image::ImageError),

    /// Generic I/O error (e.g. reading the upload from disk).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking encode task was cancelled or panicked.
    #[error("Encode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MediaError>;
