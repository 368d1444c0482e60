//! # tidepool-media
//!
//! Size-budgeted image encoding for the share-to-gallery flow.
//!
//! The graph layer has no blob storage, so images travel inline as base64
//! data URIs inside ordinary records.  This crate turns an arbitrary upload
//! into a payload that fits the configured budget: scale down to the
//! bounding box, then walk JPEG quality downward until the encoded size
//! fits or the quality floor is hit.

pub mod encode;

mod error;

pub use encode::{
    encode_file, encode_to_data_uri, validate_upload, EncodeOptions, EncodedImage,
    SupportedFormat,
};
pub use error::MediaError;
