//! Upload validation and the scale-then-requantize encode loop.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use tidepool_shared::constants;

use crate::error::{MediaError, Result};

/// Image container formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl SupportedFormat {
    /// Map a browser-style MIME type onto a format, or `None` when the
    /// type is not accepted.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Identify the container from its magic bytes, for callers without a
    /// trustworthy MIME string.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            return Some(Self::Png);
        }
        if bytes.starts_with(b"GIF8") {
            return Some(Self::Gif);
        }
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }
        None
    }
}

/// Gate an upload before any decoding happens: the MIME type must be in
/// the supported set and the raw size under the ceiling.
pub fn validate_upload(mime: &str, size: usize) -> Result<SupportedFormat> {
    let format = SupportedFormat::from_mime(mime)
        .ok_or_else(|| MediaError::UnsupportedType(mime.to_string()))?;
    if size > constants::MAX_UPLOAD_BYTES {
        return Err(MediaError::TooLarge {
            size,
            limit: constants::MAX_UPLOAD_BYTES,
        });
    }
    Ok(format)
}

/// Tuning for the encode pipeline.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Bounding-box width after scaling.  Default 500.
    pub max_width: u32,
    /// Bounding-box height after scaling.  Default 500.
    pub max_height: u32,
    /// Budget for the decoded size of the base64 payload, in KiB.
    /// Default 200.
    pub max_encoded_kb: usize,
    /// JPEG quality of the first attempt.  Default 90.
    pub start_quality: u8,
    /// Quality drop between attempts; values below 1 are treated as 1.
    /// Default 10.
    pub quality_step: u8,
    /// Lowest quality tried; that attempt is returned even when it still
    /// overruns the budget.  Default 10.
    pub min_quality: u8,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_width: constants::MAX_IMAGE_DIMENSION,
            max_height: constants::MAX_IMAGE_DIMENSION,
            max_encoded_kb: constants::MAX_ENCODED_KB,
            start_quality: 90,
            quality_step: 10,
            min_quality: 10,
        }
    }
}

/// A finished payload, ready to drop into a gallery record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// `data:image/jpeg;base64,` payload.
    pub data_uri: String,
    /// Width after scaling.
    pub width: u32,
    /// Height after scaling.
    pub height: u32,
    /// JPEG quality of the accepted attempt.
    pub quality: u8,
    /// Decoded size of the base64 body, the figure the budget is judged on.
    pub estimated_bytes: usize,
}

/// Fit `(width, height)` inside the bounding box, preserving aspect ratio.
/// Images already inside the box are left alone; nothing is ever upscaled.
fn scaled_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let w = (f64::from(width) * ratio).round() as u32;
    let h = (f64::from(height) * ratio).round() as u32;
    (w.max(1), h.max(1))
}

/// Scale and re-encode `bytes` into a data URI that fits the budget.
///
/// The image is scaled once to the bounding box, then re-encoded as JPEG at
/// descending quality until the estimated wire size fits.  Hitting the
/// quality floor ends the walk regardless, so callers always get a
/// displayable payload back.
pub fn encode_to_data_uri(bytes: &[u8], options: &EncodeOptions) -> Result<EncodedImage> {
    let img = image::load_from_memory(bytes)?;
    let (orig_w, orig_h) = img.dimensions();
    let (width, height) = scaled_dimensions(orig_w, orig_h, options.max_width, options.max_height);

    let frame = if (width, height) == (orig_w, orig_h) {
        img
    } else {
        DynamicImage::ImageRgba8(imageops::resize(&img, width, height, FilterType::Triangle))
    };
    // JPEG carries no alpha channel
    let rgb = frame.to_rgb8();

    let budget = options.max_encoded_kb * 1024;
    // a zero step would stall above the floor and the walk would never end
    let step = options.quality_step.max(1);
    let mut quality = options.start_quality;
    loop {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode_image(&rgb)
            .map_err(MediaError::Encode)?;
        let body = STANDARD.encode(&jpeg);
        // what the payload costs once the receiver decodes it
        let estimated_bytes = body.len() * 3 / 4;

        let fits = estimated_bytes <= budget;
        if fits || quality <= options.min_quality {
            if fits {
                debug!(width, height, quality, estimated_bytes, "image encoded within budget");
            } else {
                warn!(
                    quality,
                    estimated_bytes, budget, "budget unreachable at quality floor"
                );
            }
            return Ok(EncodedImage {
                data_uri: format!("data:image/jpeg;base64,{body}"),
                width,
                height,
                quality,
                estimated_bytes,
            });
        }
        quality = quality.saturating_sub(step).max(options.min_quality);
    }
}

/// Read `path` and run [`encode_to_data_uri`] off the async runtime.
pub async fn encode_file(path: impl AsRef<Path>, options: EncodeOptions) -> Result<EncodedImage> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    tokio::task::spawn_blocking(move || encode_to_data_uri(&bytes, &options)).await?
}
