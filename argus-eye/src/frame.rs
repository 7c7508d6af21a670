//! Frame decoding

use argus_core::{ProctorError, Result};
use image::RgbImage;
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest accepted frame (8K)
pub const MAX_FRAME_WIDTH: u32 = 7680;
pub const MAX_FRAME_HEIGHT: u32 = 4320;

/// Decode a JPEG/PNG payload into an RGB frame
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(ProctorError::Decode("Empty frame payload".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| ProctorError::Decode(e.to_string()))?;

    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(ProctorError::Decode("Frame has zero size".to_string()));
    }
    if width > MAX_FRAME_WIDTH || height > MAX_FRAME_HEIGHT {
        return Err(ProctorError::Decode(format!(
            "Frame too large: {}x{} (max {}x{})",
            width, height, MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT
        )));
    }

    Ok(image.to_rgb8())
}

/// Wall-clock seconds, used when a frame arrives without a timestamp
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
