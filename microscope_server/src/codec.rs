//! Conversions between the base64 text carried on the wire and decoded RGB
//! frames.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, ImageError, RgbImage};
use thiserror::Error;

pub type Frame = RgbImage;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Failed to decode image: {0}")]
    DecodeImage(ImageError),
    #[error("Cannot encode an empty frame")]
    EmptyFrame,
    #[error("Failed to encode image: {0}")]
    EncodeImage(ImageError),
}

impl CodecError {
    pub fn is_decode(&self) -> bool {
        matches!(self, CodecError::InvalidBase64(_) | CodecError::DecodeImage(_))
    }
}

/// Decodes base64 image text. A leading `data:<mime>;base64,` prefix is accepted.
pub fn decode(text: &str) -> Result<Frame, CodecError> {
    let text = text.trim();
    let payload = match text.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => text,
    };
    let bytes = BASE64.decode(payload)?;
    decode_bytes(&bytes)
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Frame, CodecError> {
    let image = image::load_from_memory(bytes).map_err(CodecError::DecodeImage)?;
    Ok(image.to_rgb8())
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CodecError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CodecError::EmptyFrame);
    }
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(frame)
        .map_err(CodecError::EncodeImage)?;
    Ok(buf)
}

pub fn encode(frame: &Frame, quality: u8) -> Result<String, CodecError> {
    let jpeg = encode_jpeg(frame, quality)?;
    Ok(BASE64.encode(jpeg))
}

/// Target size with the longer side capped at `max_dimension`, or `None`
/// when the frame already fits. The shorter side is truncated, never below 1.
pub fn bounded_size(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }
    let max = max_dimension as u64;
    let (width, height) = (width as u64, height as u64);
    let (new_width, new_height) = if width > height {
        (max, max * height / width)
    } else {
        (max * width / height, max)
    };
    Some((new_width.max(1) as u32, new_height.max(1) as u32))
}

pub fn resize_to_bound(frame: Frame, max_dimension: u32) -> Frame {
    match bounded_size(frame.width(), frame.height(), max_dimension) {
        Some((width, height)) => {
            image::imageops::resize(&frame, width, height, FilterType::Lanczos3)
        }
        None => frame,
    }
}
