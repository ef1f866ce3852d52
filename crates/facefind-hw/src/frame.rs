//! Frame type and pixel conversions: YUYV/GREY/MJPG to RGB, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};

/// A captured colour camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode as baseline JPEG at `quality` (clamped to 1–100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        encode_jpeg(&self.image, quality)
    }
}

/// Encode an RGB image as JPEG at `quality` (clamped to 1–100).
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    Ok(out)
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// Each 4-byte group [Y0, U, Y1, V] yields two pixels sharing chroma.
/// BT.601 limited-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for group in yuyv[..expected].chunks_exact(4) {
        let u = group[1] as f32 - 128.0;
        let v = group[3] as f32 - 128.0;
        for y in [group[0], group[2]] {
            let c = 1.164 * (y as f32 - 16.0);
            rgb.push(channel(c + 1.596 * v));
            rgb.push(channel(c - 0.392 * u - 0.813 * v));
            rgb.push(channel(c + 2.017 * u));
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Expand 8-bit grayscale to RGB.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }
    let rgb: Vec<u8> = grey[..pixels].iter().flat_map(|&p| [p, p, p]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected: pixels,
        actual: grey.len(),
    })
}

/// Decode a motion-JPEG buffer.
pub fn mjpeg_to_rgb(buf: &[u8]) -> Result<RgbImage, FrameError> {
    image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map(|img| img.to_rgb8())
        .map_err(|e| FrameError::Decode(e.to_string()))
}

fn channel(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("JPEG decode failed: {0}")]
    Decode(String),
    #[error("JPEG encode failed: {0}")]
    Encode(String),
}
