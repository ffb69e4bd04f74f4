use super::device::RgbFrame;
use crate::error::CaptureError;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::debug;

pub const JPEG_MIME: &str = "image/jpeg";

/// Compressed still produced by a capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPhoto {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub mime: &'static str,
}

/// Draw the frame into an offscreen raster at its own resolution and encode it as JPEG
pub(crate) fn encode_still(frame: RgbFrame, quality: u8) -> Result<CapturedPhoto, CaptureError> {
    if !frame.is_complete() {
        return Err(CaptureError::Frame {
            details: format!(
                "expected {} bytes for {}x{}, got {}",
                RgbFrame::expected_len(frame.width, frame.height),
                frame.width,
                frame.height,
                frame.data.len()
            ),
        });
    }

    let (width, height) = (frame.width, frame.height);
    let raster = RgbImage::from_raw(width, height, frame.data).ok_or_else(|| {
        CaptureError::Encoding {
            details: "frame does not fit raster".to_string(),
        }
    })?;

    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        encoder
            .encode_image(&raster)
            .map_err(|e| CaptureError::Encoding {
                details: e.to_string(),
            })?;
    }

    debug!(
        "Encoded {}x{} still as JPEG ({} bytes, quality {})",
        width,
        height,
        bytes.len(),
        quality
    );

    Ok(CapturedPhoto {
        bytes,
        width,
        height,
        mime: JPEG_MIME,
    })
}
