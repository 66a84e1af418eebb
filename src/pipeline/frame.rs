use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::metadata::ImageMetadata;

/// Pixel formats delivered by the drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Mono8,
    Rgb24,
    Bgr24,
    Yuyv,
    /// Raw Bayer mosaic; captured and persisted upstream formats only,
    /// not convertible to a preview here.
    BayerRg8,
}

impl PixelFormat {
    /// Payload size in bytes for a tightly packed width x height image.
    pub fn payload_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Mono8 | Self::BayerRg8 => pixels,
            Self::Yuyv => pixels * 2,
            Self::Rgb24 | Self::Bgr24 => pixels * 3,
        }
    }
}

/// A frame as handed over by the driver inside the delivery callback.
///
/// The pixel buffer is owned by the driver and is only valid for the
/// duration of the callback; anything that outlives the callback must deep
/// copy it. `CapturedFrame::from_raw` is that copy.
pub struct RawImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub metadata: ImageMetadata,
}

/// An owned frame, produced once per hardware notification.
///
/// Immutable once constructed; `data` is cheap to share across workers.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub serial: u32,
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
    pub metadata: ImageMetadata,
}

impl CapturedFrame {
    /// Deep-copy a driver-owned image into an owned frame.
    pub fn from_raw(
        serial: u32,
        sequence: u64,
        timestamp: DateTime<Local>,
        raw: &RawImage<'_>,
    ) -> Self {
        Self {
            serial,
            sequence,
            timestamp,
            width: raw.width,
            height: raw.height,
            format: raw.format,
            data: Bytes::copy_from_slice(raw.data),
            metadata: raw.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_owns_a_copy_of_the_payload() {
        let payload = vec![1u8, 2, 3, 4];
        let raw = RawImage {
            data: &payload,
            width: 2,
            height: 2,
            format: PixelFormat::Mono8,
            metadata: ImageMetadata::default(),
        };
        let frame = CapturedFrame::from_raw(7, 1, Local::now(), &raw);
        drop(payload);
        assert_eq!(&frame.data[..], &[1, 2, 3, 4]);
        assert_eq!(frame.serial, 7);
        assert_eq!(frame.sequence, 1);
    }

    #[test]
    fn payload_len_matches_format_packing() {
        assert_eq!(PixelFormat::Mono8.payload_len(4, 2), 8);
        assert_eq!(PixelFormat::Yuyv.payload_len(4, 2), 16);
        assert_eq!(PixelFormat::Rgb24.payload_len(4, 2), 24);
        assert_eq!(PixelFormat::Bgr24.payload_len(4, 2), 24);
        assert_eq!(PixelFormat::BayerRg8.payload_len(4, 2), 8);
    }
}
