//! Raw payload to display-ready RGB24 conversion.

use image::RgbImage;
use thiserror::Error;

use super::frame::PixelFormat;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unsupported source pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("payload of {actual} bytes does not match {width}x{height} {format:?} ({expected} bytes)")]
    PayloadSize {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Convert a raw frame payload to RGB24.
pub fn to_rgb24(
    data: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<RgbImage, ConversionError> {
    if let PixelFormat::BayerRg8 = format {
        return Err(ConversionError::UnsupportedFormat(format));
    }
    let expected = format.payload_len(width, height);
    if data.len() != expected {
        return Err(ConversionError::PayloadSize {
            format,
            width,
            height,
            expected,
            actual: data.len(),
        });
    }

    let rgb = match format {
        PixelFormat::Rgb24 => data.to_vec(),
        PixelFormat::Bgr24 => {
            let mut out = data.to_vec();
            for px in out.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            out
        }
        PixelFormat::Mono8 => {
            let mut out = Vec::with_capacity(data.len() * 3);
            for &gray in data {
                out.extend_from_slice(&[gray, gray, gray]);
            }
            out
        }
        PixelFormat::Yuyv => yuyv_to_rgb(data),
        PixelFormat::BayerRg8 => unreachable!("rejected above"),
    };

    // Size was validated against the format, so construction cannot fail.
    Ok(RgbImage::from_raw(width, height, rgb)
        .unwrap_or_else(|| RgbImage::new(width, height)))
}

/// Unpack YUYV 4:2:2 into RGB24. Each [Y0 U Y1 V] quad yields two pixels.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for quad in data.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        let (r, g, b) = yuv_to_rgb(y0, u, v);
        out.extend_from_slice(&[r, g, b]);
        let (r, g, b) = yuv_to_rgb(y1, u, v);
        out.extend_from_slice(&[r, g, b]);
    }
    out
}

/// ITU-R BT.601 YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_14 * u - 0.714_14 * v;
    let b = y + 1.772 * u;

    let clamp = |val: f32| val.clamp(0.0, 255.0) as u8;
    (clamp(r), clamp(g), clamp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb24_passes_through() {
        let data = [10u8, 20, 30, 40, 50, 60];
        let img = to_rgb24(&data, 2, 1, PixelFormat::Rgb24).expect("convert");
        assert_eq!(img.as_raw().as_slice(), &data);
    }

    #[test]
    fn bgr24_swaps_channels() {
        let data = [30u8, 20, 10, 60, 50, 40];
        let img = to_rgb24(&data, 2, 1, PixelFormat::Bgr24).expect("convert");
        assert_eq!(img.as_raw().as_slice(), &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn mono8_expands_to_gray_rgb() {
        let data = [0u8, 128, 255];
        let img = to_rgb24(&data, 3, 1, PixelFormat::Mono8).expect("convert");
        assert_eq!(
            img.as_raw().as_slice(),
            &[0, 0, 0, 128, 128, 128, 255, 255, 255]
        );
    }

    #[test]
    fn yuyv_neutral_chroma_is_gray() {
        // U = V = 128 means zero chroma; Y carries straight through.
        let data = [64u8, 128, 192, 128];
        let img = to_rgb24(&data, 2, 1, PixelFormat::Yuyv).expect("convert");
        assert_eq!(img.as_raw().as_slice(), &[64, 64, 64, 192, 192, 192]);
    }

    #[test]
    fn bayer_is_rejected() {
        let data = [0u8; 4];
        let err = to_rgb24(&data, 2, 2, PixelFormat::BayerRg8).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedFormat(_)));
    }

    #[test]
    fn short_payload_is_rejected() {
        let data = [0u8; 5];
        let err = to_rgb24(&data, 2, 1, PixelFormat::Rgb24).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::PayloadSize {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }
}
