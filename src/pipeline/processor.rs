//! Per-frame persistence and preview publication.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::{debug, error};

use super::convert::{self, ConversionError};
use super::frame::CapturedFrame;
use crate::metadata::{self, RecordError};
use crate::paths;
use crate::preview::{PreviewImage, PreviewStore};

const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("failed to encode image for {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("i/o failure at {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write metadata sidecar")]
    Metadata(#[from] RecordError),
}

impl ProcessError {
    fn stage(&self) -> &'static str {
        match self {
            Self::Conversion(_) => "convert",
            Self::Encode { .. } => "encode",
            Self::Io { .. } => "write",
            Self::Metadata(_) => "sidecar",
        }
    }
}

/// Converts, paths, persists, and publishes a single frame.
///
/// Runs on queue workers, off the delivery thread. Any number of instances
/// of `process` may run concurrently; nothing here is ordered.
pub struct FrameProcessor {
    base_path: PathBuf,
    preview: Arc<PreviewStore>,
    preview_width: u32,
    preview_height: u32,
}

impl FrameProcessor {
    pub fn new(
        base_path: &Path,
        preview: Arc<PreviewStore>,
        preview_width: u32,
        preview_height: u32,
    ) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            preview,
            preview_width,
            preview_height,
        }
    }

    /// Process one frame to completion.
    ///
    /// Failures terminate this frame only: they are logged with enough
    /// context to diagnose and never propagate to other frames or to the
    /// delivery callback.
    pub fn process(&self, frame: CapturedFrame) {
        let serial = frame.serial;
        let sequence = frame.sequence;
        match self.persist_and_publish(&frame) {
            Ok(image_path) => {
                debug!(serial, sequence, path = %image_path.display(), "frame persisted");
            }
            Err(e) => {
                error!(serial, sequence, stage = e.stage(), error = %e, "dropping frame");
            }
        }
    }

    fn persist_and_publish(&self, frame: &CapturedFrame) -> Result<PathBuf, ProcessError> {
        let rgb = convert::to_rgb24(&frame.data, frame.width, frame.height, frame.format)?;

        let (image_path, sidecar_path) =
            paths::frame_paths(&self.base_path, &frame.timestamp, frame.serial, frame.sequence);

        // Workers for different frames race on the same hour bucket;
        // create_dir_all is idempotent either way.
        if let Some(dir) = image_path.parent() {
            fs::create_dir_all(dir).map_err(|source| ProcessError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = File::create(&image_path).map_err(|source| ProcessError::Io {
            path: image_path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))
            .map_err(|source| ProcessError::Encode {
                path: image_path.clone(),
                source,
            })?;
        writer.flush().map_err(|source| ProcessError::Io {
            path: image_path.clone(),
            source,
        })?;

        metadata::write_record(&sidecar_path, &frame.metadata)?;

        let preview = imageops::resize(
            &rgb,
            self.preview_width,
            self.preview_height,
            FilterType::Triangle,
        );
        self.preview
            .publish(frame.serial, PreviewImage::from_rgb(frame.sequence, preview));

        Ok(image_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ImageMetadata, RoiPosition};
    use crate::pipeline::frame::PixelFormat;
    use bytes::Bytes;
    use chrono::Local;

    fn solid_frame(serial: u32, sequence: u64, value: u8) -> CapturedFrame {
        CapturedFrame {
            serial,
            sequence,
            timestamp: Local::now(),
            width: 8,
            height: 4,
            format: PixelFormat::Mono8,
            data: Bytes::from(vec![value; 32]),
            metadata: ImageMetadata {
                embedded_frame_counter: sequence as u32,
                embedded_gain: 100,
                embedded_roi_position: RoiPosition { x: 4, y: 2 },
                ..ImageMetadata::default()
            },
        }
    }

    fn processor(dir: &Path, preview: &Arc<PreviewStore>) -> FrameProcessor {
        FrameProcessor::new(dir, Arc::clone(preview), 8, 4)
    }

    #[test]
    fn persists_image_and_sidecar_under_hour_bucket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let preview = Arc::new(PreviewStore::new([101], 8, 4));
        let p = processor(dir.path(), &preview);

        let frame = solid_frame(101, 1, 200);
        let image_path = p.persist_and_publish(&frame).expect("process");

        assert!(image_path.exists());
        let date_dir = frame.timestamp.format("%Y%m%d").to_string();
        let hour_dir = frame.timestamp.format("%H").to_string();
        assert!(image_path
            .to_string_lossy()
            .contains(&format!("{date_dir}/{hour_dir}/")));

        let sidecar: ImageMetadata = metadata::read_record(
            &image_path.with_file_name(format!(
                "{}{}",
                image_path
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .strip_suffix(".jpg")
                    .unwrap(),
                paths::SIDECAR_SUFFIX
            )),
        )
        .expect("sidecar readable");
        assert_eq!(sidecar, frame.metadata);
    }

    #[test]
    fn publishes_resized_preview() {
        let dir = tempfile::tempdir().expect("tempdir");
        let preview = Arc::new(PreviewStore::new([101], 8, 4));
        let p = processor(dir.path(), &preview);

        p.persist_and_publish(&solid_frame(101, 3, 90)).expect("process");

        let img = preview.read(101);
        assert_eq!(img.sequence, 3);
        assert_eq!((img.width, img.height), (8, 4));
        // Solid input stays solid through the resize.
        assert!(img.data.iter().all(|&b| b == 90));
    }

    #[test]
    fn conversion_failure_is_contained_and_later_frames_proceed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let preview = Arc::new(PreviewStore::new([101], 8, 4));
        let p = processor(dir.path(), &preview);

        let mut bad = solid_frame(101, 1, 10);
        bad.format = PixelFormat::BayerRg8;
        p.process(bad); // logged and dropped

        p.process(solid_frame(101, 2, 20));
        assert_eq!(preview.read(101).sequence, 2);
    }

    #[test]
    fn write_failure_reports_the_io_stage() {
        let preview = Arc::new(PreviewStore::new([101], 8, 4));
        let p = FrameProcessor::new(Path::new("/proc/argus-no-such-root"), preview, 8, 4);
        let err = p.persist_and_publish(&solid_frame(101, 1, 10)).unwrap_err();
        assert_eq!(err.stage(), "write");
    }
}
