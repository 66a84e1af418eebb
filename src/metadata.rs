//! Provenance records persisted next to captured images.
//!
//! Two kinds of records exist: the per-frame `ImageMetadata` sidecar and the
//! one-time session records (`SystemInfo`, `LibraryVersion`, `CameraInfo`)
//! written when a camera session opens.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record i/o failure")]
    Io(#[from] std::io::Error),
    #[error("record encoding failure")]
    Encode(#[from] serde_json::Error),
}

/// Sensor position of the region of interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiPosition {
    pub x: u32,
    pub y: u32,
}

/// Camera-embedded register values captured with each frame.
///
/// Values are raw hardware registers; decoding them into engineering units
/// is the consumer's business.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub embedded_timestamp: u32,
    pub embedded_gain: u32,
    pub embedded_shutter: u32,
    pub embedded_brightness: u32,
    pub embedded_exposure: u32,
    pub embedded_white_balance: u32,
    pub embedded_frame_counter: u32,
    pub embedded_strobe_pattern: u32,
    pub embedded_gpio_pin_state: u32,
    pub embedded_roi_position: RoiPosition,
}

/// Host environment at session start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os_description: String,
    pub cpu_description: String,
    pub num_cpu_cores: u32,
    pub sys_mem_bytes: u64,
}

/// Version of the driver stack the session was captured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryVersion {
    pub driver_name: String,
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

/// Capabilities of a connected camera.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub serial: u32,
    pub model_name: String,
    pub vendor_name: String,
    pub sensor_info: String,
    pub sensor_resolution: String,
    pub interface_type: String,
    pub firmware_version: String,
    pub is_color_camera: bool,
}

/// Serialize a record to `path`. The parent directory must already exist.
pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<(), RecordError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.flush()?;
    Ok(())
}

/// Read a record back. Used by tooling and tests; the capture path is
/// write-only.
pub fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T, RecordError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_metadata_round_trips_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame_ImageMetadata.json");

        let md = ImageMetadata {
            embedded_timestamp: 0x4a12_0001,
            embedded_gain: 220,
            embedded_shutter: 981,
            embedded_brightness: 12,
            embedded_exposure: 430,
            embedded_white_balance: 64,
            embedded_frame_counter: 17,
            embedded_strobe_pattern: 0b1010,
            embedded_gpio_pin_state: 0b0110,
            embedded_roi_position: RoiPosition { x: 32, y: 48 },
        };

        write_record(&path, &md).expect("write");
        let back: ImageMetadata = read_record(&path).expect("read");
        assert_eq!(back, md);
    }

    #[test]
    fn camera_info_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("CameraInfo.json");

        let info = CameraInfo {
            serial: 13421003,
            model_name: "Flea3 FL3-U3-13Y3M".into(),
            vendor_name: "Point Grey Research".into(),
            sensor_info: "Vita 1300 (1/2\" CMOS)".into(),
            sensor_resolution: "1280x1024".into(),
            interface_type: "USB3".into(),
            firmware_version: "2.13.3.2".into(),
            is_color_camera: false,
        };

        write_record(&path, &info).expect("write");
        let back: CameraInfo = read_record(&path).expect("read");
        assert_eq!(back, info);
    }

    #[test]
    fn write_fails_without_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("record.json");
        let err = write_record(&path, &SystemInfo::default()).unwrap_err();
        assert!(matches!(err, RecordError::Io(_)));
    }
}
