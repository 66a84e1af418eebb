//! Timestamp-derived output paths.
//!
//! Every frame lands under `<base>/<YYYYMMDD>/<HH>/`, named
//! `<timestamp>_<serial>_<sequence>` with a `.jpg` extension for the image
//! and an `_ImageMetadata.json` suffix for the sidecar. Image and sidecar
//! share the name stem, so they can always be associated by path prefix.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

pub const IMAGE_EXT: &str = "jpg";
pub const SIDECAR_SUFFIX: &str = "_ImageMetadata.json";

/// Compact ISO-8601 timestamp with microsecond precision, filesystem-safe.
fn stamp(ts: &DateTime<Local>) -> String {
    ts.format("%Y%m%dT%H%M%S%.6f").to_string()
}

/// Derive the image path and metadata sidecar path for one frame.
///
/// Pure and injective over distinct (timestamp, serial, sequence) triples:
/// the stem embeds all three.
pub fn frame_paths(
    base: &Path,
    timestamp: &DateTime<Local>,
    serial: u32,
    sequence: u64,
) -> (PathBuf, PathBuf) {
    let dir = base
        .join(timestamp.format("%Y%m%d").to_string())
        .join(timestamp.format("%H").to_string());
    let stem = format!("{}_{}_{}", stamp(timestamp), serial, sequence);
    let image = dir.join(format!("{stem}.{IMAGE_EXT}"));
    let sidecar = dir.join(format!("{stem}{SIDECAR_SUFFIX}"));
    (image, sidecar)
}

/// Path for a one-time session record (`SystemInfo`, `LibraryVersion`,
/// `CameraInfo`), written directly under the output root.
pub fn session_record_path(
    base: &Path,
    session_start: &DateTime<Local>,
    serial: u32,
    record_name: &str,
) -> PathBuf {
    base.join(format!(
        "{}_{}_{}.json",
        stamp(session_start),
        serial,
        record_name
    ))
}
