//! The camera driver boundary.
//!
//! Everything below this trait (bus enumeration, trigger wiring, buffer
//! delivery) belongs to the driver backend; the rest of the crate only sees
//! the connect / start / stop / disconnect lifecycle and the frame callback.

use std::sync::Arc;

use thiserror::Error;

use crate::metadata::{CameraInfo, LibraryVersion, SystemInfo};
use crate::pipeline::frame::RawImage;

/// Asynchronous frame delivery callback.
///
/// Invoked on a thread owned by the driver, zero or more times between
/// `start_capture` and `stop_capture`. The `RawImage` borrow is only valid
/// for the duration of the call; implementations must deep copy and return
/// quickly, without blocking.
pub type FrameCallback = Arc<dyn Fn(&RawImage<'_>) + Send + Sync>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no camera matches serial {0}")]
    DeviceNotFound(u32),
    #[error("cannot start capture on camera {serial}: {reason}")]
    CaptureStart { serial: u32, reason: String },
    #[error("driver does not support synchronized start")]
    SyncUnsupported,
    #[error("driver fault: {0}")]
    Fault(String),
}

pub trait CameraDriver: Send + Sync + 'static {
    /// Exclusive connection to one camera.
    type Handle: Send;

    fn connect(&self, serial: u32) -> Result<Self::Handle, DriverError>;

    /// Register `on_frame` and begin hardware-triggered delivery.
    fn start_capture(
        &self,
        handle: &Self::Handle,
        on_frame: FrameCallback,
    ) -> Result<(), DriverError>;

    /// Start all cameras with one coordinated call to align trigger phase.
    ///
    /// Backends without bus-level sync return `SyncUnsupported`; callers
    /// degrade to independent starts.
    fn start_sync_capture(
        &self,
        starts: &[(&Self::Handle, FrameCallback)],
    ) -> Result<(), DriverError>;

    fn stop_capture(&self, handle: &Self::Handle) -> Result<(), DriverError>;

    fn disconnect(&self, handle: &Self::Handle) -> Result<(), DriverError>;

    /// Host/driver environment, captured once per session for provenance.
    fn system_info(&self) -> Result<SystemInfo, DriverError>;

    fn library_version(&self) -> LibraryVersion;

    fn camera_info(&self, handle: &Self::Handle) -> Result<CameraInfo, DriverError>;
}
