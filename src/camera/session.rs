//! One physical camera's connection lifecycle.
//!
//! A session owns its connection handle exclusively and carries the
//! per-camera frame-sequence counter shared with the delivery callback.
//! Opening a session persists the one-time provenance records; failing to
//! do so is fatal to the session, since those records establish provenance
//! for every frame that follows.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{info, warn};

use super::driver::{CameraDriver, DriverError, FrameCallback};
use crate::metadata::{self, RecordError};
use crate::paths;
use crate::pipeline::frame::{CapturedFrame, RawImage};
use crate::pipeline::queue::FrameSubmitter;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera {serial} not found")]
    DeviceNotFound { serial: u32 },
    #[error("failed to start capture on camera {serial}")]
    CaptureStart {
        serial: u32,
        #[source]
        source: DriverError,
    },
    #[error("failed to persist {record} record for camera {serial}")]
    Record {
        serial: u32,
        record: &'static str,
        #[source]
        source: RecordError,
    },
    #[error("driver failure on camera {serial}")]
    Driver {
        serial: u32,
        #[source]
        source: DriverError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Capturing,
    Stopping,
}

pub struct CameraSession<D: CameraDriver> {
    serial: u32,
    base_path: PathBuf,
    started_at: DateTime<Local>,
    driver: Arc<D>,
    handle: Option<D::Handle>,
    state: SessionState,
    /// Shared with the delivery callback; incremented exactly once per
    /// delivered frame.
    sequence: Arc<AtomicU64>,
}

impl<D: CameraDriver> std::fmt::Debug for CameraSession<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("serial", &self.serial)
            .field("base_path", &self.base_path)
            .field("started_at", &self.started_at)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl<D: CameraDriver> CameraSession<D> {
    /// Connect to the camera and persist the one-time session records.
    pub fn open(driver: Arc<D>, serial: u32, base_path: &Path) -> Result<Self, CameraError> {
        let started_at = Local::now();

        let mut session = Self {
            serial,
            base_path: base_path.to_path_buf(),
            started_at,
            driver,
            handle: None,
            state: SessionState::Connecting,
            sequence: Arc::new(AtomicU64::new(0)),
        };

        // Host-side provenance does not need the camera yet.
        let system_info = session
            .driver
            .system_info()
            .map_err(|e| session.driver_error(e))?;
        session.write_record("SystemInfo", &system_info)?;
        session.write_record("LibraryVersion", &session.driver.library_version())?;

        let handle = session.driver.connect(serial).map_err(|e| match e {
            DriverError::DeviceNotFound(_) => CameraError::DeviceNotFound { serial },
            other => CameraError::Driver {
                serial,
                source: other,
            },
        })?;
        session.handle = Some(handle);
        session.state = SessionState::Connected;

        // Camera capability record needs the live handle; if it cannot be
        // persisted the session must not come up half-provenanced.
        let info = match session.camera_info() {
            Ok(info) => info,
            Err(e) => {
                session.close_quietly();
                return Err(e);
            }
        };
        if let Err(e) = session.write_record("CameraInfo", &info) {
            session.close_quietly();
            return Err(e);
        }

        info!(serial, base = %base_path.display(), "camera session opened");
        Ok(session)
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Begin independent hardware-triggered delivery into `queue`.
    pub fn start_capture(&mut self, queue: FrameSubmitter) -> Result<(), CameraError> {
        let callback = self.frame_callback(queue);
        let Some(handle) = self.handle.as_ref().filter(|_| self.state == SessionState::Connected)
        else {
            self.close_quietly();
            return Err(CameraError::CaptureStart {
                serial: self.serial,
                source: DriverError::CaptureStart {
                    serial: self.serial,
                    reason: "session is not in the connected state".into(),
                },
            });
        };
        if let Err(e) = self.driver.start_capture(handle, callback) {
            self.close_quietly();
            return Err(CameraError::CaptureStart {
                serial: self.serial,
                source: e,
            });
        }
        self.state = SessionState::Capturing;
        info!(serial = self.serial, "capture started");
        Ok(())
    }

    /// Handle and callback for a driver-level synchronized start.
    ///
    /// The caller issues the coordinated start across every session, then
    /// confirms with [`Self::mark_capturing`].
    pub fn sync_start_parts(
        &self,
        queue: FrameSubmitter,
    ) -> Result<(&D::Handle, FrameCallback), CameraError> {
        let handle = self
            .handle
            .as_ref()
            .filter(|_| self.state == SessionState::Connected)
            .ok_or_else(|| CameraError::CaptureStart {
                serial: self.serial,
                source: DriverError::CaptureStart {
                    serial: self.serial,
                    reason: "session is not in the connected state".into(),
                },
            })?;
        Ok((handle, self.frame_callback(queue)))
    }

    pub fn mark_capturing(&mut self) {
        self.state = SessionState::Capturing;
    }

    /// The latency-critical delivery callback.
    ///
    /// Runs on the driver's thread: assign the next sequence number, deep
    /// copy the driver-owned buffer, submit, return. No I/O, no blocking.
    fn frame_callback(&self, queue: FrameSubmitter) -> FrameCallback {
        let serial = self.serial;
        let sequence = Arc::clone(&self.sequence);
        Arc::new(move |raw: &RawImage<'_>| {
            let timestamp = Local::now();
            let seq = sequence.fetch_add(1, Ordering::SeqCst) + 1;
            queue.submit(CapturedFrame::from_raw(serial, seq, timestamp, raw));
        })
    }

    /// Stop capture and disconnect, best effort.
    ///
    /// Each step is attempted regardless of the other's outcome; failures
    /// are logged, the first one is returned.
    pub fn close(&mut self) -> Result<(), CameraError> {
        self.state = SessionState::Stopping;
        let mut first_error: Option<CameraError> = None;

        if let Some(handle) = self.handle.as_ref() {
            if let Err(e) = self.driver.stop_capture(handle) {
                warn!(serial = self.serial, error = %e, "stop-capture failed during teardown");
                first_error.get_or_insert(self.driver_error(e));
            }
            if let Err(e) = self.driver.disconnect(handle) {
                warn!(serial = self.serial, error = %e, "disconnect failed during teardown");
                first_error.get_or_insert(self.driver_error(e));
            }
        }
        self.handle = None;
        self.state = SessionState::Disconnected;

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    fn close_quietly(&mut self) {
        if let Err(e) = self.close() {
            warn!(serial = self.serial, error = %e, "cleanup after failed startup");
        }
    }

    fn camera_info(&self) -> Result<metadata::CameraInfo, CameraError> {
        let handle = self.handle.as_ref().ok_or(CameraError::DeviceNotFound {
            serial: self.serial,
        })?;
        self.driver
            .camera_info(handle)
            .map_err(|e| self.driver_error(e))
    }

    fn write_record<T: serde::Serialize>(
        &self,
        name: &'static str,
        record: &T,
    ) -> Result<(), CameraError> {
        let path = paths::session_record_path(&self.base_path, &self.started_at, self.serial, name);
        metadata::write_record(&path, record).map_err(|source| CameraError::Record {
            serial: self.serial,
            record: name,
            source,
        })
    }

    fn driver_error(&self, source: DriverError) -> CameraError {
        CameraError::Driver {
            serial: self.serial,
            source,
        }
    }
}

impl<D: CameraDriver> Drop for CameraSession<D> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.close_quietly();
        }
    }
}
