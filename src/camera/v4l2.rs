//! V4L2 camera driver: serial N maps to `/dev/videoN`.
//!
//! Each started camera gets one delivery thread that dequeues mmap'd
//! buffers and invokes the frame callback; that thread plays the role of
//! the driver-owned delivery context. V4L2 has no bus-level synchronized
//! start, so `start_sync_capture` reports `SyncUnsupported`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::driver::{CameraDriver, DriverError, FrameCallback};
use crate::metadata::{CameraInfo, ImageMetadata, LibraryVersion, SystemInfo};
use crate::pipeline::frame::{PixelFormat, RawImage};

const BUFFER_COUNT: u32 = 4;

pub struct V4l2Handle {
    serial: u32,
    path: String,
    card: String,
    driver_name: String,
}

struct Worker {
    running: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

#[derive(Default)]
pub struct V4l2Driver {
    workers: Mutex<HashMap<u32, Worker>>,
}

impl V4l2Driver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, Worker>> {
        match self.workers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn stop_worker(&self, serial: u32) {
        let worker = self.lock().remove(&serial);
        if let Some(worker) = worker {
            worker.running.store(false, Ordering::Release);
            // The delivery thread may be blocked on the next hardware
            // frame; it exits after that dequeue.
            if worker.thread.join().is_err() {
                error!(serial, "delivery thread panicked");
            }
        }
    }
}

fn map_fourcc(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"GREY" => Some(PixelFormat::Mono8),
        _ => None,
    }
}

impl CameraDriver for V4l2Driver {
    type Handle = V4l2Handle;

    fn connect(&self, serial: u32) -> Result<Self::Handle, DriverError> {
        let path = format!("/dev/video{serial}");
        if !Path::new(&path).exists() {
            return Err(DriverError::DeviceNotFound(serial));
        }
        let device = Device::with_path(&path)
            .map_err(|e| DriverError::Fault(format!("open {path}: {e}")))?;
        let caps = device
            .query_caps()
            .map_err(|e| DriverError::Fault(format!("query {path}: {e}")))?;
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DriverError::Fault(format!(
                "{path} does not support video capture"
            )));
        }
        info!(serial, card = %caps.card, driver = %caps.driver, "camera connected");
        Ok(V4l2Handle {
            serial,
            path,
            card: caps.card,
            driver_name: caps.driver,
        })
    }

    fn start_capture(
        &self,
        handle: &Self::Handle,
        on_frame: FrameCallback,
    ) -> Result<(), DriverError> {
        let serial = handle.serial;
        let mut workers = self.lock();
        if workers.contains_key(&serial) {
            return Err(DriverError::CaptureStart {
                serial,
                reason: "already capturing".into(),
            });
        }

        let device = Device::with_path(&handle.path).map_err(|e| DriverError::CaptureStart {
            serial,
            reason: format!("reopen {}: {e}", handle.path),
        })?;
        let fmt = device.format().map_err(|e| DriverError::CaptureStart {
            serial,
            reason: format!("query format: {e}"),
        })?;
        let format = map_fourcc(fmt.fourcc).ok_or_else(|| DriverError::CaptureStart {
            serial,
            reason: format!("unsupported fourcc {}", fmt.fourcc),
        })?;
        let (width, height) = (fmt.width, fmt.height);

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::spawn(move || {
            let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            {
                Ok(stream) => stream,
                Err(e) => {
                    error!(serial, error = %e, "capture stream setup failed");
                    return;
                }
            };
            let payload = format.payload_len(width, height);
            while flag.load(Ordering::Acquire) {
                match stream.next() {
                    Ok((buf, meta)) => {
                        let metadata = ImageMetadata {
                            embedded_frame_counter: meta.sequence,
                            embedded_timestamp: meta.timestamp.usec as u32,
                            ..ImageMetadata::default()
                        };
                        // The driver may hand back a padded buffer.
                        let data = buf.get(..payload).unwrap_or(buf);
                        let raw = RawImage {
                            data,
                            width,
                            height,
                            format,
                            metadata,
                        };
                        on_frame(&raw);
                    }
                    Err(e) => {
                        warn!(serial, error = %e, "frame dequeue failed");
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        });
        workers.insert(serial, Worker { running, thread });
        info!(serial, ?format, width, height, "capture stream started");
        Ok(())
    }

    fn start_sync_capture(
        &self,
        _starts: &[(&Self::Handle, FrameCallback)],
    ) -> Result<(), DriverError> {
        Err(DriverError::SyncUnsupported)
    }

    fn stop_capture(&self, handle: &Self::Handle) -> Result<(), DriverError> {
        self.stop_worker(handle.serial);
        Ok(())
    }

    fn disconnect(&self, handle: &Self::Handle) -> Result<(), DriverError> {
        self.stop_worker(handle.serial);
        Ok(())
    }

    fn system_info(&self) -> Result<SystemInfo, DriverError> {
        Ok(SystemInfo {
            os_description: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            cpu_description: std::env::consts::ARCH.to_owned(),
            num_cpu_cores: thread::available_parallelism().map_or(1, |n| n.get() as u32),
            sys_mem_bytes: total_memory_bytes(),
        })
    }

    fn library_version(&self) -> LibraryVersion {
        LibraryVersion {
            driver_name: "v4l2".to_owned(),
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            build: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }

    fn camera_info(&self, handle: &Self::Handle) -> Result<CameraInfo, DriverError> {
        let resolution = Device::with_path(&handle.path)
            .and_then(|device| device.format())
            .map(|fmt| format!("{}x{}", fmt.width, fmt.height))
            .unwrap_or_else(|_| "unknown".to_owned());
        Ok(CameraInfo {
            serial: handle.serial,
            model_name: handle.card.clone(),
            vendor_name: handle.driver_name.clone(),
            sensor_info: handle.path.clone(),
            sensor_resolution: resolution,
            interface_type: "v4l2".to_owned(),
            firmware_version: String::new(),
            is_color_camera: true,
        })
    }
}

/// MemTotal from /proc/meminfo, zero if unreadable.
fn total_memory_bytes() -> u64 {
    let Ok(meminfo) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map_or(0, |kb| kb * 1024)
}
