//! Simulated camera driver for hardware-free runs and tests.
//!
//! Frames are synthesized gradients. Tests drive delivery by hand with
//! [`SimDriver::deliver`]/[`SimDriver::deliver_image`]; demo runs use
//! [`SimDriver::paced`], which spawns one generator thread per started
//! camera, standing in for the driver-owned delivery thread of real
//! hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::driver::{CameraDriver, DriverError, FrameCallback};
use crate::metadata::{CameraInfo, ImageMetadata, LibraryVersion, RoiPosition, SystemInfo};
use crate::pipeline::frame::{PixelFormat, RawImage};

const SIM_WIDTH: u32 = 64;
const SIM_HEIGHT: u32 = 48;

#[derive(Debug)]
pub struct SimHandle {
    pub serial: u32,
}

#[derive(Default)]
struct CamSlot {
    connected: bool,
    capturing: bool,
    callback: Option<FrameCallback>,
    frames_generated: u32,
    running: Option<Arc<AtomicBool>>,
    pacer: Option<thread::JoinHandle<()>>,
}

pub struct SimDriver {
    slots: Mutex<HashMap<u32, CamSlot>>,
    /// Generator rate for paced mode; `None` means delivery is manual.
    pace_fps: Option<f32>,
}

impl SimDriver {
    /// Manual-delivery driver over the given known serials.
    pub fn new(serials: &[u32]) -> Self {
        Self {
            slots: Mutex::new(
                serials
                    .iter()
                    .map(|&serial| (serial, CamSlot::default()))
                    .collect(),
            ),
            pace_fps: None,
        }
    }

    /// Driver whose cameras free-run at `fps` once capture starts.
    pub fn paced(serials: &[u32], fps: f32) -> Self {
        let mut driver = Self::new(serials);
        driver.pace_fps = Some(fps.max(1.0));
        driver
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, CamSlot>> {
        // Slot state is plain bookkeeping; a poisoned lock means a panic
        // mid-update and there is nothing sensible to salvage.
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deliver one synthesized gradient frame on the caller's thread.
    ///
    /// Returns false if the camera is not capturing.
    pub fn deliver(&self, serial: u32) -> bool {
        let (callback, count) = {
            let mut slots = self.lock();
            let Some(slot) = slots.get_mut(&serial) else {
                return false;
            };
            if !slot.capturing {
                return false;
            }
            slot.frames_generated += 1;
            match &slot.callback {
                Some(cb) => (Arc::clone(cb), slot.frames_generated),
                None => return false,
            }
        };
        let data = gradient_frame(SIM_WIDTH, SIM_HEIGHT, count);
        let raw = RawImage {
            data: &data,
            width: SIM_WIDTH,
            height: SIM_HEIGHT,
            format: PixelFormat::Mono8,
            metadata: embedded_metadata(count),
        };
        callback(&raw);
        true
    }

    /// Deliver an arbitrary image, for tests exercising specific formats.
    pub fn deliver_image(&self, serial: u32, raw: &RawImage<'_>) -> bool {
        let callback = {
            let slots = self.lock();
            match slots.get(&serial) {
                Some(slot) if slot.capturing => slot.callback.clone(),
                _ => None,
            }
        };
        match callback {
            Some(cb) => {
                cb(raw);
                true
            }
            None => false,
        }
    }

    fn begin_capture(slot: &mut CamSlot, serial: u32, on_frame: FrameCallback, pace_fps: Option<f32>) {
        slot.callback = Some(Arc::clone(&on_frame));
        slot.capturing = true;
        if let Some(fps) = pace_fps {
            let running = Arc::new(AtomicBool::new(true));
            slot.running = Some(Arc::clone(&running));
            let interval = Duration::from_secs_f32(1.0 / fps);
            slot.pacer = Some(thread::spawn(move || {
                let mut count = 0u32;
                while running.load(Ordering::Acquire) {
                    count += 1;
                    let data = gradient_frame(SIM_WIDTH, SIM_HEIGHT, count);
                    let raw = RawImage {
                        data: &data,
                        width: SIM_WIDTH,
                        height: SIM_HEIGHT,
                        format: PixelFormat::Mono8,
                        metadata: embedded_metadata(count),
                    };
                    on_frame(&raw);
                    thread::sleep(interval);
                }
                debug!(serial, "sim pacer stopped");
            }));
        }
    }

    fn end_capture(slot: &mut CamSlot) {
        if let Some(running) = slot.running.take() {
            running.store(false, Ordering::Release);
        }
        slot.capturing = false;
        slot.callback = None;
        if let Some(pacer) = slot.pacer.take() {
            let _ = pacer.join();
        }
    }
}

impl CameraDriver for SimDriver {
    type Handle = SimHandle;

    fn connect(&self, serial: u32) -> Result<Self::Handle, DriverError> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&serial)
            .ok_or(DriverError::DeviceNotFound(serial))?;
        if slot.connected {
            return Err(DriverError::Fault(format!(
                "camera {serial} is already connected"
            )));
        }
        slot.connected = true;
        Ok(SimHandle { serial })
    }

    fn start_capture(
        &self,
        handle: &Self::Handle,
        on_frame: FrameCallback,
    ) -> Result<(), DriverError> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&handle.serial)
            .ok_or(DriverError::DeviceNotFound(handle.serial))?;
        if !slot.connected || slot.capturing {
            return Err(DriverError::CaptureStart {
                serial: handle.serial,
                reason: if slot.capturing {
                    "already capturing".into()
                } else {
                    "not connected".into()
                },
            });
        }
        Self::begin_capture(slot, handle.serial, on_frame, self.pace_fps);
        Ok(())
    }

    fn start_sync_capture(
        &self,
        starts: &[(&Self::Handle, FrameCallback)],
    ) -> Result<(), DriverError> {
        let mut slots = self.lock();
        for (handle, _) in starts {
            let slot = slots
                .get(&handle.serial)
                .ok_or(DriverError::DeviceNotFound(handle.serial))?;
            if !slot.connected || slot.capturing {
                return Err(DriverError::CaptureStart {
                    serial: handle.serial,
                    reason: "not ready for synchronized start".into(),
                });
            }
        }
        for (handle, on_frame) in starts {
            if let Some(slot) = slots.get_mut(&handle.serial) {
                Self::begin_capture(slot, handle.serial, Arc::clone(on_frame), self.pace_fps);
            }
        }
        Ok(())
    }

    fn stop_capture(&self, handle: &Self::Handle) -> Result<(), DriverError> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&handle.serial)
            .ok_or(DriverError::DeviceNotFound(handle.serial))?;
        Self::end_capture(slot);
        Ok(())
    }

    fn disconnect(&self, handle: &Self::Handle) -> Result<(), DriverError> {
        let mut slots = self.lock();
        let slot = slots
            .get_mut(&handle.serial)
            .ok_or(DriverError::DeviceNotFound(handle.serial))?;
        Self::end_capture(slot);
        slot.connected = false;
        Ok(())
    }

    fn system_info(&self) -> Result<SystemInfo, DriverError> {
        Ok(SystemInfo {
            os_description: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            cpu_description: std::env::consts::ARCH.to_owned(),
            num_cpu_cores: thread::available_parallelism().map_or(1, |n| n.get() as u32),
            sys_mem_bytes: 0,
        })
    }

    fn library_version(&self) -> LibraryVersion {
        LibraryVersion {
            driver_name: "argus-sim".to_owned(),
            major: 0,
            minor: 1,
            build: 0,
        }
    }

    fn camera_info(&self, handle: &Self::Handle) -> Result<CameraInfo, DriverError> {
        Ok(CameraInfo {
            serial: handle.serial,
            model_name: "Argus SimCam".to_owned(),
            vendor_name: "argus".to_owned(),
            sensor_info: "synthetic gradient".to_owned(),
            sensor_resolution: format!("{SIM_WIDTH}x{SIM_HEIGHT}"),
            interface_type: "sim".to_owned(),
            firmware_version: env!("CARGO_PKG_VERSION").to_owned(),
            is_color_camera: false,
        })
    }
}

/// Horizontal gradient, phase-shifted by frame count so successive frames
/// differ.
fn gradient_frame(width: u32, height: u32, count: u32) -> Vec<u8> {
    let phase = count % width;
    let mut data = vec![0u8; (width * height) as usize];
    for y in 0..height {
        for x in 0..width {
            data[(y * width + x) as usize] = ((((x + phase) % width) * 255) / width) as u8;
        }
    }
    data
}

fn embedded_metadata(count: u32) -> ImageMetadata {
    ImageMetadata {
        embedded_timestamp: count.wrapping_mul(33_333),
        embedded_gain: 180,
        embedded_shutter: 450,
        embedded_exposure: 320,
        embedded_frame_counter: count,
        embedded_gpio_pin_state: 0b0001,
        embedded_roi_position: RoiPosition { x: 0, y: 0 },
        ..ImageMetadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn connect_unknown_serial_is_device_not_found() {
        let driver = SimDriver::new(&[101]);
        let err = driver.connect(999).unwrap_err();
        assert!(matches!(err, DriverError::DeviceNotFound(999)));
    }

    #[test]
    fn start_capture_requires_connection() {
        let driver = SimDriver::new(&[101]);
        let handle = SimHandle { serial: 101 };
        let err = driver
            .start_capture(&handle, Arc::new(|_| {}))
            .unwrap_err();
        assert!(matches!(err, DriverError::CaptureStart { serial: 101, .. }));
    }

    #[test]
    fn deliver_invokes_the_registered_callback() {
        let driver = SimDriver::new(&[101]);
        let handle = driver.connect(101).expect("connect");
        let seen = Arc::new(AtomicU32::new(0));
        let seen_cb = Arc::clone(&seen);
        driver
            .start_capture(
                &handle,
                Arc::new(move |raw| {
                    assert_eq!(raw.format, PixelFormat::Mono8);
                    assert_eq!(raw.data.len(), (SIM_WIDTH * SIM_HEIGHT) as usize);
                    seen_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("start");
        assert!(driver.deliver(101));
        assert!(driver.deliver(101));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn delivery_stops_after_stop_capture() {
        let driver = SimDriver::new(&[101]);
        let handle = driver.connect(101).expect("connect");
        driver
            .start_capture(&handle, Arc::new(|_| {}))
            .expect("start");
        driver.stop_capture(&handle).expect("stop");
        assert!(!driver.deliver(101));
    }

    #[test]
    fn sync_start_arms_all_cameras() {
        let driver = SimDriver::new(&[101, 102]);
        let h1 = driver.connect(101).expect("connect 101");
        let h2 = driver.connect(102).expect("connect 102");
        let starts: Vec<(&SimHandle, FrameCallback)> = vec![
            (&h1, Arc::new(|_| {})),
            (&h2, Arc::new(|_| {})),
        ];
        driver.start_sync_capture(&starts).expect("sync start");
        assert!(driver.deliver(101));
        assert!(driver.deliver(102));
    }
}
