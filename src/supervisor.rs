//! Startup, render/command loop, and drain-on-shutdown.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::camera::driver::{CameraDriver, DriverError, FrameCallback};
use crate::camera::session::CameraSession;
use crate::display::DisplayBackend;
use crate::input::{InputController, KeyAction};
use crate::pipeline::processor::FrameProcessor;
use crate::pipeline::queue::{FrameQueue, FrameSubmitter};
use crate::preview::PreviewStore;
use crate::Config;

/// Owns every session, the queue, the preview store, and the input
/// controller, and drives the render/command loop on the calling thread.
pub struct Supervisor<D: CameraDriver, B: DisplayBackend> {
    driver: Arc<D>,
    display: B,
    serials: Vec<u32>,
    sync_capture: bool,
    output_directory: std::path::PathBuf,
    preview: Arc<PreviewStore>,
    preview_size: (u32, u32),
    input: InputController,
    poll_interval: Duration,
    sessions: Vec<CameraSession<D>>,
    surfaces: Vec<String>,
    queue: Option<FrameQueue>,
}

impl<D: CameraDriver, B: DisplayBackend> Supervisor<D, B> {
    pub fn new(config: &Config, driver: Arc<D>, display: B) -> Self {
        let preview = Arc::new(PreviewStore::new(
            config.pg_serial.iter().copied(),
            config.preview_width,
            config.preview_height,
        ));
        Self {
            driver,
            display,
            serials: config.pg_serial.clone(),
            sync_capture: config.sync_capture,
            output_directory: config.output_directory.clone(),
            preview,
            preview_size: (config.preview_width, config.preview_height),
            input: InputController::with_default_phrases(),
            poll_interval: InputController::poll_interval(config.display_fps),
            sessions: Vec::new(),
            surfaces: Vec::new(),
            queue: None,
        }
    }

    /// Bring the rig up, run until quit, tear everything down.
    ///
    /// Teardown runs on startup failure as well as on normal exit: sessions
    /// are closed first, the queue drains fully before anything that
    /// delivery work might reference goes away, surfaces last.
    pub fn run(mut self, runtime: &Runtime) -> Result<()> {
        let result = self.startup(runtime).and_then(|_| self.render_loop());
        self.shutdown(runtime);
        result
    }

    fn startup(&mut self, runtime: &Runtime) -> Result<()> {
        fs::create_dir_all(&self.output_directory)?;

        let (preview_w, preview_h) = self.preview_size;
        let processor = Arc::new(FrameProcessor::new(
            &self.output_directory,
            Arc::clone(&self.preview),
            preview_w,
            preview_h,
        ));
        let queue = FrameQueue::start(runtime.handle(), processor);
        let submitter = queue.submitter();
        // Owned before any session exists, so shutdown always drains it,
        // startup failure included.
        self.queue = Some(queue);

        for &serial in &self.serials {
            let name = serial.to_string();
            self.display.create_surface(&name)?;
            self.surfaces.push(name);
            let session =
                CameraSession::open(Arc::clone(&self.driver), serial, &self.output_directory)?;
            self.sessions.push(session);
        }

        if self.sync_capture {
            self.start_synchronized(&submitter)?;
        } else {
            for session in &mut self.sessions {
                session.start_capture(submitter.clone())?;
            }
        }

        info!(cameras = self.sessions.len(), "capture running");
        Ok(())
    }

    /// One coordinated start across every connected session, falling back
    /// to independent starts when the driver has no bus-level sync.
    fn start_synchronized(&mut self, submitter: &FrameSubmitter) -> Result<()> {
        let mut starts: Vec<(&D::Handle, FrameCallback)> = Vec::with_capacity(self.sessions.len());
        for session in &self.sessions {
            starts.push(session.sync_start_parts(submitter.clone())?);
        }
        match self.driver.start_sync_capture(&starts) {
            Ok(()) => {
                drop(starts);
                for session in &mut self.sessions {
                    session.mark_capturing();
                }
                info!("synchronized capture started");
                Ok(())
            }
            Err(DriverError::SyncUnsupported) => {
                drop(starts);
                warn!("driver lacks synchronized start; starting cameras independently");
                for session in &mut self.sessions {
                    session.start_capture(submitter.clone())?;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render_loop(&mut self) -> Result<()> {
        if self.sessions.is_empty() {
            info!("no cameras configured; nothing to supervise");
            return Ok(());
        }
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "entering render loop"
        );
        loop {
            for &serial in &self.serials {
                let image = self.preview.read(serial);
                if let Err(e) = self.display.update_surface(&serial.to_string(), &image) {
                    warn!(serial, error = %e, "surface update failed");
                }
            }
            if let Some(key) = self.display.poll_key(self.poll_interval) {
                if self.input.push_key(key) == KeyAction::Quit {
                    info!("quit command received");
                    return Ok(());
                }
            }
        }
    }

    fn shutdown(&mut self, runtime: &Runtime) {
        info!("shutting down");
        for session in &mut self.sessions {
            if let Err(e) = session.close() {
                warn!(serial = session.serial(), error = %e, "session teardown failure");
            }
        }
        if let Some(queue) = self.queue.take() {
            runtime.block_on(queue.drain());
        }
        // Sessions are released only after the queue is empty; nothing in
        // flight can reference them now.
        self.sessions.clear();
        for name in std::mem::take(&mut self.surfaces) {
            self.display.destroy_surface(&name);
        }
        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::sim::SimDriver;
    use crate::display::HeadlessDisplay;

    fn test_config(dir: &std::path::Path, serials: &[u32], sync: bool) -> Config {
        Config {
            output_directory: dir.to_path_buf(),
            display_fps: 200.0,
            sync_capture: sync,
            pg_serial: serials.to_vec(),
            preview_width: 32,
            preview_height: 24,
        }
    }

    #[test]
    fn startup_failure_cleans_up_already_opened_sessions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Runtime::new().expect("runtime");
        // 102 is unknown to the driver: session 101 opens, then 102 fails.
        let driver = Arc::new(SimDriver::new(&[101]));
        let config = test_config(dir.path(), &[101, 102], false);
        let supervisor = Supervisor::new(&config, Arc::clone(&driver), HeadlessDisplay::new());

        assert!(supervisor.run(&runtime).is_err());
        // 101 was released during shutdown and can be reacquired.
        assert!(driver.connect(101).is_ok());
    }

    #[test]
    fn no_cameras_configured_exits_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = Runtime::new().expect("runtime");
        let driver = Arc::new(SimDriver::new(&[]));
        let config = test_config(dir.path(), &[], false);
        let supervisor = Supervisor::new(&config, driver, HeadlessDisplay::new());
        supervisor.run(&runtime).expect("run");
    }
}
