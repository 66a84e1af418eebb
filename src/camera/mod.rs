pub mod driver;
pub mod session;
pub mod sim;
#[cfg(feature = "driver-v4l2")]
pub mod v4l2;

pub use driver::{CameraDriver, DriverError, FrameCallback};
pub use session::{CameraError, CameraSession, SessionState};
