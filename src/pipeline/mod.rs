pub mod convert;
pub mod frame;
pub mod processor;
pub mod queue;

pub use frame::{CapturedFrame, PixelFormat, RawImage};
pub use processor::FrameProcessor;
pub use queue::{FrameQueue, FrameSubmitter};
