//! rollcall-hw: Camera capture for the recognition loop.
//!
//! Provides V4L2-based webcam access delivering RGB frames, plus the
//! pixel-format conversions it needs.

pub mod camera;
pub mod frame;

pub use camera::{resolve_device, Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::FrameError;
