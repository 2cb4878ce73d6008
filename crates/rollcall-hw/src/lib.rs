//! rollcall-hw: Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access, pixel conversion to RGB, and JPEG
//! encoding of captured frames.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError, PixelLayout};
pub use source::{DeviceOpener, FrameSource, V4lOpener};
