//! facefind-hw: Hardware abstraction for selfie capture.
//!
//! Provides V4L2-based camera access, conversion of the negotiated pixel
//! format to RGB, and JPEG encoding of captured stills.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use frame::{Frame, FrameError};
