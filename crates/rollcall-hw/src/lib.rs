//! rollcall-hw: Webcam capture for the attendance kiosk.
//!
//! Provides V4L2-based camera access and conversion of raw capture buffers
//! into grayscale frames for the face pipeline.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
