//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Share of pixels below 32 above which a frame counts as dark.
const DARK_FRAME_PCT: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    /// Preferred formats, in the order they are requested from the driver.
    const PREFERENCE: [PixelFormat; 4] = [
        PixelFormat::Yuyv,
        PixelFormat::Mjpeg,
        PixelFormat::Grey,
        PixelFormat::Y16,
    ];

    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
            PixelFormat::Y16 => FourCC::new(b"Y16 "),
        }
    }

    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"Y16\0") {
            return Some(PixelFormat::Y16);
        }
        Self::PREFERENCE
            .into_iter()
            .find(|format| format.fourcc() == fourcc)
    }

    /// Convert one raw capture buffer to 8-bit grayscale.
    pub fn to_grayscale(
        self,
        buf: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, frame::FrameError> {
        match self {
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, width, height),
            PixelFormat::Mjpeg => frame::mjpeg_to_grayscale(buf, width, height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, width, height),
            PixelFormat::Grey => {
                let pixels = (width * height) as usize;
                if buf.len() < pixels {
                    return Err(frame::FrameError::InvalidLength {
                        expected: pixels,
                        actual: buf.len(),
                    });
                }
                Ok(buf[..pixels].to_vec())
            }
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") and request
    /// `width`x`height`. The driver may settle on a different size.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CameraError::StreamingNotSupported);
        }

        let (pixel_format, negotiated) = Self::negotiate(&device, width, height)?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc: negotiated.fourcc,
            pixel_format,
        })
    }

    /// Ask for each preferred format in turn and keep the first one the
    /// driver accepts.
    fn negotiate(
        device: &Device,
        width: u32,
        height: u32,
    ) -> Result<(PixelFormat, v4l::Format), CameraError> {
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        for wanted in PixelFormat::PREFERENCE {
            fmt.fourcc = wanted.fourcc();
            fmt.width = width;
            fmt.height = height;

            let negotiated = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;

            if let Some(format) = PixelFormat::from_fourcc(negotiated.fourcc) {
                return Ok((format, negotiated));
            }
            tracing::debug!(wanted = ?wanted, got = ?negotiated.fourcc, "format rejected");
        }

        Err(CameraError::FormatNegotiationFailed(
            "no supported pixel format (need YUYV, MJPG, GREY or Y16)".to_string(),
        ))
    }

    /// Start streaming. Frames are pulled one at a time with
    /// [`CameraStream::next_frame`]; the stream stops when dropped.
    pub fn stream(&self) -> Result<CameraStream<'_>, CameraError> {
        let stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;
        Ok(CameraStream {
            camera: self,
            stream,
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// An open mmap capture stream on a [`Camera`].
pub struct CameraStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl CameraStream<'_> {
    /// Dequeue the next buffer and convert it to grayscale.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let camera = self.camera;
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        // MJPEG buffers are only partially filled.
        let used = (meta.bytesused as usize).min(buf.len());
        let raw = match camera.pixel_format {
            PixelFormat::Mjpeg if used > 0 => &buf[..used],
            _ => buf,
        };

        let gray = camera
            .pixel_format
            .to_grayscale(raw, camera.width, camera.height)
            .map_err(|e| {
                CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", camera.pixel_format))
            })?;
        let is_dark = frame::is_dark_frame(&gray, DARK_FRAME_PCT);

        Ok(Frame {
            data: gray,
            width: camera.width,
            height: camera.height,
            sequence: meta.sequence,
            is_dark,
        })
    }
}
