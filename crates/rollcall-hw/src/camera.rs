//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError, PixelLayout};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("no video capture device available")]
    NoCaptureDevice,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

impl CameraError {
    /// True when the platform has no usable capture capability at all,
    /// as opposed to a device that exists but could not be acquired.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            CameraError::NoCaptureDevice | CameraError::StreamingNotSupported
        )
    }
}

/// Map an `open(2)` failure to a camera error.
pub(crate) fn classify_open_error(device_path: &str, err: &std::io::Error) -> CameraError {
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => {
            CameraError::PermissionDenied(device_path.to_string())
        }
        Some(libc::EBUSY) => CameraError::DeviceBusy,
        _ if err.kind() == std::io::ErrorKind::PermissionDenied => {
            CameraError::PermissionDenied(device_path.to_string())
        }
        _ => CameraError::DeviceNotFound(format!("{device_path}: {err}")),
    }
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
    /// YUYV 4:2:2 packed (2 bytes/pixel), converted to RGB.
    Yuyv,
    /// Motion JPEG, decoded to RGB.
    Mjpg,
    /// 8-bit grayscale (native IR camera output).
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"GREY" => Some(PixelFormat::Grey),
            b"Y16 " | b"Y16\0" => Some(PixelFormat::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera device handle. The device is closed on drop.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") at its
    /// current native resolution.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device =
            Device::with_path(device_path).map_err(|e| classify_open_error(device_path, &e))?;

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

        // Keep the driver's current resolution. Only ask for YUYV when the
        // current pixel format is one we cannot convert.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        let negotiated = if PixelFormat::from_fourcc(fmt.fourcc).is_some() {
            fmt
        } else {
            fmt.fourcc = FourCC::new(b"YUYV");
            device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?
        };

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// Capture a single frame and convert it to RGB (or luma for
    /// monochrome sensors).
    pub fn grab_frame(&self) -> Result<Frame, CameraError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CameraError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let used = (meta.bytesused as usize).min(buf.len());
        let (data, width, height, layout) = self.convert(&buf[..used])?;

        Ok(Frame {
            data,
            width,
            height,
            layout,
        })
    }

    fn convert(&self, buf: &[u8]) -> Result<(Vec<u8>, u32, u32, PixelLayout), CameraError> {
        let (w, h) = (self.width, self.height);
        match self.pixel_format {
            PixelFormat::Yuyv => Ok((frame::yuyv_to_rgb(buf, w, h)?, w, h, PixelLayout::Rgb8)),
            PixelFormat::Mjpg => {
                let (rgb, dw, dh) = frame::decode_mjpeg(buf)?;
                Ok((rgb, dw, dh, PixelLayout::Rgb8))
            }
            PixelFormat::Grey => {
                let pixels = (w * h) as usize;
                if buf.len() < pixels {
                    return Err(FrameError::InvalidLength {
                        expected: pixels,
                        actual: buf.len(),
                    }
                    .into());
                }
                Ok((buf[..pixels].to_vec(), w, h, PixelLayout::Luma8))
            }
            PixelFormat::Y16 => Ok((frame::y16_to_luma(buf, w, h)?, w, h, PixelLayout::Luma8)),
        }
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
