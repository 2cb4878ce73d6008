//! Capture seams: what the session needs from a camera, and how it gets one.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;

/// A live source of frames. Owned by exactly one capture thread.
pub trait FrameSource {
    /// Native (width, height) the source delivers.
    fn resolution(&self) -> (u32, u32);

    /// Block until the next frame is available.
    fn grab(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for Camera {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        self.grab_frame()
    }
}

/// Acquires a frame source. Called on the capture thread, so the source
/// itself never crosses threads.
pub trait DeviceOpener: Send + Sync + 'static {
    type Source: FrameSource;

    fn open(&self) -> Result<Self::Source, CameraError>;
}

/// Opens a V4L2 device, either a fixed path or the first capture device found.
#[derive(Debug, Clone, Default)]
pub struct V4lOpener {
    device: Option<String>,
}

impl V4lOpener {
    pub fn new(device: Option<String>) -> Self {
        Self { device }
    }
}

impl DeviceOpener for V4lOpener {
    type Source = Camera;

    fn open(&self) -> Result<Camera, CameraError> {
        let path = match &self.device {
            Some(path) => path.clone(),
            None => {
                let first = Camera::list_devices()
                    .into_iter()
                    .next()
                    .ok_or(CameraError::NoCaptureDevice)?;
                tracing::debug!(device = %first.path, name = %first.name, "auto-selected camera");
                first.path
            }
        };
        Camera::open(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_path_missing() {
        let opener = V4lOpener::new(Some("/dev/video-rollcall-missing".into()));
        assert!(matches!(
            opener.open().err(),
            Some(CameraError::DeviceNotFound(_))
        ));
    }
}
