//! Camera capture
//!
//! Frame source seam plus the nokhwa-backed implementation. The capture
//! loop only ever sees the `FrameSource` trait, so tests can feed scripted
//! frames and the physical device stays an external collaborator.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

use crate::frame::{Frame, FRAME_HEIGHT, FRAME_WIDTH};

/// Information about an available capture device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    /// Device index usable with [`NokhwaSource::open`].
    pub index: u32,
    /// Human-readable device name.
    pub label: String,
}

/// Camera-level errors: open or read failures, never process-fatal.
#[derive(Debug)]
pub enum CameraError {
    /// The device could not be opened or its stream could not start.
    OpenFailed(String),
    /// A single read failed; the caller may retry.
    ReadFailed(String),
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::OpenFailed(e) => write!(f, "camera open failed: {}", e),
            CameraError::ReadFailed(e) => write!(f, "camera read failed: {}", e),
        }
    }
}

impl std::error::Error for CameraError {}

/// A source of frames at the working resolution.
pub trait FrameSource: Send {
    /// Pull the next frame. `Ok(None)` signals end-of-stream and terminates
    /// the capture loop gracefully; `Err` is a retryable read failure.
    fn read(&mut self) -> Result<Option<Frame>, CameraError>;
}

/// Physical camera behind nokhwa, decoding to RGB and converting to the
/// working resolution.
pub struct NokhwaSource {
    camera: Camera,
}

impl NokhwaSource {
    /// List available capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        match nokhwa::query(ApiBackend::Auto) {
            Ok(cameras) => cameras
                .iter()
                .enumerate()
                .map(|(idx, info)| DeviceInfo {
                    index: idx as u32,
                    label: info.human_name().to_string(),
                })
                .collect(),
            Err(e) => {
                log::warn!("Failed to enumerate cameras: {:?}", e);
                Vec::new()
            }
        }
    }

    /// Open a device and start its stream.
    ///
    /// Tries the working resolution first, then falls back to whatever the
    /// device offers; frames are converted after decode either way.
    pub fn open(camera_index: u32) -> Result<Self, CameraError> {
        let index = CameraIndex::Index(camera_index);

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(FRAME_WIDTH, FRAME_HEIGHT),
        ));

        let mut camera = match Camera::new(index.clone(), requested) {
            Ok(camera) => camera,
            Err(e) => {
                log::warn!("Failed to open camera at {}x{}: {:?}", FRAME_WIDTH, FRAME_HEIGHT, e);
                let fallback = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                Camera::new(index, fallback)
                    .map_err(|e| CameraError::OpenFailed(format!("{:?}", e)))?
            }
        };

        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(format!("{:?}", e)))?;

        log::info!(
            "Camera opened: {} ({}x{})",
            camera.info().human_name(),
            camera.resolution().width(),
            camera.resolution().height()
        );

        Ok(Self { camera })
    }
}

impl FrameSource for NokhwaSource {
    fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(format!("{:?}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(format!("{:?}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        let frame = Frame::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::ReadFailed("decoded buffer length mismatch".into()))?;

        Ok(Some(frame.scaled_to(FRAME_WIDTH, FRAME_HEIGHT)))
    }
}

impl Drop for NokhwaSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {:?}", e);
        }
    }
}
