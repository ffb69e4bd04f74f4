mod device;
mod encode;
#[cfg(all(target_os = "linux", feature = "camera"))]
mod v4l2;
mod session;
mod synthetic;

pub use device::{MediaDevices, MediaStream, MediaTrack, RgbFrame, StreamConstraints, TrackKind};
pub use encode::{CapturedPhoto, JPEG_MIME};
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use v4l2::GstDevices;
pub use session::{CaptureController, CaptureSession, SessionStatus};
pub use synthetic::{SyntheticDevices, SyntheticStats, UnavailableDevices};

use crate::config::{CameraBackend, CameraConfig};
use std::sync::Arc;
use tracing::warn;

/// Build the device capability selected in configuration
pub fn devices_from_config(config: &CameraConfig) -> Arc<dyn MediaDevices> {
    match config.backend {
        CameraBackend::None => Arc::new(UnavailableDevices),
        CameraBackend::Synthetic => Arc::new(SyntheticDevices::new()),
        CameraBackend::Gstreamer => gstreamer_devices(),
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
fn gstreamer_devices() -> Arc<dyn MediaDevices> {
    match GstDevices::new() {
        Ok(devices) => Arc::new(devices),
        Err(e) => {
            warn!("GStreamer camera unavailable: {}", e);
            Arc::new(UnavailableDevices)
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "camera")))]
fn gstreamer_devices() -> Arc<dyn MediaDevices> {
    warn!("GStreamer camera backend requires the `camera` feature on Linux");
    Arc::new(UnavailableDevices)
}
