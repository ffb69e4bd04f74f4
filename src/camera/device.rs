use crate::error::CaptureError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// What the session asks the device for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub device_index: u32,
    /// Ideal preview resolution; the device may pick another
    pub resolution: (u32, u32),
    pub audio: bool,
}

/// Uncompressed RGB24 preview frame at the stream's native resolution
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn is_complete(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::expected_len(self.width, self.height)
    }
}

/// One live device track. Stopping releases the underlying hardware.
pub trait MediaTrack: Send {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn stop(&mut self);
    fn is_live(&self) -> bool;
}

/// A granted camera stream
pub trait MediaStream: Send {
    /// Native resolution of the preview feed
    fn resolution(&self) -> (u32, u32);
    fn tracks_mut(&mut self) -> &mut [Box<dyn MediaTrack>];
    /// Current preview frame
    fn grab_frame(&mut self) -> Result<RgbFrame, CaptureError>;
}

/// Camera capability of the host
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether a camera API exists at all
    fn is_supported(&self) -> bool;

    /// Request a stream; may wait on a permission prompt or device setup
    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// Exclusive owner of a granted stream.
///
/// Tracks are stopped exactly once: on [`StreamHandle::release`] or, failing
/// that, when the handle is dropped.
pub(crate) struct StreamHandle {
    stream: Box<dyn MediaStream>,
    released: bool,
}

impl StreamHandle {
    pub(crate) fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    pub(crate) fn resolution(&self) -> (u32, u32) {
        self.stream.resolution()
    }

    pub(crate) fn grab_frame(&mut self) -> Result<RgbFrame, CaptureError> {
        self.stream.grab_frame()
    }

    /// Stop every track, then drop the stream
    pub(crate) fn release(mut self) {
        self.stop_tracks();
    }

    fn stop_tracks(&mut self) {
        if self.released {
            return;
        }
        for track in self.stream.tracks_mut() {
            debug!("Stopping {:?} track {}", track.kind(), track.id());
            track.stop();
        }
        self.released = true;
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
