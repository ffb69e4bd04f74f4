use super::device::{MediaDevices, MediaStream, MediaTrack, RgbFrame, StreamConstraints, TrackKind};
use crate::error::CaptureError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Host without any camera API
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDevices;

#[async_trait]
impl MediaDevices for UnavailableDevices {
    fn is_supported(&self) -> bool {
        false
    }

    async fn get_user_media(
        &self,
        _constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

/// Counters shared between a synthetic device and the streams it grants
#[derive(Debug, Default)]
pub struct SyntheticStats {
    streams_granted: AtomicUsize,
    track_stops: AtomicUsize,
    frames_generated: AtomicU64,
}

impl SyntheticStats {
    pub fn streams_granted(&self) -> usize {
        self.streams_granted.load(Ordering::SeqCst)
    }

    /// Number of `stop()` calls across every granted track
    pub fn track_stops(&self) -> usize {
        self.track_stops.load(Ordering::SeqCst)
    }

    pub fn frames_generated(&self) -> u64 {
        self.frames_generated.load(Ordering::SeqCst)
    }
}

struct Behavior {
    deny: Option<String>,
    latency: Duration,
    frame_delay: Duration,
}

/// Camera producing a moving test pattern
pub struct SyntheticDevices {
    behavior: Mutex<Behavior>,
    stats: Arc<SyntheticStats>,
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(Behavior {
                deny: None,
                latency: Duration::ZERO,
                frame_delay: Duration::ZERO,
            }),
            stats: Arc::new(SyntheticStats::default()),
        }
    }

    /// Refuse every request as if the user declined the permission prompt
    pub fn denying<S: Into<String>>(reason: S) -> Self {
        let devices = Self::new();
        devices.set_denied(Some(reason.into()));
        devices
    }

    pub fn set_denied(&self, reason: Option<String>) {
        self.behavior.lock().deny = reason;
    }

    /// Simulated time spent in the permission prompt / device setup
    pub fn set_latency(&self, latency: Duration) {
        self.behavior.lock().latency = latency;
    }

    /// Time each frame grab blocks the calling thread, like a slow sensor
    pub fn set_frame_delay(&self, delay: Duration) {
        self.behavior.lock().frame_delay = delay;
    }

    pub fn stats(&self) -> Arc<SyntheticStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    fn is_supported(&self) -> bool {
        true
    }

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        let (deny, latency, frame_delay) = {
            let behavior = self.behavior.lock();
            (behavior.deny.clone(), behavior.latency, behavior.frame_delay)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(reason) = deny {
            return Err(CaptureError::PermissionDenied { details: reason });
        }

        let (width, height) = constraints.resolution;
        self.stats.streams_granted.fetch_add(1, Ordering::SeqCst);
        info!(
            "Synthetic camera {} granted ({}x{})",
            constraints.device_index, width, height
        );

        let mut tracks: Vec<Box<dyn MediaTrack>> = vec![Box::new(SyntheticTrack::new(
            TrackKind::Video,
            Arc::clone(&self.stats),
        ))];
        if constraints.audio {
            tracks.push(Box::new(SyntheticTrack::new(
                TrackKind::Audio,
                Arc::clone(&self.stats),
            )));
        }

        Ok(Box::new(SyntheticStream {
            width,
            height,
            tracks,
            frame_delay,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct SyntheticTrack {
    id: String,
    kind: TrackKind,
    live: bool,
    stats: Arc<SyntheticStats>,
}

impl SyntheticTrack {
    fn new(kind: TrackKind, stats: Arc<SyntheticStats>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            live: true,
            stats,
        }
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&mut self) {
        self.stats.track_stops.fetch_add(1, Ordering::SeqCst);
        self.live = false;
        debug!("Synthetic track {} stopped", self.id);
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    tracks: Vec<Box<dyn MediaTrack>>,
    frame_delay: Duration,
    stats: Arc<SyntheticStats>,
}

impl MediaStream for SyntheticStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn tracks_mut(&mut self) -> &mut [Box<dyn MediaTrack>] {
        &mut self.tracks
    }

    fn grab_frame(&mut self) -> Result<RgbFrame, CaptureError> {
        if !self.tracks.iter().any(|t| t.kind() == TrackKind::Video && t.is_live()) {
            return Err(CaptureError::Frame {
                details: "video track is not live".to_string(),
            });
        }

        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay);
        }

        let frame_id = self.stats.frames_generated.fetch_add(1, Ordering::SeqCst);
        let shift = (frame_id % 256) as u32;
        let mut data = Vec::with_capacity(RgbFrame::expected_len(self.width, self.height));
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x * 255 / self.width.max(1) + shift) % 256) as u8);
                data.push(((y * 255 / self.height.max(1)) % 256) as u8);
                data.push(((x + y + shift) % 256) as u8);
            }
        }

        trace!(
            "Generated synthetic frame {} ({}x{})",
            frame_id,
            self.width,
            self.height
        );
        Ok(RgbFrame {
            width: self.width,
            height: self.height,
            data,
        })
    }
}
