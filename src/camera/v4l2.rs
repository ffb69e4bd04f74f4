use super::device::{MediaDevices, MediaStream, MediaTrack, RgbFrame, StreamConstraints, TrackKind};
use crate::error::CaptureError;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::Path;
use tracing::{debug, info, warn};

/// V4L2 camera through a GStreamer pipeline ending in an RGB appsink
pub struct GstDevices;

impl GstDevices {
    pub fn new() -> Result<Self, CaptureError> {
        gstreamer::init().map_err(|e| CaptureError::Device {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }

    fn build_pipeline_string(constraints: &StreamConstraints) -> String {
        let (width, height) = constraints.resolution;
        format!(
            "v4l2src device=/dev/video{} ! \
             videoconvert ! videoscale ! \
             video/x-raw,format=RGB,width={},height={} ! \
             appsink name=sink sync=false max-buffers=1 drop=true",
            constraints.device_index, width, height
        )
    }
}

#[async_trait]
impl MediaDevices for GstDevices {
    fn is_supported(&self) -> bool {
        true
    }

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        let device = format!("/dev/video{}", constraints.device_index);
        if !Path::new(&device).exists() {
            return Err(CaptureError::Device {
                details: format!("{} not found", device),
            });
        }

        let pipeline_desc = Self::build_pipeline_string(constraints);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CaptureError::Device {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CaptureError::Device {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CaptureError::Device {
                details: "Pipeline has no appsink".to_string(),
            })?;

        // Device negotiation blocks; keep it off the event loop
        let starting = pipeline.clone();
        let started = tokio::task::spawn_blocking(move || {
            if starting.set_state(gstreamer::State::Playing).is_err() {
                return Err(pipeline_error(&starting));
            }
            let (result, _, _) = starting.state(gstreamer::ClockTime::from_seconds(5));
            result.map(|_| ()).map_err(|_| pipeline_error(&starting))
        })
        .await
        .map_err(|e| CaptureError::Device {
            details: format!("Camera start task failed: {}", e),
        })?;

        if let Err(details) = started {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(if details.to_ascii_lowercase().contains("permission") {
                CaptureError::PermissionDenied { details }
            } else {
                CaptureError::Device { details }
            });
        }

        info!("GStreamer camera {} streaming", device);
        Ok(Box::new(GstStream {
            resolution: constraints.resolution,
            appsink,
            tracks: vec![Box::new(GstTrack {
                id: device,
                pipeline,
                live: true,
            })],
        }))
    }
}

fn pipeline_error(pipeline: &Pipeline) -> String {
    pipeline
        .bus()
        .and_then(|bus| {
            bus.timed_pop_filtered(
                gstreamer::ClockTime::ZERO,
                &[gstreamer::MessageType::Error],
            )
        })
        .and_then(|message| match message.view() {
            gstreamer::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "pipeline failed to start".to_string())
}

struct GstTrack {
    id: String,
    pipeline: Pipeline,
    live: bool,
}

impl MediaTrack for GstTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline for {}: {}", self.id, e);
        }
        self.live = false;
        debug!("GStreamer track {} stopped", self.id);
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct GstStream {
    resolution: (u32, u32),
    appsink: AppSink,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaStream for GstStream {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn tracks_mut(&mut self) -> &mut [Box<dyn MediaTrack>] {
        &mut self.tracks
    }

    fn grab_frame(&mut self) -> Result<RgbFrame, CaptureError> {
        let sample = self
            .appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(2))
            .ok_or_else(|| CaptureError::Frame {
                details: "No frame received from camera".to_string(),
            })?;

        let caps = sample.caps().ok_or_else(|| CaptureError::Frame {
            details: "No caps in sample".to_string(),
        })?;
        let info = VideoInfo::from_caps(caps).map_err(|e| CaptureError::Frame {
            details: format!("Failed to get video info: {}", e),
        })?;
        let buffer = sample.buffer().ok_or_else(|| CaptureError::Frame {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| CaptureError::Frame {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let width = info.width();
        let height = info.height();
        let row_len = width as usize * 3;
        let stride = info.stride()[0].max(0) as usize;
        let src = map.as_slice();

        // Rows may be padded; copy them out tightly packed
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_len;
            if end > src.len() {
                return Err(CaptureError::Frame {
                    details: "Truncated frame buffer".to_string(),
                });
            }
            data.extend_from_slice(&src[start..end]);
        }

        self.resolution = (width, height);
        Ok(RgbFrame {
            width,
            height,
            data,
        })
    }
}
