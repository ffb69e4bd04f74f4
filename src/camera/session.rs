use super::device::{MediaDevices, MediaStream, StreamConstraints, StreamHandle};
use super::encode::{encode_still, CapturedPhoto};
use crate::config::CameraConfig;
use crate::error::CaptureError;
use crate::events::{EventBus, ProfileEvent};
use crate::notifications::{NotificationQueue, Severity};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const UNSUPPORTED_MESSAGE: &str =
    "Camera access is not supported on this device. Please use the upload option instead.";
const ACCESS_FAILED_MESSAGE: &str = "Could not access camera. Please use the upload option instead.";

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Idle,
    Acquiring,
    Live,
    Captured,
    Closed,
    Failed,
}

impl SessionStatus {
    /// States in which a device handle is (or is about to be) held
    pub fn holds_device(&self) -> bool {
        matches!(self, SessionStatus::Acquiring | SessionStatus::Live)
    }
}

struct SessionState {
    status: SessionStatus,
    stream: Option<StreamHandle>,
    preview: Option<(u32, u32)>,
    last_frame: Option<CapturedPhoto>,
    modal_open: bool,
}

/// One camera capture lifecycle. Cloning shares the same session.
#[derive(Clone)]
pub struct CaptureSession {
    id: Uuid,
    state: Arc<Mutex<SessionState>>,
    events: EventBus,
    jpeg_quality: u8,
}

impl CaptureSession {
    /// Open the modal and enter `Acquiring`
    fn begin(events: EventBus, jpeg_quality: u8) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            state: Arc::new(Mutex::new(SessionState {
                status: SessionStatus::Acquiring,
                stream: None,
                preview: None,
                last_frame: None,
                modal_open: true,
            })),
            events,
            jpeg_quality,
        };
        session.publish_status(SessionStatus::Acquiring);
        session
    }

    /// A session that failed before any modal was shown
    fn unsupported(events: EventBus, jpeg_quality: u8) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            state: Arc::new(Mutex::new(SessionState {
                status: SessionStatus::Failed,
                stream: None,
                preview: None,
                last_frame: None,
                modal_open: false,
            })),
            events,
            jpeg_quality,
        };
        session.publish_status(SessionStatus::Failed);
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn holds_stream(&self) -> bool {
        self.state.lock().stream.is_some()
    }

    pub fn is_modal_open(&self) -> bool {
        self.state.lock().modal_open
    }

    /// Resolution of the attached preview, while live
    pub fn preview_resolution(&self) -> Option<(u32, u32)> {
        self.state.lock().preview
    }

    pub fn last_frame(&self) -> Option<CapturedPhoto> {
        self.state.lock().last_frame.clone()
    }

    /// Hand a granted stream to the session.
    ///
    /// If the session was closed while the request was pending, the stream
    /// is released on the spot and the session stays closed.
    fn attach(&self, stream: Box<dyn MediaStream>) -> Result<(), CaptureError> {
        let handle = StreamHandle::new(stream);
        let resolution = handle.resolution();
        {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Acquiring {
                warn!(
                    "Camera granted after session {} was {:?}; releasing",
                    self.id, state.status
                );
                handle.release();
                return Err(CaptureError::Cancelled);
            }
            state.stream = Some(handle);
            state.preview = Some(resolution);
            state.status = SessionStatus::Live;
        }

        self.publish_status(SessionStatus::Live);
        self.events.publish(ProfileEvent::PreviewAttached {
            session_id: self.id,
            width: resolution.0,
            height: resolution.1,
        });
        Ok(())
    }

    /// Move an acquiring session to `Failed`. Returns false when the session
    /// had already left `Acquiring` (closed by the user).
    fn fail(&self, reason: &CaptureError) -> bool {
        {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Acquiring {
                return false;
            }
            if let Some(handle) = state.stream.take() {
                handle.release();
            }
            state.preview = None;
            state.modal_open = false;
            state.status = SessionStatus::Failed;
        }

        error!("Capture session {} failed: {}", self.id, reason);
        self.events
            .publish(ProfileEvent::CaptureModalClosed { session_id: self.id });
        self.publish_status(SessionStatus::Failed);
        true
    }

    /// Take a still from the live preview.
    ///
    /// Only valid while `Live`; anywhere else it returns `Ok(None)` and
    /// changes nothing. The frame is pulled and encoded on the blocking
    /// pool so the session stays closable meanwhile. On success the stream
    /// is released and the session is `Captured`.
    pub async fn capture(&self) -> Result<Option<CapturedPhoto>, CaptureError> {
        let handle = {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Live {
                debug!(
                    "Ignoring capture on session {} in {:?}",
                    self.id, state.status
                );
                return Ok(None);
            }
            match state.stream.take() {
                Some(handle) => handle,
                None => {
                    debug!("Capture already in progress on session {}", self.id);
                    return Ok(None);
                }
            }
        };

        let quality = self.jpeg_quality;
        let grabbed = tokio::task::spawn_blocking(move || {
            let mut handle = handle;
            let photo = handle
                .grab_frame()
                .and_then(|frame| encode_still(frame, quality));
            (handle, photo)
        })
        .await;

        let (handle, photo) = match grabbed {
            Ok(grabbed) => grabbed,
            Err(e) => {
                // The handle went down with the task and stopped its tracks
                error!("Frame grab task for session {} failed: {}", self.id, e);
                self.close();
                return Err(CaptureError::Frame {
                    details: format!("frame grab task failed: {}", e),
                });
            }
        };

        let photo = {
            let mut state = self.state.lock();
            if state.status != SessionStatus::Live {
                debug!(
                    "Session {} became {:?} during capture; releasing stream",
                    self.id, state.status
                );
                handle.release();
                return Ok(None);
            }
            match photo {
                Ok(photo) => {
                    handle.release();
                    state.preview = None;
                    state.last_frame = Some(photo.clone());
                    state.status = SessionStatus::Captured;
                    photo
                }
                Err(e) => {
                    state.stream = Some(handle);
                    return Err(e);
                }
            }
        };

        info!(
            "Captured {}x{} photo ({} bytes) in session {}",
            photo.width,
            photo.height,
            photo.bytes.len(),
            self.id
        );
        self.publish_status(SessionStatus::Captured);
        Ok(Some(photo))
    }

    /// Release the stream (if any), tear down the modal and enter `Closed`.
    ///
    /// Safe to call any number of times from any state.
    pub fn close(&self) {
        let modal_was_open = {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Closed {
                return;
            }
            if let Some(handle) = state.stream.take() {
                handle.release();
            }
            state.preview = None;
            let modal_was_open = state.modal_open;
            state.modal_open = false;
            state.status = SessionStatus::Closed;
            modal_was_open
        };

        if modal_was_open {
            self.events
                .publish(ProfileEvent::CaptureModalClosed { session_id: self.id });
        }
        self.publish_status(SessionStatus::Closed);
    }

    fn publish_status(&self, status: SessionStatus) {
        self.events.publish(ProfileEvent::CaptureStateChanged {
            session_id: self.id,
            status,
            timestamp: SystemTime::now(),
        });
    }
}

/// Closes a session whose device request was dropped before it resolved
struct AcquisitionGuard<'a> {
    session: &'a CaptureSession,
    armed: bool,
}

impl<'a> AcquisitionGuard<'a> {
    fn new(session: &'a CaptureSession) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AcquisitionGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.status() == SessionStatus::Acquiring {
            warn!(
                "Camera request for session {} abandoned; closing",
                self.session.id()
            );
            self.session.close();
        }
    }
}

/// Owns the single capture session slot and the device capability
pub struct CaptureController {
    devices: Arc<dyn MediaDevices>,
    constraints: StreamConstraints,
    jpeg_quality: u8,
    events: EventBus,
    notifications: NotificationQueue,
    current: Mutex<Option<CaptureSession>>,
}

impl CaptureController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        config: &CameraConfig,
        events: EventBus,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            devices,
            constraints: StreamConstraints {
                device_index: config.index,
                resolution: config.resolution,
                audio: false,
            },
            jpeg_quality: config.jpeg_quality,
            events,
            notifications,
            current: Mutex::new(None),
        }
    }

    /// Start a new capture session.
    ///
    /// Rejected with [`CaptureError::SessionActive`] while another session is
    /// acquiring or live. A session left in `Captured` is closed first. On a
    /// host without camera support no modal is shown and the session starts
    /// out `Failed`. Dropping the returned future mid-request closes the
    /// session.
    pub async fn open(&self) -> Result<CaptureSession, CaptureError> {
        let supported = self.devices.is_supported();
        let session = {
            let mut current = self.current.lock();
            if let Some(existing) = current.as_ref() {
                let status = existing.status();
                if status.holds_device() {
                    warn!(
                        "Rejecting camera open: session {} is {:?}",
                        existing.id(),
                        status
                    );
                    return Err(CaptureError::SessionActive {
                        status: format!("{:?}", status),
                    });
                }
                existing.close();
            }

            let session = if supported {
                CaptureSession::begin(self.events.clone(), self.jpeg_quality)
            } else {
                CaptureSession::unsupported(self.events.clone(), self.jpeg_quality)
            };
            *current = Some(session.clone());
            session
        };

        if !supported {
            warn!("Camera not supported; session {} failed", session.id());
            self.notifications
                .enqueue(UNSUPPORTED_MESSAGE, Severity::Warning);
            return Err(CaptureError::Unsupported);
        }

        info!("Requesting camera stream for session {}", session.id());
        let guard = AcquisitionGuard::new(&session);
        let requested = self.devices.get_user_media(&self.constraints).await;
        guard.disarm();

        match requested {
            Ok(stream) => {
                session.attach(stream)?;
                Ok(session)
            }
            Err(err) => {
                if session.fail(&err) {
                    self.notifications
                        .enqueue(ACCESS_FAILED_MESSAGE, Severity::Error);
                    Err(err)
                } else {
                    debug!("Camera request failed after session was closed: {}", err);
                    Err(CaptureError::Cancelled)
                }
            }
        }
    }

    /// Capture from the current session, if it is live
    pub async fn capture(&self) -> Result<Option<CapturedPhoto>, CaptureError> {
        match self.current() {
            Some(session) => session.capture().await,
            None => Ok(None),
        }
    }

    /// Close the current session; idempotent
    pub fn close(&self) {
        if let Some(session) = self.current() {
            session.close();
        }
    }

    pub fn current(&self) -> Option<CaptureSession> {
        self.current.lock().clone()
    }

    /// Status for rendering; `Idle` until a session has been requested
    pub fn state(&self) -> SessionStatus {
        self.current()
            .map(|session| session.status())
            .unwrap_or(SessionStatus::Idle)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(session) = self.current.get_mut().take() {
            session.close();
        }
    }
}
