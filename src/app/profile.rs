use super::command::{Command, PendingCall};
use crate::call_log::{CallLog, CallLogEntry};
use crate::camera::{devices_from_config, CaptureController, MediaDevices, SessionStatus};
use crate::config::LifelineConfig;
use crate::dialer::{format_phone_number, Dialer, LoggingDialer, CALL_VIBRATION};
use crate::error::{LifelineError, Result};
use crate::events::{EventBus, ProfileEvent};
use crate::notifications::{NotificationQueue, Severity};
use crate::photo::{load_upload, PhotoPayload, PhotoSource, ProfilePhoto, ProfilePhotoStore};
use crate::storage::{FileStore, KeyValueStore};
use crate::timestamp::LastUpdated;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process-scoped profile state. Owns every component and routes commands to them.
pub struct EmergencyProfile {
    events: EventBus,
    notifications: NotificationQueue,
    call_log: CallLog,
    photos: ProfilePhotoStore,
    last_updated: LastUpdated,
    capture: CaptureController,
    dialer: Arc<dyn Dialer>,
    pending_call: Mutex<Option<PendingCall>>,
}

impl EmergencyProfile {
    /// Build the profile over explicit collaborators, loading persisted state
    pub fn new(
        config: &LifelineConfig,
        store: Arc<dyn KeyValueStore>,
        devices: Arc<dyn MediaDevices>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        let events = EventBus::new(config.system.event_bus_capacity);
        let notifications = NotificationQueue::new(&config.notifications, events.clone());
        let call_log = CallLog::load(Arc::clone(&store), config.call_log.max_entries);
        let photos =
            ProfilePhotoStore::load(Arc::clone(&store), &config.photo.default_url, events.clone());
        let last_updated = LastUpdated::load_or_init(Arc::clone(&store));
        let capture = CaptureController::new(
            devices,
            &config.camera,
            events.clone(),
            notifications.clone(),
        );

        info!(
            "Profile loaded: {} call log entries, photo source {:?}",
            call_log.len(),
            photos.current().source
        );

        Self {
            events,
            notifications,
            call_log,
            photos,
            last_updated,
            capture,
            dialer,
            pending_call: Mutex::new(None),
        }
    }

    /// Build the profile the binary uses: file storage, configured camera, logging dialer
    pub fn open(config: &LifelineConfig) -> Result<Self> {
        let store = FileStore::open(&config.storage.path, config.storage.quota_bytes)?;
        Ok(Self::new(
            config,
            Arc::new(store),
            devices_from_config(&config.camera),
            Arc::new(LoggingDialer),
        ))
    }

    /// Apply one user intent.
    ///
    /// Failures have already been surfaced as notifications when this returns
    /// an error; the profile stays usable either way.
    pub async fn dispatch(&self, command: Command) -> Result<()> {
        debug!("Dispatching {}", command.name());

        match command {
            Command::Call { number } => self.call(&number),
            Command::EmergencyCall {
                number,
                contact_name,
            } => {
                self.stage_call(number, contact_name);
                Ok(())
            }
            Command::ConfirmCall => self.confirm_call(),
            Command::CancelCall => {
                self.cancel_call();
                Ok(())
            }
            Command::UpdateTimestamp => {
                self.last_updated.touch(&self.events, &self.notifications);
                Ok(())
            }
            Command::UploadPhoto { path } => match load_upload(&path).await {
                Ok(payload) => {
                    self.photos.set(payload, PhotoSource::Uploaded);
                    self.notifications
                        .enqueue("Photo updated successfully!", Severity::Success);
                    Ok(())
                }
                Err(e) => {
                    warn!("Photo upload rejected: {}", e);
                    self.notifications
                        .enqueue("Could not read the selected photo.", Severity::Error);
                    Err(e.into())
                }
            },
            Command::OpenCamera => {
                self.capture.open().await?;
                Ok(())
            }
            Command::CapturePhoto => self.capture_photo().await,
            Command::CancelCapture => {
                self.capture.close();
                Ok(())
            }
            Command::ResetPhoto => {
                self.photos.reset();
                self.notifications
                    .enqueue("Photo reset to default", Severity::Info);
                Ok(())
            }
            Command::Escape => {
                self.cancel_call();
                self.capture.close();
                Ok(())
            }
            Command::Navigate => {
                info!("Leaving profile; releasing camera");
                self.capture.close();
                Ok(())
            }
        }
    }

    fn call(&self, number: &str) -> Result<()> {
        self.dialer.vibrate(CALL_VIBRATION);
        let dialed = self.dialer.dial(number);
        self.record(CallLogEntry::attempt(number));

        dialed.map_err(|e| {
            error!("Call to {} failed: {}", number, e);
            self.notifications.enqueue(
                format!("Unable to call {}", format_phone_number(number)),
                Severity::Error,
            );
            LifelineError::from(e)
        })
    }

    fn stage_call(&self, number: String, contact_name: String) {
        let pending = PendingCall {
            display_number: format_phone_number(&number),
            number,
            contact_name,
        };
        info!(
            "Confirm call to {} at {}",
            pending.contact_name, pending.display_number
        );
        *self.pending_call.lock() = Some(pending);
    }

    fn confirm_call(&self) -> Result<()> {
        let Some(pending) = self.pending_call.lock().take() else {
            debug!("No call awaiting confirmation");
            return Ok(());
        };

        let result = self.call(&pending.number);
        self.record(CallLogEntry::emergency(
            &pending.number,
            &pending.contact_name,
        ));
        result
    }

    fn cancel_call(&self) {
        if let Some(pending) = self.pending_call.lock().take() {
            debug!("Cancelled call to {}", pending.contact_name);
        }
    }

    async fn capture_photo(&self) -> Result<()> {
        let photo = match self.capture.capture().await {
            Ok(Some(photo)) => photo,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("Capture failed: {}", e);
                self.notifications
                    .enqueue("Could not capture photo.", Severity::Error);
                self.capture.close();
                return Err(e.into());
            }
        };

        self.photos
            .set(PhotoPayload::from(photo), PhotoSource::Captured);
        self.capture.close();
        self.notifications
            .enqueue("Photo captured successfully!", Severity::Success);
        Ok(())
    }

    fn record(&self, entry: CallLogEntry) {
        let phone_number = entry.phone_number.clone();
        let kind = entry.kind;
        self.call_log.append(entry);
        self.events.publish(ProfileEvent::CallLogged { phone_number, kind });
    }

    pub fn call_log(&self) -> &CallLog {
        &self.call_log
    }

    pub fn photo(&self) -> ProfilePhoto {
        self.photos.current()
    }

    pub fn capture_state(&self) -> SessionStatus {
        self.capture.state()
    }

    pub fn capture_controller(&self) -> &CaptureController {
        &self.capture
    }

    pub fn pending_call(&self) -> Option<PendingCall> {
        self.pending_call.lock().clone()
    }

    pub fn last_updated(&self) -> String {
        self.last_updated.display()
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
