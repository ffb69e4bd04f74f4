pub mod app;
pub mod call_log;
pub mod camera;
pub mod config;
pub mod dialer;
pub mod error;
pub mod events;
pub mod notifications;
pub mod photo;
pub mod storage;
pub mod timestamp;

pub use app::{Command, EmergencyProfile, PendingCall};
pub use call_log::{CallKind, CallLog, CallLogEntry};
pub use camera::{
    devices_from_config, CaptureController, CaptureSession, CapturedPhoto, MediaDevices,
    SessionStatus, SyntheticDevices,
};
pub use config::LifelineConfig;
pub use dialer::{format_phone_number, Dialer, LoggingDialer};
pub use error::{LifelineError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, ProfileEvent};
pub use notifications::{NotificationQueue, Severity};
pub use photo::{PhotoData, PhotoPayload, PhotoSource, ProfilePhoto, ProfilePhotoStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use timestamp::LastUpdated;
