use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifelineConfig {
    pub storage: StorageConfig,
    pub call_log: CallLogConfig,
    pub notifications: NotificationConfig,
    pub camera: CameraConfig,
    pub photo: PhotoConfig,
    pub speed_dial: SpeedDialConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one file per persisted key
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Upper bound on the total bytes the store may hold (0 = unlimited)
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CallLogConfig {
    /// Number of most recent entries retained
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    /// How long a notification stays fully visible
    #[serde(default = "default_display_ms")]
    pub display_ms: u64,

    /// Exit animation window before the notification is removed
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Which camera backend to use
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackend,

    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested preview resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// JPEG quality for captured stills (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// No camera capability; opening a session always fails
    None,
    /// Generated test pattern, for demos and tests
    Synthetic,
    /// GStreamer v4l2 source (requires the `camera` feature)
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PhotoConfig {
    /// Photo shown when nothing has been uploaded or captured
    #[serde(default = "default_photo_url")]
    pub default_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SpeedDialConfig {
    #[serde(default = "default_primary_number")]
    pub primary_number: String,

    #[serde(default = "default_primary_name")]
    pub primary_name: String,

    #[serde(default = "default_secondary_number")]
    pub secondary_number: String,

    #[serde(default = "default_secondary_name")]
    pub secondary_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl LifelineConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("storage.path", default_storage_path())?
            .set_default("storage.quota_bytes", default_quota_bytes() as i64)?
            .set_default("call_log.max_entries", default_max_entries() as i64)?
            .set_default("notifications.display_ms", default_display_ms() as i64)?
            .set_default(
                "notifications.transition_ms",
                default_transition_ms() as i64,
            )?
            .set_default("camera.backend", "gstreamer")?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("photo.default_url", default_photo_url())?
            .set_default("speed_dial.primary_number", default_primary_number())?
            .set_default("speed_dial.primary_name", default_primary_name())?
            .set_default("speed_dial.secondary_number", default_secondary_number())?
            .set_default("speed_dial.secondary_name", default_secondary_name())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Configuration file is optional
            .add_source(File::with_name(&path_str).required(false))
            // LIFELINE_CALL_LOG__MAX_ENTRIES and friends
            .add_source(
                Environment::with_prefix("LIFELINE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: LifelineConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage path must not be empty".to_string(),
            ));
        }

        if self.call_log.max_entries == 0 {
            return Err(ConfigError::Message(
                "Call log max_entries must be greater than 0".to_string(),
            ));
        }

        if self.notifications.display_ms == 0 {
            return Err(ConfigError::Message(
                "Notification display_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(ConfigError::Message(
                "Camera jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for LifelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                path: default_storage_path(),
                quota_bytes: default_quota_bytes(),
            },
            call_log: CallLogConfig {
                max_entries: default_max_entries(),
            },
            notifications: NotificationConfig {
                display_ms: default_display_ms(),
                transition_ms: default_transition_ms(),
            },
            camera: CameraConfig {
                backend: default_camera_backend(),
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                jpeg_quality: default_jpeg_quality(),
            },
            photo: PhotoConfig {
                default_url: default_photo_url(),
            },
            speed_dial: SpeedDialConfig {
                primary_number: default_primary_number(),
                primary_name: default_primary_name(),
                secondary_number: default_secondary_number(),
                secondary_name: default_secondary_name(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

fn default_storage_path() -> String {
    "./lifeline-data".to_string()
}
// Same order of magnitude as a browser origin's local storage
fn default_quota_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_entries() -> usize {
    50
}

fn default_display_ms() -> u64 {
    3000
}
fn default_transition_ms() -> u64 {
    300
}

fn default_camera_backend() -> CameraBackend {
    CameraBackend::Gstreamer
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (400, 300)
}
fn default_jpeg_quality() -> u8 {
    80
}

fn default_photo_url() -> String {
    "https://images.pexels.com/photos/1239291/pexels-photo-1239291.jpeg?auto=compress&cs=tinysrgb&w=400&h=400&fit=crop".to_string()
}

fn default_primary_number() -> String {
    "911".to_string()
}
fn default_primary_name() -> String {
    "Emergency Services".to_string()
}
fn default_secondary_number() -> String {
    "+15553456789".to_string()
}
fn default_secondary_name() -> String {
    "David Johnson".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
