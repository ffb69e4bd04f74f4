use crate::camera::CapturedPhoto;
use crate::error::PhotoError;
use crate::events::{EventBus, ProfileEvent};
use crate::storage::{KeyValueStore, PROFILE_PHOTO_KEY};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the current profile photo came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSource {
    Default,
    Uploaded,
    Captured,
}

/// Encoded image bytes with their MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPayload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl PhotoPayload {
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (header, encoded) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?;
        let bytes = STANDARD.decode(encoded.trim()).ok()?;
        Some(Self {
            mime: mime.to_string(),
            bytes,
        })
    }
}

impl From<CapturedPhoto> for PhotoPayload {
    fn from(photo: CapturedPhoto) -> Self {
        Self {
            mime: photo.mime.to_string(),
            bytes: photo.bytes,
        }
    }
}

/// Image content of the profile photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoData {
    Url(String),
    Inline(PhotoPayload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePhoto {
    pub source: PhotoSource,
    pub data: PhotoData,
}

/// Persisted form of a chosen photo
#[derive(Debug, Serialize, Deserialize)]
struct StoredPhoto {
    source: PhotoSource,
    data: String,
}

/// Current profile photo, persisted under [`PROFILE_PHOTO_KEY`]
pub struct ProfilePhotoStore {
    store: Arc<dyn KeyValueStore>,
    default_url: String,
    current: Mutex<ProfilePhoto>,
    events: EventBus,
}

impl ProfilePhotoStore {
    /// Compute the startup photo from persisted state
    pub fn load(store: Arc<dyn KeyValueStore>, default_url: &str, events: EventBus) -> Self {
        let default = ProfilePhoto {
            source: PhotoSource::Default,
            data: PhotoData::Url(default_url.to_string()),
        };

        let current = match store.get(PROFILE_PHOTO_KEY) {
            Ok(Some(raw)) => decode_stored(&raw).unwrap_or_else(|| {
                warn!("Ignoring unreadable persisted profile photo");
                default.clone()
            }),
            Ok(None) => default,
            Err(e) => {
                warn!("Profile photo unavailable, using default: {}", e);
                default
            }
        };
        debug!("Initial profile photo source: {:?}", current.source);

        Self {
            store,
            default_url: default_url.to_string(),
            current: Mutex::new(current),
            events,
        }
    }

    /// Replace the photo. `source` should be `Uploaded` or `Captured`.
    pub fn set(&self, payload: PhotoPayload, source: PhotoSource) {
        let stored = StoredPhoto {
            source,
            data: payload.to_data_url(),
        };
        match serde_json::to_string(&stored) {
            Ok(json) => {
                if let Err(e) = self.store.set(PROFILE_PHOTO_KEY, &json) {
                    warn!("Profile photo not durably saved: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize profile photo: {}", e),
        }

        *self.current.lock() = ProfilePhoto {
            source,
            data: PhotoData::Inline(payload),
        };
        info!("Profile photo updated ({:?})", source);
        self.events.publish(ProfileEvent::PhotoChanged { source });
    }

    /// Forget the chosen photo and fall back to the default
    pub fn reset(&self) {
        if let Err(e) = self.store.remove(PROFILE_PHOTO_KEY) {
            warn!("Persisted profile photo not cleared: {}", e);
        }

        *self.current.lock() = ProfilePhoto {
            source: PhotoSource::Default,
            data: PhotoData::Url(self.default_url.clone()),
        };
        info!("Profile photo reset to default");
        self.events.publish(ProfileEvent::PhotoChanged {
            source: PhotoSource::Default,
        });
    }

    pub fn current(&self) -> ProfilePhoto {
        self.current.lock().clone()
    }
}

fn decode_stored(raw: &str) -> Option<ProfilePhoto> {
    if let Ok(stored) = serde_json::from_str::<StoredPhoto>(raw) {
        let data = match PhotoPayload::from_data_url(&stored.data) {
            Some(payload) => PhotoData::Inline(payload),
            None => PhotoData::Url(stored.data),
        };
        return Some(ProfilePhoto {
            source: stored.source,
            data,
        });
    }

    // Older values hold a bare data URL
    PhotoPayload::from_data_url(raw.trim()).map(|payload| ProfilePhoto {
        source: PhotoSource::Uploaded,
        data: PhotoData::Inline(payload),
    })
}

/// Read an image file chosen for upload
pub async fn load_upload<P: AsRef<Path>>(path: P) -> Result<PhotoPayload, PhotoError> {
    let path = path.as_ref();
    let shown_path = path.display().to_string();

    let bytes = tokio::fs::read(path).await.map_err(|e| PhotoError::Read {
        path: shown_path.clone(),
        source: e,
    })?;

    if bytes.is_empty() {
        return Err(PhotoError::Empty { path: shown_path });
    }

    let format = image::guess_format(&bytes)
        .map_err(|_| PhotoError::UnsupportedFormat {
            path: shown_path.clone(),
        })?;
    let mime = mime_for(format).ok_or(PhotoError::UnsupportedFormat {
        path: shown_path.clone(),
    })?;

    debug!("Loaded {} ({} bytes, {})", path.display(), bytes.len(), mime);
    Ok(PhotoPayload {
        mime: mime.to_string(),
        bytes,
    })
}

fn mime_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}
