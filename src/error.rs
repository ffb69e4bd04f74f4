use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Photo error: {0}")]
    Photo(#[from] PhotoError),

    #[error("Dial error: {0}")]
    Dial(#[from] DialError),
}

/// Failures of the key-value persistence backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage quota exceeded writing '{key}' ({requested} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        requested: u64,
        available: u64,
    },

    #[error("Storage unavailable: {details}")]
    Unavailable { details: String },

    #[error("Storage IO error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid storage key '{key}'")]
    InvalidKey { key: String },
}

/// Failures around the camera device and capture session
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera access is not supported on this device")]
    Unsupported,

    #[error("Camera permission denied: {details}")]
    PermissionDenied { details: String },

    #[error("Camera device error: {details}")]
    Device { details: String },

    #[error("A capture session is already active ({status})")]
    SessionActive { status: String },

    #[error("Capture session was closed before the camera became available")]
    Cancelled,

    #[error("Failed to read preview frame: {details}")]
    Frame { details: String },

    #[error("Failed to encode captured frame: {details}")]
    Encoding { details: String },
}

/// Failures loading a profile photo
#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("Failed to read photo file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File {path} is not a supported image")]
    UnsupportedFormat { path: String },

    #[error("Photo file {path} is empty")]
    Empty { path: String },
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum DialError {
    #[error("Cannot dial empty phone number")]
    EmptyNumber,

    #[error("Dialer unavailable: {details}")]
    Unavailable { details: String },
}

pub type Result<T> = std::result::Result<T, LifelineError>;
