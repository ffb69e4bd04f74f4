use std::path::PathBuf;

/// User intents accepted by [`super::EmergencyProfile::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dial a number directly
    Call { number: String },
    /// Ask for confirmation before calling a contact
    EmergencyCall { number: String, contact_name: String },
    ConfirmCall,
    CancelCall,
    UpdateTimestamp,
    UploadPhoto { path: PathBuf },
    OpenCamera,
    CapturePhoto,
    CancelCapture,
    ResetPhoto,
    /// Dismiss whatever modal is open
    Escape,
    /// The page is going away
    Navigate,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Call { .. } => "call",
            Command::EmergencyCall { .. } => "emergency_call",
            Command::ConfirmCall => "confirm_call",
            Command::CancelCall => "cancel_call",
            Command::UpdateTimestamp => "update_timestamp",
            Command::UploadPhoto { .. } => "upload_photo",
            Command::OpenCamera => "open_camera",
            Command::CapturePhoto => "capture_photo",
            Command::CancelCapture => "cancel_capture",
            Command::ResetPhoto => "reset_photo",
            Command::Escape => "escape",
            Command::Navigate => "navigate",
        }
    }
}

/// A call staged for confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCall {
    pub number: String,
    pub contact_name: String,
    /// Number as shown in the confirmation prompt
    pub display_number: String,
}
