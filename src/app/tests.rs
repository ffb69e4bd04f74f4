use super::keyboard_input::KeyAction;
use super::*;
use crate::call_log::CallKind;
use crate::camera::{SessionStatus, SyntheticDevices, UnavailableDevices};
use crate::config::LifelineConfig;
use crate::dialer::{RecordingDialer, CALL_VIBRATION};
use crate::error::LifelineError;
use crate::notifications::Severity;
use crate::photo::PhotoSource;
use crate::storage::{KeyValueStore, MemoryStore, CALL_LOG_KEY, PROFILE_PHOTO_KEY};
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    profile: EmergencyProfile,
    store: Arc<MemoryStore>,
    dialer: Arc<RecordingDialer>,
    devices: Arc<SyntheticDevices>,
}

fn create_test_config() -> LifelineConfig {
    let mut config = LifelineConfig::default();
    config.camera.resolution = (32, 24);
    config.photo.default_url = "https://example.invalid/default.jpg".to_string();
    config
}

fn create_profile() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dialer = Arc::new(RecordingDialer::new());
    let devices = Arc::new(SyntheticDevices::new());
    let profile = EmergencyProfile::new(
        &create_test_config(),
        store.clone(),
        devices.clone(),
        dialer.clone(),
    );
    Harness {
        profile,
        store,
        dialer,
        devices,
    }
}

fn messages(profile: &EmergencyProfile) -> Vec<(String, Severity)> {
    profile
        .notifications()
        .active()
        .into_iter()
        .map(|active| (active.notification.message, active.notification.severity))
        .collect()
}

#[tokio::test]
async fn test_direct_call_is_logged() {
    let h = create_profile();

    h.profile
        .dispatch(Command::Call {
            number: "5551234567".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(h.dialer.dialed(), vec!["tel:5551234567"]);
    assert_eq!(h.dialer.vibrations(), vec![CALL_VIBRATION]);
    let entries = h.profile.call_log().all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, CallKind::Attempt);
    assert!(h.store.get(CALL_LOG_KEY).unwrap().is_some());
}

#[tokio::test]
async fn test_emergency_call_requires_confirmation() {
    let h = create_profile();

    h.profile
        .dispatch(Command::EmergencyCall {
            number: "+15553456789".to_string(),
            contact_name: "David Johnson".to_string(),
        })
        .await
        .unwrap();

    let pending = h.profile.pending_call().unwrap();
    assert_eq!(pending.display_number, "+1 (555) 345-6789");
    assert!(h.dialer.dialed().is_empty());
    assert!(h.profile.call_log().is_empty());

    h.profile.dispatch(Command::ConfirmCall).await.unwrap();

    assert!(h.profile.pending_call().is_none());
    assert_eq!(h.dialer.dialed(), vec!["tel:+15553456789"]);
    let entries = h.profile.call_log().all();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, CallKind::Attempt);
    assert_eq!(entries[1].kind, CallKind::Emergency);
    assert_eq!(entries[1].contact_name.as_deref(), Some("David Johnson"));

    // Nothing staged any more
    h.profile.dispatch(Command::ConfirmCall).await.unwrap();
    assert_eq!(h.profile.call_log().len(), 2);
}

#[tokio::test]
async fn test_cancelled_call_is_not_logged() {
    let h = create_profile();

    h.profile
        .dispatch(Command::EmergencyCall {
            number: "911".to_string(),
            contact_name: "Emergency Services".to_string(),
        })
        .await
        .unwrap();
    h.profile.dispatch(Command::Escape).await.unwrap();

    assert!(h.profile.pending_call().is_none());
    h.profile.dispatch(Command::ConfirmCall).await.unwrap();
    assert!(h.profile.call_log().is_empty());
    assert!(h.dialer.dialed().is_empty());
    assert!(h.dialer.vibrations().is_empty());
}

#[tokio::test]
async fn test_failed_dial_still_logs_and_notifies() {
    let h = create_profile();
    h.dialer.set_unavailable(Some("no telephony"));

    let result = h
        .profile
        .dispatch(Command::Call {
            number: "911".to_string(),
        })
        .await;

    assert!(matches!(result, Err(LifelineError::Dial(_))));
    assert_eq!(h.profile.call_log().len(), 1);
    assert_eq!(
        messages(&h.profile),
        vec![("Unable to call 911".to_string(), Severity::Error)]
    );
}

#[tokio::test]
async fn test_camera_capture_flow() {
    let h = create_profile();
    let stats = h.devices.stats();

    h.profile.dispatch(Command::OpenCamera).await.unwrap();
    assert_eq!(h.profile.capture_state(), SessionStatus::Live);

    h.profile.dispatch(Command::CapturePhoto).await.unwrap();

    assert_eq!(h.profile.capture_state(), SessionStatus::Closed);
    assert_eq!(h.profile.photo().source, PhotoSource::Captured);
    assert!(h.store.get(PROFILE_PHOTO_KEY).unwrap().is_some());
    assert_eq!(stats.track_stops(), 1);
    assert_eq!(
        messages(&h.profile),
        vec![("Photo captured successfully!".to_string(), Severity::Success)]
    );

    // Capture with no live session is a no-op
    h.profile.dispatch(Command::CapturePhoto).await.unwrap();
    assert_eq!(h.profile.notifications().len(), 1);
}

#[tokio::test]
async fn test_escape_and_navigate_release_camera() {
    let h = create_profile();
    let stats = h.devices.stats();

    h.profile.dispatch(Command::OpenCamera).await.unwrap();
    h.profile.dispatch(Command::Escape).await.unwrap();
    assert_eq!(h.profile.capture_state(), SessionStatus::Closed);

    h.profile.dispatch(Command::OpenCamera).await.unwrap();
    h.profile.dispatch(Command::Navigate).await.unwrap();
    h.profile.dispatch(Command::CancelCapture).await.unwrap();

    assert_eq!(h.profile.capture_state(), SessionStatus::Closed);
    assert_eq!(stats.streams_granted(), 2);
    assert_eq!(stats.track_stops(), 2);
}

#[tokio::test]
async fn test_camera_unavailable_points_at_upload() {
    let profile = EmergencyProfile::new(
        &create_test_config(),
        Arc::new(MemoryStore::new()),
        Arc::new(UnavailableDevices),
        Arc::new(RecordingDialer::new()),
    );

    let result = profile.dispatch(Command::OpenCamera).await;

    assert!(matches!(result, Err(LifelineError::Capture(_))));
    assert_eq!(profile.capture_state(), SessionStatus::Failed);
    assert_eq!(profile.notifications().len(), 1);
    assert!(profile.photo().source == PhotoSource::Default);
}

#[tokio::test]
async fn test_upload_and_reset_photo() {
    let h = create_profile();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("me.png");
    image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4))
        .save_with_format(&path, image::ImageFormat::Png)
        .unwrap();

    h.profile
        .dispatch(Command::UploadPhoto { path: path.clone() })
        .await
        .unwrap();
    assert_eq!(h.profile.photo().source, PhotoSource::Uploaded);

    h.profile.dispatch(Command::ResetPhoto).await.unwrap();
    assert_eq!(h.profile.photo().source, PhotoSource::Default);
    assert!(h.store.get(PROFILE_PHOTO_KEY).unwrap().is_none());

    assert_eq!(
        messages(&h.profile),
        vec![
            ("Photo updated successfully!".to_string(), Severity::Success),
            ("Photo reset to default".to_string(), Severity::Info),
        ]
    );
}

#[tokio::test]
async fn test_rejected_upload_keeps_photo() {
    let h = create_profile();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not an image").unwrap();

    let result = h.profile.dispatch(Command::UploadPhoto { path }).await;

    assert!(matches!(result, Err(LifelineError::Photo(_))));
    assert_eq!(h.profile.photo().source, PhotoSource::Default);
    assert_eq!(messages(&h.profile)[0].1, Severity::Error);
}

#[tokio::test]
async fn test_update_timestamp() {
    let h = create_profile();
    let before = h.profile.last_updated();
    assert!(!before.is_empty());

    h.profile.dispatch(Command::UpdateTimestamp).await.unwrap();

    assert_eq!(
        messages(&h.profile),
        vec![(
            "Timestamp updated successfully!".to_string(),
            Severity::Success
        )]
    );
}

#[tokio::test]
async fn test_state_survives_restart() {
    let h = create_profile();
    h.profile
        .dispatch(Command::Call {
            number: "911".to_string(),
        })
        .await
        .unwrap();
    h.profile.dispatch(Command::OpenCamera).await.unwrap();
    h.profile.dispatch(Command::CapturePhoto).await.unwrap();
    let stamp = h.profile.last_updated();
    drop(h.profile);

    let reloaded = EmergencyProfile::new(
        &create_test_config(),
        h.store.clone(),
        Arc::new(UnavailableDevices),
        Arc::new(RecordingDialer::new()),
    );

    assert_eq!(reloaded.call_log().len(), 1);
    assert_eq!(reloaded.photo().source, PhotoSource::Captured);
    assert_eq!(reloaded.last_updated(), stamp);
    assert_eq!(reloaded.capture_state(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_escape_closes_camera_while_acquiring() {
    let h = create_profile();
    h.devices.set_latency(Duration::from_millis(500));
    let stats = h.devices.stats();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(KeyAction::Dispatch(Command::OpenCamera)).unwrap();
    tx.send(KeyAction::Dispatch(Command::Escape)).unwrap();

    let handled = Cell::new(0);
    let quit_later = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.profile.capture_state(), SessionStatus::Closed);
        tx.send(KeyAction::Quit).unwrap();
    };
    let (result, ()) = tokio::join!(
        h.profile
            .run_key_actions(rx, |_| handled.set(handled.get() + 1)),
        quit_later
    );

    result.unwrap();
    assert_eq!(h.profile.capture_state(), SessionStatus::Closed);
    // The late stream is granted and released straight away
    assert_eq!(stats.streams_granted(), 1);
    assert_eq!(stats.track_stops(), 1);
    // Open key, Esc, then the cancelled open finishing
    assert_eq!(handled.get(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_quit_while_acquiring_releases_camera() {
    let h = create_profile();
    h.devices.set_latency(Duration::from_millis(500));
    let stats = h.devices.stats();
    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(KeyAction::Dispatch(Command::OpenCamera)).unwrap();
    tx.send(KeyAction::Quit).unwrap();

    h.profile.run_key_actions(rx, |_| {}).await.unwrap();

    assert_eq!(h.profile.capture_state(), SessionStatus::Closed);
    assert_eq!(stats.streams_granted(), 0);
}

#[test]
fn test_command_names() {
    assert_eq!(Command::ConfirmCall.name(), "confirm_call");
    assert_eq!(
        Command::UploadPhoto {
            path: "me.jpg".into()
        }
        .name(),
        "upload_photo"
    );
}
