use crate::error::DialError;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Haptic pulse played as a call is handed off
pub const CALL_VIBRATION: Duration = Duration::from_millis(200);

/// Outward hand-off for placing a call
pub trait Dialer: Send + Sync {
    fn dial(&self, number: &str) -> Result<(), DialError>;

    /// Pulse the vibration motor, where the host has one
    fn vibrate(&self, _duration: Duration) {}
}

/// Build the `tel:` URI for a number, keeping only dialable characters
pub fn tel_uri(number: &str) -> Result<String, DialError> {
    let dialable: String = number
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    if dialable.is_empty() {
        return Err(DialError::EmptyNumber);
    }
    Ok(format!("tel:{}", dialable))
}

/// Dialer that only records the hand-off in the log
#[derive(Debug, Default)]
pub struct LoggingDialer;

impl Dialer for LoggingDialer {
    fn dial(&self, number: &str) -> Result<(), DialError> {
        let uri = tel_uri(number)?;
        info!("Handing off call to {}", uri);
        Ok(())
    }

    fn vibrate(&self, duration: Duration) {
        debug!("Vibrate for {}ms", duration.as_millis());
    }
}

/// Dialer that remembers every URI it was asked to open
#[derive(Debug, Default)]
pub struct RecordingDialer {
    dialed: Mutex<Vec<String>>,
    vibrations: Mutex<Vec<Duration>>,
    unavailable: Mutex<Option<String>>,
}

impl RecordingDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialed(&self) -> Vec<String> {
        self.dialed.lock().clone()
    }

    pub fn vibrations(&self) -> Vec<Duration> {
        self.vibrations.lock().clone()
    }

    /// Make subsequent dials fail with the given reason, or succeed again with `None`
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock() = reason.map(str::to_string);
    }
}

impl Dialer for RecordingDialer {
    fn dial(&self, number: &str) -> Result<(), DialError> {
        if let Some(details) = self.unavailable.lock().clone() {
            return Err(DialError::Unavailable { details });
        }
        let uri = tel_uri(number)?;
        self.dialed.lock().push(uri);
        Ok(())
    }

    fn vibrate(&self, duration: Duration) {
        self.vibrations.lock().push(duration);
    }
}

/// Format a phone number for display.
///
/// Ten digits become `(555) 123-4567`, eleven digits with a leading 1 become
/// `+1 (555) 345-6789`. Anything else comes back unchanged.
pub fn format_phone_number(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        ),
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_phone_number() {
        assert_eq!(format_phone_number("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone_number("555-123-4567"), "(555) 123-4567");
        assert_eq!(format_phone_number("+15553456789"), "+1 (555) 345-6789");
        assert_eq!(format_phone_number("911"), "911");
        assert_eq!(format_phone_number("25553456789"), "25553456789");
        assert_eq!(format_phone_number(""), "");
    }

    #[test]
    fn test_tel_uri() {
        assert_eq!(tel_uri("+1 (555) 345-6789").unwrap(), "tel:+15553456789");
        assert_eq!(tel_uri("911").unwrap(), "tel:911");
        assert!(matches!(tel_uri(" - "), Err(DialError::EmptyNumber)));
    }

    #[test]
    fn test_recording_dialer() {
        let dialer = RecordingDialer::new();
        dialer.dial("911").unwrap();

        dialer.set_unavailable(Some("no telephony"));
        assert!(matches!(
            dialer.dial("911"),
            Err(DialError::Unavailable { .. })
        ));

        dialer.set_unavailable(None);
        dialer.dial("5551234567").unwrap();
        assert_eq!(dialer.dialed(), vec!["tel:911", "tel:5551234567"]);
        assert!(dialer.vibrations().is_empty());

        dialer.vibrate(CALL_VIBRATION);
        assert_eq!(dialer.vibrations(), vec![Duration::from_millis(200)]);
    }

    #[test]
    fn test_logging_dialer_rejects_empty() {
        assert!(LoggingDialer.dial("").is_err());
        assert!(LoggingDialer.dial("911").is_ok());
    }
}
