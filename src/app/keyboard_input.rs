use super::command::Command;
use crate::config::SpeedDialConfig;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the interactive loop to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Dispatch(Command),
    Quit,
}

/// Translate a key press into an action.
///
/// Ctrl+1 and Ctrl+2 stage the configured speed-dial contacts; plain keys
/// drive the photo and call modals.
pub fn map_key(key: &KeyEvent, speed_dial: &SpeedDialConfig) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    let ctrl = key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER);

    let command = match key.code {
        KeyCode::Char('1') if ctrl => Command::EmergencyCall {
            number: speed_dial.primary_number.clone(),
            contact_name: speed_dial.primary_name.clone(),
        },
        KeyCode::Char('2') if ctrl => Command::EmergencyCall {
            number: speed_dial.secondary_number.clone(),
            contact_name: speed_dial.secondary_name.clone(),
        },
        KeyCode::Char('c') if ctrl => return Some(KeyAction::Quit),
        KeyCode::Esc => Command::Escape,
        KeyCode::Char('o') => Command::OpenCamera,
        KeyCode::Char('c') => Command::CapturePhoto,
        KeyCode::Char('r') => Command::ResetPhoto,
        KeyCode::Char('t') => Command::UpdateTimestamp,
        KeyCode::Char('y') => Command::ConfirmCall,
        KeyCode::Char('n') => Command::CancelCall,
        KeyCode::Char('q') => return Some(KeyAction::Quit),
        _ => return None,
    };
    Some(KeyAction::Dispatch(command))
}

/// Reads terminal key presses on a blocking thread and forwards mapped actions
pub struct KeyboardInputHandler {
    speed_dial: SpeedDialConfig,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(speed_dial: SpeedDialConfig) -> Self {
        Self {
            speed_dial,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening; actions arrive on the returned channel until `stop`
    /// is called or the user quits
    pub async fn start(&self) -> Result<mpsc::UnboundedReceiver<KeyAction>> {
        info!("Starting keyboard input handler - press q to quit");

        let (sender, receiver) = mpsc::unbounded_channel();
        let speed_dial = self.speed_dial.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                let _ = sender.send(KeyAction::Quit);
                return;
            }
            debug!("Raw mode enabled - keyboard handler active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        let Some(action) = map_key(&key_event, &speed_dial) else {
                            debug!("Unmapped key: {:?}", key_event.code);
                            continue;
                        };

                        let quit = action == KeyAction::Quit;
                        if sender.send(action).is_err() || quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(receiver)
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll interval to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifelineConfig;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_speed_dial_keys() {
        let speed_dial = LifelineConfig::default().speed_dial;

        assert_eq!(
            map_key(&press(KeyCode::Char('1'), KeyModifiers::CONTROL), &speed_dial),
            Some(KeyAction::Dispatch(Command::EmergencyCall {
                number: "911".to_string(),
                contact_name: "Emergency Services".to_string(),
            }))
        );
        assert_eq!(
            map_key(&press(KeyCode::Char('2'), KeyModifiers::CONTROL), &speed_dial),
            Some(KeyAction::Dispatch(Command::EmergencyCall {
                number: "+15553456789".to_string(),
                contact_name: "David Johnson".to_string(),
            }))
        );

        // Without the modifier the digits do nothing
        assert_eq!(
            map_key(&press(KeyCode::Char('1'), KeyModifiers::NONE), &speed_dial),
            None
        );
    }

    #[test]
    fn test_modal_keys() {
        let speed_dial = LifelineConfig::default().speed_dial;
        let map = |code| map_key(&press(code, KeyModifiers::NONE), &speed_dial);

        assert_eq!(map(KeyCode::Esc), Some(KeyAction::Dispatch(Command::Escape)));
        assert_eq!(
            map(KeyCode::Char('c')),
            Some(KeyAction::Dispatch(Command::CapturePhoto))
        );
        assert_eq!(
            map(KeyCode::Char('y')),
            Some(KeyAction::Dispatch(Command::ConfirmCall))
        );
        assert_eq!(map(KeyCode::Char('q')), Some(KeyAction::Quit));
        assert_eq!(map(KeyCode::Char('z')), None);
        assert_eq!(
            map_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL), &speed_dial),
            Some(KeyAction::Quit)
        );
    }

    #[test]
    fn test_release_events_are_ignored() {
        let speed_dial = LifelineConfig::default().speed_dial;
        let mut release = press(KeyCode::Esc, KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;

        assert_eq!(map_key(&release, &speed_dial), None);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(LifelineConfig::default().speed_dial);
        assert!(!handler.cancellation_token.is_cancelled());

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
