use super::command::Command;
use super::keyboard_input::KeyAction;
use super::profile::EmergencyProfile;
use crate::error::Result;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{debug, info};

type PendingOpen<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a>>;

impl EmergencyProfile {
    /// Apply key actions until `Quit` or the channel closes, then release the camera.
    ///
    /// Opening the camera runs alongside key handling, so Esc still closes a
    /// session that is waiting on the device. `after_action` runs after every
    /// handled key and after an open finishes.
    pub async fn run_key_actions<F>(
        &self,
        mut actions: mpsc::UnboundedReceiver<KeyAction>,
        mut after_action: F,
    ) -> Result<()>
    where
        F: FnMut(&Self),
    {
        let mut opening: Option<PendingOpen<'_>> = None;

        loop {
            tokio::select! {
                biased;

                result = finish_open(&mut opening) => {
                    opening = None;
                    if let Err(e) = result {
                        debug!("Camera open ended: {}", e);
                    }
                    after_action(self);
                }

                action = actions.recv() => {
                    let command = match action {
                        Some(KeyAction::Dispatch(command)) => command,
                        Some(KeyAction::Quit) | None => break,
                    };

                    if matches!(command, Command::OpenCamera) {
                        if opening.is_some() {
                            debug!("Camera already opening");
                        } else {
                            opening = Some(Box::pin(self.dispatch(command)));
                        }
                    } else if let Err(e) = self.dispatch(command).await {
                        debug!("Command failed: {}", e);
                    }
                    after_action(self);
                }
            }
        }

        // An open still in flight closes its session when dropped
        drop(opening);
        self.dispatch(Command::Navigate).await?;
        info!("Interactive session ended");
        Ok(())
    }
}

async fn finish_open(opening: &mut Option<PendingOpen<'_>>) -> Result<()> {
    match opening.as_mut() {
        Some(open) => open.await,
        None => std::future::pending().await,
    }
}
