use crate::events::{EventBus, ProfileEvent};
use crate::notifications::{NotificationQueue, Severity};
use crate::storage::{KeyValueStore, LAST_UPDATED_KEY};
use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DISPLAY_FORMAT: &str = "%B %-d, %Y at %I:%M %p";

/// Render a stamp the way the page shows it, e.g. `October 19, 2026 at 02:30 PM`
pub fn format_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(DISPLAY_FORMAT).to_string()
}

/// The persisted "last updated" stamp
pub struct LastUpdated {
    store: Arc<dyn KeyValueStore>,
    current: Mutex<String>,
}

impl LastUpdated {
    /// Read the stored stamp, stamping now when nothing has been stored yet
    pub fn load_or_init(store: Arc<dyn KeyValueStore>) -> Self {
        let stored = match store.get(LAST_UPDATED_KEY) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!("Last updated stamp unavailable: {}", e);
                None
            }
        };

        let stamp = match stored {
            Some(stamp) => {
                debug!("Loaded last updated stamp: {}", stamp);
                stamp
            }
            None => {
                let stamp = format_stamp(&Local::now());
                persist(store.as_ref(), &stamp);
                info!("Initialized last updated stamp: {}", stamp);
                stamp
            }
        };

        Self {
            store,
            current: Mutex::new(stamp),
        }
    }

    pub fn display(&self) -> String {
        self.current.lock().clone()
    }

    /// Stamp now, persist, announce, and confirm to the user
    pub fn touch(&self, events: &EventBus, notifications: &NotificationQueue) -> String {
        self.touch_at(&Local::now(), events, notifications)
    }

    fn touch_at<Tz: TimeZone>(
        &self,
        at: &DateTime<Tz>,
        events: &EventBus,
        notifications: &NotificationQueue,
    ) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let stamp = format_stamp(at);
        persist(self.store.as_ref(), &stamp);
        *self.current.lock() = stamp.clone();

        info!("Last updated stamp refreshed: {}", stamp);
        events.publish(ProfileEvent::TimestampUpdated {
            display: stamp.clone(),
        });
        notifications.enqueue("Timestamp updated successfully!", Severity::Success);
        stamp
    }
}

fn persist(store: &dyn KeyValueStore, stamp: &str) {
    if let Err(e) = store.set(LAST_UPDATED_KEY, stamp) {
        warn!("Last updated stamp not durably saved: {}", e);
    }
}
