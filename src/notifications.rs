use crate::config::NotificationConfig;
use crate::events::{EventBus, ProfileEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Notification severity, which drives styling only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Parse a severity name; anything unrecognised degrades to `Info`
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "warning" => Severity::Warning,
            "error" => Severity::Error,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    /// Background colour used when rendering the notification
    pub fn color(&self) -> &'static str {
        match self {
            Severity::Success => "#10b981",
            Severity::Error => "#ef4444",
            Severity::Warning => "#f59e0b",
            Severity::Info => "#3b82f6",
        }
    }
}

/// Visual phase of an active notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPhase {
    /// Fully shown
    Visible,
    /// Playing its exit transition; still in the active set
    Leaving,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub severity: Severity,
    pub created_at: Instant,
}

/// Reference to an enqueued notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle {
    id: Uuid,
}

impl NotificationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Snapshot of a notification in the active set
#[derive(Debug, Clone)]
pub struct ActiveNotification {
    pub notification: Notification,
    pub phase: NotificationPhase,
    /// Position in the visual stack, 0 being the first shown
    pub slot: usize,
}

struct Entry {
    notification: Notification,
    phase: NotificationPhase,
    leave_at: Instant,
    remove_at: Instant,
}

/// Transient, self-expiring user messages
#[derive(Clone)]
pub struct NotificationQueue {
    entries: Arc<Mutex<Vec<Entry>>>,
    display: Duration,
    transition: Duration,
    events: EventBus,
}

impl NotificationQueue {
    pub fn new(config: &NotificationConfig, events: EventBus) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            display: Duration::from_millis(config.display_ms),
            transition: Duration::from_millis(config.transition_ms),
            events,
        }
    }

    /// Show a message now and schedule its removal. Never blocks, never fails.
    pub fn enqueue<S: Into<String>>(&self, message: S, severity: Severity) -> NotificationHandle {
        let now = Instant::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            message: message.into(),
            severity,
            created_at: now,
        };
        let handle = NotificationHandle {
            id: notification.id,
        };
        let leave_at = now + self.display;
        let remove_at = leave_at + self.transition;

        self.events.publish(ProfileEvent::NotificationShown {
            id: notification.id,
            message: notification.message.clone(),
            severity,
        });

        self.entries.lock().push(Entry {
            notification,
            phase: NotificationPhase::Visible,
            leave_at,
            remove_at,
        });

        self.schedule(leave_at, remove_at);
        handle
    }

    /// Enqueue with a severity given by name
    pub fn enqueue_named<S: Into<String>>(&self, message: S, severity: &str) -> NotificationHandle {
        self.enqueue(message, Severity::parse_lossy(severity))
    }

    /// Start the exit transition of a notification early
    pub fn dismiss(&self, handle: NotificationHandle) {
        let now = Instant::now();
        let remove_at = now + self.transition;
        {
            let mut entries = self.entries.lock();
            match entries.iter_mut().find(|e| e.notification.id == handle.id) {
                Some(entry) if entry.leave_at > now => {
                    entry.leave_at = now;
                    entry.remove_at = remove_at.min(entry.remove_at);
                }
                _ => return,
            }
        }
        self.tick();
        self.schedule(now, remove_at);
    }

    /// Active notifications in enqueue order
    pub fn active(&self) -> Vec<ActiveNotification> {
        self.tick();
        self.entries
            .lock()
            .iter()
            .enumerate()
            .map(|(slot, entry)| ActiveNotification {
                notification: entry.notification.clone(),
                phase: entry.phase,
                slot,
            })
            .collect()
    }

    pub fn is_active(&self, handle: NotificationHandle) -> bool {
        self.active()
            .iter()
            .any(|a| a.notification.id == handle.id)
    }

    pub fn len(&self) -> usize {
        self.active().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every entry to the phase its deadlines call for
    fn tick(&self) {
        let now = Instant::now();
        let mut leaving = Vec::new();
        let mut removed = Vec::new();
        {
            let mut entries = self.entries.lock();
            for entry in entries.iter_mut() {
                if entry.phase == NotificationPhase::Visible && entry.leave_at <= now {
                    entry.phase = NotificationPhase::Leaving;
                    leaving.push(entry.notification.id);
                }
            }
            entries.retain(|entry| {
                let keep = entry.remove_at > now;
                if !keep {
                    removed.push(entry.notification.id);
                }
                keep
            });
        }

        // Publish outside the lock
        for id in leaving {
            self.events.publish(ProfileEvent::NotificationLeaving { id });
        }
        for id in removed {
            trace!("Notification {} removed", id);
            self.events.publish(ProfileEvent::NotificationRemoved { id });
        }
    }

    fn schedule(&self, leave_at: Instant, remove_at: Instant) {
        match Handle::try_current() {
            Ok(runtime) => {
                let queue = self.clone();
                runtime.spawn(async move {
                    sleep_until(leave_at).await;
                    queue.tick();
                    sleep_until(remove_at).await;
                    queue.tick();
                });
            }
            Err(_) => {
                debug!("No async runtime; notification expiry is applied on read");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFilter;
    use tokio::time::advance;

    fn queue() -> (NotificationQueue, EventBus) {
        let bus = EventBus::new(64);
        let config = NotificationConfig {
            display_ms: 3000,
            transition_ms: 300,
        };
        (NotificationQueue::new(&config, bus.clone()), bus)
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_lifetime() {
        let (queue, _bus) = queue();
        let handle = queue.enqueue("Photo updated successfully!", Severity::Success);

        assert!(queue.is_active(handle));
        assert_eq!(queue.active()[0].phase, NotificationPhase::Visible);

        advance(Duration::from_millis(2999)).await;
        assert!(queue.is_active(handle));
        assert_eq!(queue.active()[0].phase, NotificationPhase::Visible);

        advance(Duration::from_millis(1)).await;
        let active = queue.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].phase, NotificationPhase::Leaving);

        advance(Duration::from_millis(300)).await;
        assert!(!queue.is_active(handle));
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_stack_independently() {
        let (queue, _bus) = queue();
        let first = queue.enqueue("first", Severity::Info);

        advance(Duration::from_millis(1000)).await;
        let second = queue.enqueue("second", Severity::Error);

        let active = queue.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].notification.message, "first");
        assert_eq!(active[0].slot, 0);
        assert_eq!(active[1].notification.message, "second");
        assert_eq!(active[1].slot, 1);

        advance(Duration::from_millis(2300)).await;
        assert!(!queue.is_active(first));
        assert!(queue.is_active(second));
        assert_eq!(queue.active()[0].slot, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_publishes_lifecycle_events() {
        let (queue, bus) = queue();
        let mut receiver = bus.subscribe_filtered(EventFilter::All, "test");

        let handle = queue.enqueue("Timestamp updated successfully!", Severity::Success);

        // Let the scheduled timer task observe both deadlines
        advance(Duration::from_millis(3000)).await;
        tokio::task::yield_now().await;
        advance(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;

        let types: Vec<_> = receiver
            .drain()
            .unwrap()
            .iter()
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec!["notification_shown", "notification_leaving", "notification_removed"]
        );
        assert!(!queue.is_active(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_starts_transition() {
        let (queue, _bus) = queue();
        let handle = queue.enqueue("dismiss me", Severity::Warning);

        queue.dismiss(handle);
        assert_eq!(queue.active()[0].phase, NotificationPhase::Leaving);

        advance(Duration::from_millis(300)).await;
        assert!(!queue.is_active(handle));
    }

    #[test]
    fn test_unknown_severity_degrades_to_info() {
        assert_eq!(Severity::parse_lossy("success"), Severity::Success);
        assert_eq!(Severity::parse_lossy("ERROR"), Severity::Error);
        assert_eq!(Severity::parse_lossy("critical"), Severity::Info);
        assert_eq!(Severity::parse_lossy(""), Severity::Info);
        assert_eq!(Severity::parse_lossy("critical").color(), "#3b82f6");
    }

    #[test]
    fn test_enqueue_without_runtime() {
        let (queue, _bus) = queue();
        let handle = queue.enqueue_named("no runtime", "bogus");

        let active = queue.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].notification.severity, Severity::Info);
        assert!(queue.is_active(handle));
    }
}
