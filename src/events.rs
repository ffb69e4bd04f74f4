use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::call_log::CallKind;
use crate::camera::SessionStatus;
use crate::notifications::Severity;
use crate::photo::PhotoSource;

/// Events emitted by the profile core for rendering collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProfileEvent {
    /// A capture session moved to a new state
    CaptureStateChanged {
        session_id: Uuid,
        status: SessionStatus,
        timestamp: SystemTime,
    },
    /// The live feed was attached to the preview surface
    PreviewAttached {
        session_id: Uuid,
        width: u32,
        height: u32,
    },
    /// The capture modal surface was torn down
    CaptureModalClosed { session_id: Uuid },
    /// The profile photo changed
    PhotoChanged { source: PhotoSource },
    /// A call was recorded in the call log
    CallLogged {
        phone_number: String,
        kind: CallKind,
    },
    /// A notification was inserted into the active set
    NotificationShown {
        id: Uuid,
        message: String,
        severity: Severity,
    },
    /// A notification started its exit transition
    NotificationLeaving { id: Uuid },
    /// A notification was removed from the active set
    NotificationRemoved { id: Uuid },
    /// The "last updated" stamp was refreshed
    TimestampUpdated { display: String },
}

impl ProfileEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ProfileEvent::CaptureStateChanged {
                session_id, status, ..
            } => format!("Capture session {} is now {:?}", session_id, status),
            ProfileEvent::PreviewAttached {
                width, height, ..
            } => format!("Camera preview attached ({}x{})", width, height),
            ProfileEvent::CaptureModalClosed { session_id } => {
                format!("Capture modal closed for session {}", session_id)
            }
            ProfileEvent::PhotoChanged { source } => format!("Profile photo set from {:?}", source),
            ProfileEvent::CallLogged { phone_number, kind } => {
                format!("Logged {:?} call to {}", kind, phone_number)
            }
            ProfileEvent::NotificationShown {
                message, severity, ..
            } => format!("[{}] {}", severity.as_str(), message),
            ProfileEvent::NotificationLeaving { id } => format!("Notification {} leaving", id),
            ProfileEvent::NotificationRemoved { id } => format!("Notification {} removed", id),
            ProfileEvent::TimestampUpdated { display } => format!("Last updated: {}", display),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ProfileEvent::CaptureStateChanged { .. } => "capture_state_changed",
            ProfileEvent::PreviewAttached { .. } => "preview_attached",
            ProfileEvent::CaptureModalClosed { .. } => "capture_modal_closed",
            ProfileEvent::PhotoChanged { .. } => "photo_changed",
            ProfileEvent::CallLogged { .. } => "call_logged",
            ProfileEvent::NotificationShown { .. } => "notification_shown",
            ProfileEvent::NotificationLeaving { .. } => "notification_leaving",
            ProfileEvent::NotificationRemoved { .. } => "notification_removed",
            ProfileEvent::TimestampUpdated { .. } => "timestamp_updated",
        }
    }
}

/// Broadcast event bus shared by the profile components
pub struct EventBus {
    sender: broadcast::Sender<ProfileEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ProfileEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receipt
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing never fails the caller: having no subscribers is normal
    /// when nothing is rendering.
    pub fn publish(&self, event: ProfileEvent) -> usize {
        match &event {
            ProfileEvent::CaptureStateChanged { status, .. } => {
                info!("Capture state changed: {:?}", status);
            }
            ProfileEvent::CallLogged { phone_number, kind } => {
                info!("Call logged: {:?} {}", kind, phone_number);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ProfileEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ProfileEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ProfileEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Drain every event already queued for this receiver
    pub fn drain(&mut self) -> Result<Vec<ProfileEvent>, EventBusError> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        events.push(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(events),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(ProfileEvent::PhotoChanged {
            source: PhotoSource::Captured,
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            ProfileEvent::PhotoChanged { source } => assert_eq!(source, PhotoSource::Captured),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(10);
        assert_eq!(event_bus.subscriber_count(), 0);

        let delivered = event_bus.publish(ProfileEvent::TimestampUpdated {
            display: "now".to_string(),
        });
        assert_eq!(delivered, 0);
    }

    #[test]
    fn test_filtered_receiver_drain() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["call_logged"]),
            "test",
        );

        event_bus.publish(ProfileEvent::PhotoChanged {
            source: PhotoSource::Default,
        });
        event_bus.publish(ProfileEvent::CallLogged {
            phone_number: "911".to_string(),
            kind: CallKind::Emergency,
        });

        let events = receiver.drain().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "call_logged");
    }
}
