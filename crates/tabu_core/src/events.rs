use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::channel::{NotificationChannel, ScheduledNotification};
use crate::clock::Clock;
use crate::ident::{self, Purpose};
use crate::preferences::{EventKind, Facility, NotificationPreferences};

/// One-shot facility announcement. Either fires at `start_time` or is
/// cancelled beforehand; it never re-fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TabuEvent {
    pub id: String,
    pub facility: Facility,
    pub service_name: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub kind: EventKind,
}

/// Schedules facility announcements, gated by the resident's per-facility
/// toggles.
pub struct FacilityEventManager {
    channel: Arc<NotificationChannel>,
    clock: Arc<dyn Clock>,
    preferences: Arc<RwLock<NotificationPreferences>>,
}

impl FacilityEventManager {
    pub fn new(
        channel: Arc<NotificationChannel>,
        clock: Arc<dyn Clock>,
        preferences: Arc<RwLock<NotificationPreferences>>,
    ) -> Self {
        Self {
            channel,
            clock,
            preferences,
        }
    }

    /// Schedule the announcement unless the resident opted out of this
    /// facility/kind pair. The opt-out path is a policy gate, not an error:
    /// it answers `false` without touching the channel.
    pub fn schedule_event(&self, event: &TabuEvent) -> bool {
        if !self.preferences.read().enabled(event.facility, event.kind) {
            debug!(event = %event.id, facility = %event.facility, "notification disabled, skipping");
            return false;
        }
        let notification = ScheduledNotification {
            id: ident::allocate(Purpose::FacilityEvent, &event.id),
            title: self.render_title(event),
            body: self.render_body(event),
            fire_at: event.start_time,
            extra: json!({
                "kind": "facility_event",
                "event_id": event.id,
                "facility": event.facility.as_str(),
            }),
        };
        self.channel.schedule_at(&notification, self.clock.now());
        true
    }

    /// Recompute the id this event's schedule used and cancel it.
    pub fn cancel_event(&self, event_id: &str) {
        self.channel.cancel(ident::allocate(Purpose::FacilityEvent, event_id));
    }

    /// Synthesize an announcement firing two seconds out and push it through
    /// the production scheduling path, preference gate included.
    pub fn send_test_notification(
        &self,
        facility: Facility,
        service_name: &str,
        kind: EventKind,
    ) -> bool {
        let now = self.clock.now();
        let event = TabuEvent {
            id: format!("test-{}-{}", facility, now.timestamp_millis()),
            facility,
            service_name: service_name.to_string(),
            title: format!("{service_name} test"),
            description: "This is how facility notifications will look.".to_string(),
            start_time: now + Duration::seconds(2),
            end_time: None,
            kind,
        };
        self.schedule_event(&event)
    }

    fn render_title(&self, event: &TabuEvent) -> String {
        match event.kind {
            EventKind::Opening => format!("{} is opening", event.service_name),
            EventKind::Event => format!("{}: {}", event.service_name, event.title),
        }
    }

    fn render_body(&self, event: &TabuEvent) -> String {
        if event.description.is_empty() {
            match event.kind {
                EventKind::Opening => format!("{} is open now.", event.service_name),
                EventKind::Event => event.title.clone(),
            }
        } else {
            event.description.clone()
        }
    }
}
