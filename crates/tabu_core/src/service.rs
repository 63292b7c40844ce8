use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::channel::{
    ChannelError, ConsoleBridge, NotificationBridge, NotificationChannel, ScheduledNotification,
};
use crate::clock::{Clock, SystemClock};
use crate::events::{FacilityEventManager, TabuEvent};
use crate::ident::Purpose;
use crate::laundry::{CollectedCallback, CycleType, LaundryAction, LaundryTimer, LaundryTimerManager};
use crate::platform::{Platform, RuntimeSignals};
use crate::preferences::{EventKind, Facility, NotificationPreferences, PreferenceStore};

/// Composition root for the notification core. Explicitly constructed and
/// handed down by the application's top level; nothing in here is a global.
pub struct TabuService {
    platform: Platform,
    channel: Arc<NotificationChannel>,
    laundry: LaundryTimerManager,
    events: FacilityEventManager,
    store: PreferenceStore,
    preferences: Arc<RwLock<NotificationPreferences>>,
    clock: Arc<dyn Clock>,
}

pub struct TabuServiceBuilder {
    signals: RuntimeSignals,
    bridge: Option<Arc<dyn NotificationBridge>>,
    clock: Option<Arc<dyn Clock>>,
    data_dir: Option<PathBuf>,
    on_collected: Option<CollectedCallback>,
}

impl TabuServiceBuilder {
    pub fn new() -> Self {
        Self {
            signals: RuntimeSignals::default(),
            bridge: None,
            clock: None,
            data_dir: None,
            on_collected: None,
        }
    }

    /// Runtime signals captured at the first client-side tick. Classification
    /// happens during `build`, once, and holds for the session.
    pub fn with_signals(mut self, signals: RuntimeSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_bridge(mut self, bridge: Arc<dyn NotificationBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Invoked when a resident marks their laundry collected from a
    /// notification action, so the UI can reflect the collection.
    pub fn on_laundry_collected(mut self, callback: CollectedCallback) -> Self {
        self.on_collected = Some(callback);
        self
    }

    pub fn build(self) -> Result<TabuService> {
        let platform = Platform::classify(&self.signals);
        let kind = platform.channel_kind();
        let bridge = self
            .bridge
            .unwrap_or_else(|| Arc::new(ConsoleBridge::default()));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let channel = Arc::new(NotificationChannel::for_kind(kind, bridge));

        let data_dir = self
            .data_dir
            .unwrap_or_else(|| PathBuf::from("."));
        let store = PreferenceStore::new(&data_dir);
        let preferences = Arc::new(RwLock::new(
            store
                .load()
                .context("failed to load notification preferences")?,
        ));

        info!(?platform, channel = ?kind, "notification core initialized");
        Ok(TabuService {
            platform,
            laundry: LaundryTimerManager::new(channel.clone(), clock.clone(), self.on_collected),
            events: FacilityEventManager::new(channel.clone(), clock.clone(), preferences.clone()),
            channel,
            store,
            preferences,
            clock,
        })
    }
}

impl Default for TabuServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TabuService {
    pub fn builder() -> TabuServiceBuilder {
        TabuServiceBuilder::new()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Request the delivery permission once; safe to call again, an existing
    /// grant short-circuits.
    pub fn initialize_notifications(&self) -> bool {
        self.channel.initialize()
    }

    pub fn notifications_permitted(&self) -> bool {
        self.channel.check_permission()
    }

    pub fn start_laundry_cycle(
        &self,
        machine_number: u32,
        cycle_type: CycleType,
        duration_minutes: u32,
    ) -> String {
        self.laundry
            .start_cycle(machine_number, cycle_type, duration_minutes)
    }

    pub fn cancel_timer(&self, timer_id: &str) {
        self.laundry.cancel_timer(timer_id);
    }

    pub fn active_timers(&self) -> Vec<LaundryTimer> {
        self.laundry.active_timers()
    }

    pub fn remaining_minutes(&self, timer_id: &str) -> i64 {
        self.laundry.remaining_minutes(timer_id)
    }

    pub fn formatted_remaining(&self, timer_id: &str) -> String {
        self.laundry.formatted_remaining(timer_id)
    }

    /// Entry point for notification actions relayed by the native shell.
    /// Only native platforms surface action buttons; elsewhere the relay is
    /// logged and ignored.
    pub fn handle_notification_action(&self, timer_id: &str, action: LaundryAction) {
        if !self.platform.is_native() {
            warn!(
                error = %ChannelError::PlatformUnsupported,
                timer = %timer_id,
                "notification action outside a native shell"
            );
            return;
        }
        self.laundry.handle_action(timer_id, action);
    }

    pub fn schedule_event_notification(&self, event: &TabuEvent) -> bool {
        self.events.schedule_event(event)
    }

    pub fn cancel_event_notification(&self, event_id: &str) {
        self.events.cancel_event(event_id);
    }

    pub fn send_test_notification(
        &self,
        facility: Facility,
        service_name: &str,
        kind: EventKind,
    ) -> bool {
        self.events.send_test_notification(facility, service_name, kind)
    }

    pub fn preferences(&self) -> NotificationPreferences {
        self.preferences.read().clone()
    }

    /// Flip one toggle and re-persist the whole map.
    pub fn set_preference(&self, facility: Facility, kind: EventKind, enabled: bool) -> Result<()> {
        let snapshot = {
            let mut preferences = self.preferences.write();
            preferences.set(facility, kind, enabled);
            preferences.clone()
        };
        self.store.save(&snapshot)
    }

    /// Drive the in-process deferred channels: fire due registrations,
    /// advance cycle phases from what fired, then sweep settled timers. The
    /// embedding loop calls this from its main task; the core spawns nothing.
    pub fn tick(&self) -> Vec<ScheduledNotification> {
        let now = self.clock.now();
        self.tick_at(now)
    }

    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<ScheduledNotification> {
        let fired = self.channel.pump(now);
        for notification in &fired {
            self.route_firing(notification);
        }
        self.laundry.evict_settled(now);
        fired
    }

    fn route_firing(&self, notification: &ScheduledNotification) {
        let Some(purpose) = notification
            .extra
            .get("purpose")
            .and_then(|value| value.as_str())
            .and_then(Purpose::from_key)
        else {
            debug!(id = notification.id, "fired notification without laundry metadata");
            return;
        };
        if let Some(timer_id) = notification
            .extra
            .get("timer_id")
            .and_then(|value| value.as_str())
        {
            self.laundry.note_fired(purpose, timer_id);
        }
    }
}
