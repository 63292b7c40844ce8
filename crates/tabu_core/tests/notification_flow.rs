use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::tempdir;

use tabu_core::channel::{NotificationBridge, ScheduledNotification};
use tabu_core::clock::Clock;
use tabu_core::events::TabuEvent;
use tabu_core::laundry::{CycleType, LaundryAction};
use tabu_core::platform::{Platform, RuntimeSignals};
use tabu_core::preferences::{EventKind, Facility};
use tabu_core::TabuService;

#[derive(Default)]
struct RecordingBridge {
    scheduled: Mutex<Vec<ScheduledNotification>>,
    displayed: Mutex<Vec<ScheduledNotification>>,
    cancelled: Mutex<Vec<u32>>,
}

impl NotificationBridge for RecordingBridge {
    fn request_permission(&self) -> bool {
        true
    }

    fn permission_granted(&self) -> bool {
        true
    }

    fn schedule(&self, notification: &ScheduledNotification) -> bool {
        self.scheduled.lock().push(notification.clone());
        true
    }

    fn display(&self, notification: &ScheduledNotification) -> bool {
        self.displayed.lock().push(notification.clone());
        true
    }

    fn cancel(&self, id: u32) -> bool {
        self.cancelled.lock().push(id);
        true
    }
}

struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
}

fn native_signals() -> RuntimeSignals {
    RuntimeSignals {
        has_native_bridge: true,
        user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8)".to_string(),
        standalone_display: false,
    }
}

fn browser_signals() -> RuntimeSignals {
    RuntimeSignals {
        has_native_bridge: false,
        user_agent: "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
        standalone_display: false,
    }
}

struct Harness {
    service: TabuService,
    bridge: Arc<RecordingBridge>,
    clock: Arc<ManualClock>,
    _data_dir: tempfile::TempDir,
}

fn harness(signals: RuntimeSignals) -> Harness {
    let data_dir = tempdir().expect("tempdir");
    let bridge = Arc::new(RecordingBridge::default());
    let clock = ManualClock::starting_at(base_time());
    let service = TabuService::builder()
        .with_signals(signals)
        .with_bridge(bridge.clone())
        .with_clock(clock.clone())
        .with_data_dir(data_dir.path())
        .build()
        .expect("build service");
    assert!(service.initialize_notifications());
    Harness {
        service,
        bridge,
        clock,
        _data_dir: data_dir,
    }
}

#[test]
fn starting_a_long_cycle_schedules_four_notifications() {
    let h = harness(native_signals());
    assert_eq!(h.service.platform(), Platform::AndroidNative);

    let timer_id = h.service.start_laundry_cycle(3, CycleType::Wash, 45);
    assert_eq!(
        timer_id,
        format!("laundry-3-wash-{}", base_time().timestamp_millis())
    );

    let scheduled = h.bridge.scheduled.lock();
    assert_eq!(scheduled.len(), 4);
    let mut ids: Vec<u32> = scheduled.iter().map(|n| n.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4, "each stage gets its own id");
}

#[test]
fn short_cycles_schedule_fewer_stages() {
    let h = harness(native_signals());
    h.service.start_laundry_cycle(1, CycleType::Dry, 3);
    assert_eq!(h.bridge.scheduled.lock().len(), 3);

    let h = harness(native_signals());
    h.service.start_laundry_cycle(1, CycleType::Dry, 1);
    assert_eq!(h.bridge.scheduled.lock().len(), 2);
}

#[test]
fn remaining_time_counts_down_and_never_goes_negative() {
    let h = harness(native_signals());
    let timer_id = h.service.start_laundry_cycle(3, CycleType::Wash, 45);

    let first = h.service.remaining_minutes(&timer_id);
    assert!(first == 44 || first == 45);

    h.clock.advance(Duration::minutes(10));
    let second = h.service.remaining_minutes(&timer_id);
    assert!(second <= first);

    h.clock.advance(Duration::minutes(60));
    assert_eq!(h.service.remaining_minutes(&timer_id), 0);
    assert_eq!(h.service.remaining_minutes("laundry-9-dry-0"), 0);
}

#[test]
fn expired_cycles_leave_the_active_list() {
    let h = harness(native_signals());
    let timer_id = h.service.start_laundry_cycle(3, CycleType::Wash, 45);
    assert_eq!(h.service.active_timers().len(), 1);

    h.clock.advance(Duration::minutes(46));
    assert!(h
        .service
        .active_timers()
        .iter()
        .all(|timer| timer.id != timer_id));
}

#[test]
fn cancelling_removes_the_timer_and_broadcasts_cancels() {
    let h = harness(native_signals());
    let timer_id = h.service.start_laundry_cycle(2, CycleType::Dry, 30);

    h.service.cancel_timer(&timer_id);
    assert!(h.service.active_timers().is_empty());

    // All five purpose-derived ids are cancelled, snooze included, whether or
    // not each was actually scheduled.
    let cancelled = h.bridge.cancelled.lock();
    assert_eq!(cancelled.len(), 5);
    let scheduled_ids: Vec<u32> = h.bridge.scheduled.lock().iter().map(|n| n.id).collect();
    for id in &scheduled_ids {
        assert!(cancelled.contains(id));
    }
}

#[test]
fn browser_fallback_fires_through_the_pump() {
    let h = harness(browser_signals());
    assert_eq!(h.service.platform(), Platform::Browser);

    let timer_id = h.service.start_laundry_cycle(4, CycleType::Wash, 10);
    assert!(
        h.bridge.scheduled.lock().is_empty(),
        "fallback never reaches the OS scheduler"
    );

    // Nothing due yet.
    assert!(h.service.tick().is_empty());

    h.clock.advance(Duration::seconds(3));
    let fired = h.service.tick();
    assert_eq!(fired.len(), 1, "start notification fires near-instantly");

    h.clock.advance(Duration::minutes(5) + Duration::seconds(30));
    let fired = h.service.tick();
    assert_eq!(fired.len(), 1, "5-minute reminder");

    h.clock.advance(Duration::minutes(5));
    let fired = h.service.tick();
    assert_eq!(fired.len(), 2, "1-minute reminder and completion");

    let displayed = h.bridge.displayed.lock();
    assert_eq!(displayed.len(), 4);
    assert!(displayed
        .iter()
        .all(|n| n.extra["timer_id"] == timer_id.as_str()));

    // Completion settles the timer; the sweep then drops it.
    assert!(h.service.active_timers().is_empty());
}

#[test]
fn fallback_cancellation_suppresses_pending_callbacks() {
    let h = harness(browser_signals());
    let timer_id = h.service.start_laundry_cycle(4, CycleType::Wash, 10);
    h.service.cancel_timer(&timer_id);

    h.clock.advance(Duration::minutes(11));
    assert!(h.service.tick().is_empty());
    assert!(h.bridge.displayed.lock().is_empty());
}

#[test]
fn mark_collected_cancels_and_invokes_the_callback() {
    let data_dir = tempdir().expect("tempdir");
    let bridge = Arc::new(RecordingBridge::default());
    let clock = ManualClock::starting_at(base_time());
    let collected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let service = TabuService::builder()
        .with_signals(native_signals())
        .with_bridge(bridge.clone())
        .with_clock(clock.clone())
        .with_data_dir(data_dir.path())
        .on_laundry_collected(Box::new(move |timer_id| {
            sink.lock().push(timer_id.to_string());
        }))
        .build()
        .expect("build service");
    service.initialize_notifications();

    let timer_id = service.start_laundry_cycle(5, CycleType::Dry, 60);
    service.handle_notification_action(&timer_id, LaundryAction::MarkCollected);

    assert_eq!(*collected.lock(), vec![timer_id.clone()]);
    assert!(service.active_timers().is_empty());
}

#[test]
fn snooze_schedules_one_extra_reminder() {
    let h = harness(native_signals());
    let timer_id = h.service.start_laundry_cycle(5, CycleType::Dry, 60);
    let before = h.bridge.scheduled.lock().len();

    h.service
        .handle_notification_action(&timer_id, LaundryAction::Snooze);
    let scheduled = h.bridge.scheduled.lock();
    assert_eq!(scheduled.len(), before + 1);
    let snoozed = scheduled.last().unwrap();
    assert_eq!(snoozed.fire_at, h.clock.now() + Duration::minutes(5));
}

#[test]
fn notification_actions_are_ignored_outside_native_shells() {
    let h = harness(browser_signals());
    let timer_id = h.service.start_laundry_cycle(5, CycleType::Dry, 60);
    h.service
        .handle_notification_action(&timer_id, LaundryAction::MarkCollected);
    assert_eq!(h.service.active_timers().len(), 1);
}

#[test]
fn first_run_seeds_opted_out_preferences() {
    let h = harness(native_signals());
    let prefs = h.service.preferences();
    assert!(!prefs.enabled(Facility::Fitness, EventKind::Opening));

    let event = TabuEvent {
        id: "evt-open-1".to_string(),
        facility: Facility::Fitness,
        service_name: "Fitness room".to_string(),
        title: "Opening".to_string(),
        description: String::new(),
        start_time: base_time() + Duration::hours(2),
        end_time: None,
        kind: EventKind::Opening,
    };
    assert!(!h.service.schedule_event_notification(&event));
    assert!(h.bridge.scheduled.lock().is_empty());
}

#[test]
fn preference_toggles_persist_across_reloads() {
    let data_dir = tempdir().expect("tempdir");
    {
        let service = TabuService::builder()
            .with_signals(native_signals())
            .with_bridge(Arc::new(RecordingBridge::default()))
            .with_data_dir(data_dir.path())
            .build()
            .expect("build service");
        service
            .set_preference(Facility::Cafeteria, EventKind::Opening, true)
            .expect("set preference");
    }

    let reloaded = TabuService::builder()
        .with_signals(native_signals())
        .with_bridge(Arc::new(RecordingBridge::default()))
        .with_data_dir(data_dir.path())
        .build()
        .expect("rebuild service");
    let prefs = reloaded.preferences();
    assert!(prefs.enabled(Facility::Cafeteria, EventKind::Opening));
    assert!(!prefs.enabled(Facility::Cafeteria, EventKind::Event));
}

#[test]
fn event_cancellation_uses_the_scheduled_id() {
    let h = harness(native_signals());
    h.service
        .set_preference(Facility::TeaRoom, EventKind::Event, true)
        .expect("enable events");

    let event = TabuEvent {
        id: "evt-1".to_string(),
        facility: Facility::TeaRoom,
        service_name: "Tea room".to_string(),
        title: "Tasting evening".to_string(),
        description: "Seasonal teas in the tea room.".to_string(),
        start_time: base_time() + Duration::hours(3),
        end_time: Some(base_time() + Duration::hours(5)),
        kind: EventKind::Event,
    };
    assert!(h.service.schedule_event_notification(&event));
    let scheduled_id = h.bridge.scheduled.lock()[0].id;

    h.service.cancel_event_notification("evt-1");
    assert_eq!(*h.bridge.cancelled.lock(), vec![scheduled_id]);
}
