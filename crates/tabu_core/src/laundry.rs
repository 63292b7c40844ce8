use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::channel::{ChannelError, NotificationChannel, ScheduledNotification};
use crate::clock::Clock;
use crate::ident::{self, Purpose, LAUNDRY_PURPOSES};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    Wash,
    Dry,
}

impl CycleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleType::Wash => "wash",
            CycleType::Dry => "dry",
        }
    }
}

impl fmt::Display for CycleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CycleType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "wash" => Ok(CycleType::Wash),
            "dry" => Ok(CycleType::Dry),
            other => Err(format!("unknown cycle type `{other}`")),
        }
    }
}

/// Lifecycle of one cycle. Transitions are driven by channel firings and
/// explicit cancellation; the manager never polls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum CyclePhase {
    Scheduled,
    Started,
    Reminded5,
    Reminded1,
    Completed,
    Cancelled,
}

impl CyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CyclePhase::Completed | CyclePhase::Cancelled)
    }
}

/// One in-progress wash or dry run. A machine is expected to carry at most
/// one live timer; that exclusivity is enforced by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaundryTimer {
    pub id: String,
    pub machine_number: u32,
    pub cycle_type: CycleType,
    pub duration_minutes: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub phase: CyclePhase,
}

impl LaundryTimer {
    pub fn new(
        machine_number: u32,
        cycle_type: CycleType,
        duration_minutes: u32,
        start_time: DateTime<Utc>,
    ) -> Self {
        let id = format!(
            "laundry-{}-{}-{}",
            machine_number,
            cycle_type,
            start_time.timestamp_millis()
        );
        Self {
            id,
            machine_number,
            cycle_type,
            duration_minutes,
            start_time,
            end_time: start_time + Duration::minutes(i64::from(duration_minutes)),
            phase: CyclePhase::Scheduled,
        }
    }

    /// The staged reminders derived from the cycle duration. Every cycle gets
    /// a start and a completion notification; the 5-minute and 1-minute
    /// reminders only exist when the duration leaves room for them.
    pub fn notification_plan(&self) -> Vec<PlannedNotification> {
        let machine = self.machine_number;
        let cycle = self.cycle_type;
        let mut plan = vec![
            PlannedNotification {
                purpose: Purpose::LaundryStart,
                fire_at: self.start_time + Duration::seconds(2),
                title: format!("Machine {machine} started"),
                body: format!(
                    "Your {cycle} cycle is running, done in {} min.",
                    self.duration_minutes
                ),
            },
            PlannedNotification {
                purpose: Purpose::LaundryComplete,
                fire_at: self.end_time,
                title: format!("Machine {machine} finished"),
                body: format!("Your {cycle} cycle is done. Time to collect your laundry."),
            },
        ];
        if self.duration_minutes > 5 {
            plan.push(PlannedNotification {
                purpose: Purpose::LaundryReminder5,
                fire_at: self.end_time - Duration::minutes(5),
                title: format!("Machine {machine}: 5 minutes left"),
                body: format!("Your {cycle} cycle finishes in 5 minutes."),
            });
        }
        if self.duration_minutes > 1 {
            plan.push(PlannedNotification {
                purpose: Purpose::LaundryReminder1,
                fire_at: self.end_time - Duration::minutes(1),
                title: format!("Machine {machine}: 1 minute left"),
                body: format!("Your {cycle} cycle finishes in 1 minute."),
            });
        }
        plan
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNotification {
    pub purpose: Purpose,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Notification actions the native shell relays back from the OS tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaundryAction {
    MarkCollected,
    Snooze,
}

pub type CollectedCallback = Box<dyn Fn(&str) + Send + Sync>;

const SNOOZE_MINUTES: i64 = 5;

/// Owns the set of in-flight cycles and their staged reminders. Scheduling
/// and cancellation are delegated to the channel; every failure below this
/// point is logged and swallowed, so a cycle is considered started even when
/// the platform refused its notifications.
pub struct LaundryTimerManager {
    channel: Arc<NotificationChannel>,
    clock: Arc<dyn Clock>,
    timers: RwLock<HashMap<String, LaundryTimer>>,
    on_collected: Option<CollectedCallback>,
}

impl LaundryTimerManager {
    pub fn new(
        channel: Arc<NotificationChannel>,
        clock: Arc<dyn Clock>,
        on_collected: Option<CollectedCallback>,
    ) -> Self {
        Self {
            channel,
            clock,
            timers: RwLock::new(HashMap::new()),
            on_collected,
        }
    }

    /// Create the timer, register its reminder plan and return the timer id.
    /// The id is returned even when scheduling degrades: the missing
    /// notification, not the missing timer, is the degraded mode.
    pub fn start_cycle(
        &self,
        machine_number: u32,
        cycle_type: CycleType,
        duration_minutes: u32,
    ) -> String {
        let now = self.clock.now();
        let timer = LaundryTimer::new(machine_number, cycle_type, duration_minutes.max(1), now);
        let plan = timer.notification_plan();
        let timer_id = timer.id.clone();
        self.timers.write().insert(timer_id.clone(), timer);

        for planned in plan {
            self.schedule_planned(&timer_id, &planned, now);
        }
        debug!(timer = %timer_id, machine = machine_number, "laundry cycle started");
        timer_id
    }

    /// Broadcast-cancel every purpose-derived id for this timer, snooze
    /// included, then drop the timer whether or not any individual cancel
    /// landed. Ids that were never scheduled cancel as no-ops.
    pub fn cancel_timer(&self, timer_id: &str) {
        for purpose in LAUNDRY_PURPOSES {
            self.channel.cancel(ident::allocate(purpose, timer_id));
        }
        if self.timers.write().remove(timer_id).is_none() {
            debug!(timer = %timer_id, "cancel for unknown timer");
        }
    }

    /// Timers whose cycle is still running. Read-only; settled entries are
    /// swept separately by [`evict_settled`](Self::evict_settled).
    pub fn active_timers(&self) -> Vec<LaundryTimer> {
        let now = self.clock.now();
        let mut active: Vec<LaundryTimer> = self
            .timers
            .read()
            .values()
            .filter(|timer| timer.end_time > now && !timer.phase.is_terminal())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.end_time.cmp(&b.end_time));
        active
    }

    /// Whole minutes until the cycle ends, never negative. Unknown ids
    /// answer zero.
    pub fn remaining_minutes(&self, timer_id: &str) -> i64 {
        let Some(end_time) = self
            .timers
            .read()
            .get(timer_id)
            .map(|timer| timer.end_time)
        else {
            warn!(error = %ChannelError::UnknownTimerId(timer_id.to_string()), "remaining time");
            return 0;
        };
        (end_time - self.clock.now()).num_minutes().max(0)
    }

    pub fn formatted_remaining(&self, timer_id: &str) -> String {
        let minutes = self.remaining_minutes(timer_id);
        if minutes >= 60 {
            format!("{} h {:02} min", minutes / 60, minutes % 60)
        } else {
            format!("{minutes} min")
        }
    }

    /// Phase advancement on a channel firing. Firing order follows wall-clock
    /// time, not issue order, so an out-of-order late firing never regresses
    /// the phase.
    pub fn note_fired(&self, purpose: Purpose, timer_id: &str) {
        let next = match purpose {
            Purpose::LaundryStart => CyclePhase::Started,
            Purpose::LaundryReminder5 => CyclePhase::Reminded5,
            Purpose::LaundryReminder1 => CyclePhase::Reminded1,
            Purpose::LaundryComplete => CyclePhase::Completed,
            Purpose::LaundrySnooze | Purpose::FacilityEvent => return,
        };
        let mut timers = self.timers.write();
        let Some(timer) = timers.get_mut(timer_id) else {
            debug!(timer = %timer_id, "firing for unknown timer");
            return;
        };
        if !timer.phase.is_terminal() && next > timer.phase {
            timer.phase = next;
        }
    }

    /// Native notification actions: collecting the laundry is an implicit
    /// cancellation, snoozing adds one extra reminder outside the plan.
    pub fn handle_action(&self, timer_id: &str, action: LaundryAction) {
        match action {
            LaundryAction::MarkCollected => {
                if !self.timers.read().contains_key(timer_id) {
                    warn!(error = %ChannelError::UnknownTimerId(timer_id.to_string()), "mark collected");
                    return;
                }
                self.cancel_timer(timer_id);
                if let Some(callback) = &self.on_collected {
                    callback(timer_id);
                }
            }
            LaundryAction::Snooze => {
                let Some(timer) = self.timers.read().get(timer_id).cloned() else {
                    warn!(error = %ChannelError::UnknownTimerId(timer_id.to_string()), "snooze");
                    return;
                };
                let now = self.clock.now();
                let planned = PlannedNotification {
                    purpose: Purpose::LaundrySnooze,
                    fire_at: now + Duration::minutes(SNOOZE_MINUTES),
                    title: format!("Machine {} reminder", timer.machine_number),
                    body: format!(
                        "Your {} cycle finished. Don't forget your laundry.",
                        timer.cycle_type
                    ),
                };
                self.schedule_planned(timer_id, &planned, now);
            }
        }
    }

    /// Drop completed, cancelled and long-expired entries so the map stays
    /// bounded across a long-running session.
    pub fn evict_settled(&self, now: DateTime<Utc>) {
        self.timers
            .write()
            .retain(|_, timer| !timer.phase.is_terminal() && timer.end_time > now);
    }

    fn schedule_planned(&self, timer_id: &str, planned: &PlannedNotification, now: DateTime<Utc>) {
        let notification = ScheduledNotification {
            id: ident::allocate(planned.purpose, timer_id),
            title: planned.title.clone(),
            body: planned.body.clone(),
            fire_at: planned.fire_at,
            extra: json!({
                "kind": "laundry",
                "purpose": planned.purpose.key(),
                "timer_id": timer_id,
            }),
        };
        self.channel.schedule_at(&notification, now);
    }
}
