use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Delivery failures. Every one of these is logged where it occurs and
/// flattened into a boolean or a no-op; notifications are a best-effort
/// enhancement and the channel layer never propagates an error to the UI.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("notification permission denied")]
    PermissionDenied,
    #[error("platform does not support this operation")]
    PlatformUnsupported,
    #[error("platform refused to schedule notification {0}")]
    SchedulingFailed(u32),
    #[error("unknown timer id `{0}`")]
    UnknownTimerId(String),
}

/// One scheduled delivery: the `(id, title, body, firingTime, extra)` shape
/// the platform bridge consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledNotification {
    pub id: u32,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub extra: serde_json::Value,
}

/// Platform-specific delivery adapters implement this trait. The host shell
/// wires the real plugin (native local-notification scheduler, browser
/// Notification API); tests substitute a recording double.
pub trait NotificationBridge: Send + Sync {
    /// Prompt the user for the platform's permission grant.
    fn request_permission(&self) -> bool;
    /// Current grant state, without prompting.
    fn permission_granted(&self) -> bool;
    /// Register an OS-level scheduled delivery that outlives the process.
    fn schedule(&self, notification: &ScheduledNotification) -> bool;
    /// Display immediately. Used by in-process channels when a deferred
    /// registration comes due.
    fn display(&self, notification: &ScheduledNotification) -> bool;
    /// Remove a not-yet-fired OS-level registration.
    fn cancel(&self, id: u32) -> bool;
}

/// Bridge used where no host shell is wired (headless runs, the dev binary).
/// Deliveries are logged instead of displayed.
#[derive(Debug, Default)]
pub struct ConsoleBridge;

impl NotificationBridge for ConsoleBridge {
    fn request_permission(&self) -> bool {
        true
    }

    fn permission_granted(&self) -> bool {
        true
    }

    fn schedule(&self, notification: &ScheduledNotification) -> bool {
        info!(
            id = notification.id,
            fire_at = %notification.fire_at,
            title = %notification.title,
            "scheduled notification"
        );
        true
    }

    fn display(&self, notification: &ScheduledNotification) -> bool {
        info!(
            id = notification.id,
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
        true
    }

    fn cancel(&self, id: u32) -> bool {
        debug!(id, "cancelled notification");
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelKind {
    NativeLocal,
    InstalledPwaWeb,
    BrowserFallback,
}

/// The three delivery mechanisms behind one shape. The set is closed: the
/// behavior differences are total substitutions selected once at startup,
/// never refined at runtime.
pub enum NotificationChannel {
    NativeLocal(NativeLocalChannel),
    InstalledPwaWeb(DeferredChannel),
    BrowserFallback(DeferredChannel),
}

impl NotificationChannel {
    pub fn for_kind(kind: ChannelKind, bridge: Arc<dyn NotificationBridge>) -> Self {
        match kind {
            ChannelKind::NativeLocal => NotificationChannel::NativeLocal(NativeLocalChannel {
                bridge,
                granted: Mutex::new(false),
            }),
            ChannelKind::InstalledPwaWeb => {
                NotificationChannel::InstalledPwaWeb(DeferredChannel::new(bridge, true))
            }
            ChannelKind::BrowserFallback => {
                NotificationChannel::BrowserFallback(DeferredChannel::new(bridge, false))
            }
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            NotificationChannel::NativeLocal(_) => ChannelKind::NativeLocal,
            NotificationChannel::InstalledPwaWeb(_) => ChannelKind::InstalledPwaWeb,
            NotificationChannel::BrowserFallback(_) => ChannelKind::BrowserFallback,
        }
    }

    /// Request the permission grant. Idempotent: an already-granted channel
    /// answers `true` without re-prompting.
    pub fn initialize(&self) -> bool {
        match self {
            NotificationChannel::NativeLocal(channel) => channel.initialize(),
            NotificationChannel::InstalledPwaWeb(channel)
            | NotificationChannel::BrowserFallback(channel) => channel.initialize(),
        }
    }

    pub fn check_permission(&self) -> bool {
        match self {
            NotificationChannel::NativeLocal(channel) => *channel.granted.lock(),
            NotificationChannel::InstalledPwaWeb(channel)
            | NotificationChannel::BrowserFallback(channel) => *channel.granted.lock(),
        }
    }

    /// Best-effort registration; failures are logged and swallowed.
    pub fn schedule_at(&self, notification: &ScheduledNotification, now: DateTime<Utc>) {
        match self {
            NotificationChannel::NativeLocal(channel) => channel.schedule_at(notification),
            NotificationChannel::InstalledPwaWeb(channel)
            | NotificationChannel::BrowserFallback(channel) => {
                channel.schedule_at(notification, now)
            }
        }
    }

    /// Remove a not-yet-fired registration. Cancelling an id that was never
    /// scheduled is a no-op, not an error.
    pub fn cancel(&self, id: u32) {
        match self {
            NotificationChannel::NativeLocal(channel) => {
                channel.bridge.cancel(id);
            }
            NotificationChannel::InstalledPwaWeb(channel) => channel.cancel_pending(id),
            NotificationChannel::BrowserFallback(channel) => channel.tombstone(id),
        }
    }

    /// Fire every due deferred registration and report what fired. The native
    /// channel has nothing to pump: the OS delivers outside this process.
    pub fn pump(&self, now: DateTime<Utc>) -> Vec<ScheduledNotification> {
        match self {
            NotificationChannel::NativeLocal(_) => Vec::new(),
            NotificationChannel::InstalledPwaWeb(channel)
            | NotificationChannel::BrowserFallback(channel) => channel.pump(now),
        }
    }
}

/// OS-level scheduling through the native local-notification plugin.
/// Deliveries survive the process; nothing is held in memory here beyond the
/// grant state.
pub struct NativeLocalChannel {
    bridge: Arc<dyn NotificationBridge>,
    granted: Mutex<bool>,
}

impl NativeLocalChannel {
    fn initialize(&self) -> bool {
        let mut granted = self.granted.lock();
        if *granted || self.bridge.permission_granted() {
            *granted = true;
            return true;
        }
        *granted = self.bridge.request_permission();
        if !*granted {
            warn!(error = %ChannelError::PermissionDenied, "native channel unavailable");
        }
        *granted
    }

    fn schedule_at(&self, notification: &ScheduledNotification) {
        if !*self.granted.lock() {
            warn!(
                error = %ChannelError::PermissionDenied,
                id = notification.id,
                "dropping notification"
            );
            return;
        }
        if !self.bridge.schedule(notification) {
            warn!(
                error = %ChannelError::SchedulingFailed(notification.id),
                "native scheduling refused"
            );
        }
    }
}

/// In-process deferred delivery, shared by the installed-PWA web channel and
/// the plain-browser fallback. Registrations live only as long as the process
/// and fire when the embedding loop pumps past their fire time.
///
/// The two variants differ in cancellation: the PWA channel tracks its
/// registrations and can drop a pending one, while the fallback's underlying
/// timer primitive exposes no cancellation, so cancelled ids are tombstoned
/// and skipped at fire time instead. Neither can recall a notification that
/// already displayed, and neither survives the process ending before the fire
/// time.
pub struct DeferredChannel {
    bridge: Arc<dyn NotificationBridge>,
    cancellable: bool,
    granted: Mutex<bool>,
    pending: Mutex<Vec<ScheduledNotification>>,
    tombstones: Mutex<HashSet<u32>>,
}

impl DeferredChannel {
    fn new(bridge: Arc<dyn NotificationBridge>, cancellable: bool) -> Self {
        Self {
            bridge,
            cancellable,
            granted: Mutex::new(false),
            pending: Mutex::new(Vec::new()),
            tombstones: Mutex::new(HashSet::new()),
        }
    }

    fn initialize(&self) -> bool {
        let mut granted = self.granted.lock();
        if *granted || self.bridge.permission_granted() {
            *granted = true;
            return true;
        }
        *granted = self.bridge.request_permission();
        if !*granted {
            warn!(error = %ChannelError::PermissionDenied, "web notifications unavailable");
        }
        *granted
    }

    fn schedule_at(&self, notification: &ScheduledNotification, now: DateTime<Utc>) {
        if !*self.granted.lock() {
            warn!(
                error = %ChannelError::PermissionDenied,
                id = notification.id,
                "dropping notification"
            );
            return;
        }
        if notification.fire_at <= now {
            debug!(id = notification.id, "fire time already passed, skipping");
            return;
        }
        // A fresh registration supersedes an earlier cancel of the same id.
        self.tombstones.lock().remove(&notification.id);
        let mut pending = self.pending.lock();
        pending.retain(|existing| existing.id != notification.id);
        pending.push(notification.clone());
    }

    fn cancel_pending(&self, id: u32) {
        self.pending.lock().retain(|existing| existing.id != id);
    }

    fn tombstone(&self, id: u32) {
        self.tombstones.lock().insert(id);
    }

    fn pump(&self, now: DateTime<Utc>) -> Vec<ScheduledNotification> {
        let due: Vec<ScheduledNotification> = {
            let mut pending = self.pending.lock();
            let (ready, rest): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|n| n.fire_at <= now);
            *pending = rest;
            ready
        };

        let mut fired = Vec::new();
        for notification in due {
            if !self.cancellable && self.tombstones.lock().remove(&notification.id) {
                debug!(id = notification.id, "suppressing cancelled deferred notification");
                continue;
            }
            if self.bridge.display(&notification) {
                fired.push(notification);
            } else {
                warn!(
                    error = %ChannelError::SchedulingFailed(notification.id),
                    "deferred display refused"
                );
            }
        }
        fired
    }
}
