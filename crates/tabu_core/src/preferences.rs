use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The amenities residents can subscribe to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facility {
    #[serde(rename = "fitness")]
    Fitness,
    #[serde(rename = "tea")]
    TeaRoom,
    #[serde(rename = "cafeteria")]
    Cafeteria,
    #[serde(rename = "bar")]
    Bar,
}

pub const ALL_FACILITIES: [Facility; 4] = [
    Facility::Fitness,
    Facility::TeaRoom,
    Facility::Cafeteria,
    Facility::Bar,
];

impl Facility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facility::Fitness => "fitness",
            Facility::TeaRoom => "tea",
            Facility::Cafeteria => "cafeteria",
            Facility::Bar => "bar",
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facility {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        ALL_FACILITIES
            .into_iter()
            .find(|facility| facility.as_str() == input.trim())
            .ok_or_else(|| format!("unknown facility `{input}`"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Opening,
    Event,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacilityPrefs {
    pub opening: bool,
    pub events: bool,
}

/// Per-facility notification toggles. The single source of truth gating
/// whether a facility event is actually scheduled.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferences {
    entries: BTreeMap<Facility, FacilityPrefs>,
}

impl NotificationPreferences {
    /// Hardcoded first-run default: every known facility opted out.
    pub fn seeded() -> Self {
        let mut entries = BTreeMap::new();
        for facility in ALL_FACILITIES {
            entries.insert(facility, FacilityPrefs::default());
        }
        Self { entries }
    }

    pub fn enabled(&self, facility: Facility, kind: EventKind) -> bool {
        let Some(prefs) = self.entries.get(&facility) else {
            return false;
        };
        match kind {
            EventKind::Opening => prefs.opening,
            EventKind::Event => prefs.events,
        }
    }

    pub fn set(&mut self, facility: Facility, kind: EventKind, enabled: bool) {
        let prefs = self.entries.entry(facility).or_default();
        match kind {
            EventKind::Opening => prefs.opening = enabled,
            EventKind::Event => prefs.events = enabled,
        }
    }

    pub fn facility(&self, facility: Facility) -> FacilityPrefs {
        self.entries.get(&facility).copied().unwrap_or_default()
    }
}

/// Durable JSON document holding the toggle map. Loaded once at startup,
/// overwritten in full on every change.
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("notification_preferences.json"),
        }
    }

    /// Read the stored map; on first run seed the default and persist the
    /// seed so later loads see the same shape.
    pub fn load(&self) -> Result<NotificationPreferences> {
        if !self.path.exists() {
            let seeded = NotificationPreferences::seeded();
            self.save(&seeded)?;
            debug!(path = %self.path.display(), "seeded default notification preferences");
            return Ok(seeded);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed preferences in {}", self.path.display()))
    }

    pub fn save(&self, preferences: &NotificationPreferences) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(preferences)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
