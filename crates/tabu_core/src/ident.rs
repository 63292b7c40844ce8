//! Deterministic notification-id allocation.
//!
//! Every live notification carries an integer id inside `[0, 30000)`. Each
//! purpose owns a disjoint slice of that space so that laundry reminders,
//! completions, snoozes and facility announcements can never cancel one
//! another. Ids are recomputed from the logical key on cancellation, so the
//! mapping must stay stable across calls.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    LaundryStart,
    LaundryReminder5,
    LaundryReminder1,
    LaundryComplete,
    LaundrySnooze,
    FacilityEvent,
}

pub const ALL_PURPOSES: [Purpose; 6] = [
    Purpose::LaundryStart,
    Purpose::LaundryReminder5,
    Purpose::LaundryReminder1,
    Purpose::LaundryComplete,
    Purpose::LaundrySnooze,
    Purpose::FacilityEvent,
];

pub const LAUNDRY_PURPOSES: [Purpose; 5] = [
    Purpose::LaundryStart,
    Purpose::LaundryReminder5,
    Purpose::LaundryReminder1,
    Purpose::LaundryComplete,
    Purpose::LaundrySnooze,
];

impl Purpose {
    /// Range offset and width inside the shared id space.
    pub fn range(&self) -> (u32, u32) {
        match self {
            Purpose::LaundryStart => (0, 2_000),
            Purpose::LaundryReminder5 => (2_000, 2_000),
            Purpose::LaundryReminder1 => (4_000, 2_000),
            Purpose::LaundryComplete => (6_000, 2_000),
            Purpose::LaundrySnooze => (8_000, 2_000),
            Purpose::FacilityEvent => (20_000, 10_000),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Purpose::LaundryStart => "laundry_start",
            Purpose::LaundryReminder5 => "laundry_reminder_5",
            Purpose::LaundryReminder1 => "laundry_reminder_1",
            Purpose::LaundryComplete => "laundry_complete",
            Purpose::LaundrySnooze => "laundry_snooze",
            Purpose::FacilityEvent => "facility_event",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        ALL_PURPOSES.into_iter().find(|purpose| purpose.key() == key)
    }
}

/// Map a logical key onto the purpose's id slice. Collisions between distinct
/// keys inside one purpose are possible and tolerated; the colliding
/// registration is silently replaced by the newer one.
pub fn allocate(purpose: Purpose, logical_key: &str) -> u32 {
    let (offset, width) = purpose.range();
    offset + rolling_hash(logical_key) % width
}

fn rolling_hash(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in input.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_deterministic() {
        let first = allocate(Purpose::LaundryComplete, "laundry-3-wash-1700000000000");
        let second = allocate(Purpose::LaundryComplete, "laundry-3-wash-1700000000000");
        assert_eq!(first, second);
    }

    #[test]
    fn ids_stay_inside_the_purpose_range() {
        for purpose in ALL_PURPOSES {
            let (offset, width) = purpose.range();
            for key in ["laundry-1-dry-42", "evt-1", "", "a-very-long-key-with-many-bytes"] {
                let id = allocate(purpose, key);
                assert!(id >= offset && id < offset + width, "{id} outside {purpose:?}");
            }
        }
    }

    #[test]
    fn purpose_ranges_are_disjoint() {
        for (i, a) in ALL_PURPOSES.iter().enumerate() {
            for b in ALL_PURPOSES.iter().skip(i + 1) {
                let (a_off, a_width) = a.range();
                let (b_off, b_width) = b.range();
                let overlap = a_off < b_off + b_width && b_off < a_off + a_width;
                assert!(!overlap, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn purpose_keys_round_trip() {
        for purpose in ALL_PURPOSES {
            assert_eq!(Purpose::from_key(purpose.key()), Some(purpose));
        }
        assert_eq!(Purpose::from_key("unknown"), None);
    }
}
