// MIT License - Copyright (c) 2021 TJForc
// Partition state and status deltas

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Partition status flags tracked by the alarm state store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct PartitionStatusFlags: u32 {
        const ALARM                  = 0x0000_0001;
        const ALARM_IN_MEMORY        = 0x0000_0002;
        const ALARM_FIRE_ZONE        = 0x0000_0004;
        /// Partition reported armed in any mode
        const ARMED                  = 0x0000_0008;
        const ARMED_AWAY             = 0x0000_0010;
        const ARMED_STAY             = 0x0000_0020;
        const ARMED_MAX              = 0x0000_0040;
        /// Armed with at least one zone bypassed
        const ARMED_BYPASS           = 0x0000_0080;
        const ARMED_ZERO_ENTRY_DELAY = 0x0000_0100;
        const AC_PRESENT             = 0x0000_0200;
        const CHIME                  = 0x0000_0400;
        const TROUBLE                = 0x0000_0800;
        const BAT_TROUBLE            = 0x0000_1000;
        const READY                  = 0x0000_2000;
        const FIRE                   = 0x0000_4000;
        const EXIT_DELAY             = 0x0000_8000;
        const ENTRY_DELAY            = 0x0001_0000;
        const BEEP                   = 0x0002_0000;

        /// Mutually exclusive armed modes
        const ARMED_MODES = Self::ARMED_AWAY.bits() | Self::ARMED_STAY.bits() | Self::ARMED_MAX.bits();
        /// Mutually exclusive arming delays
        const DELAYS = Self::EXIT_DELAY.bits() | Self::ENTRY_DELAY.bits();
    }
}

impl PartitionStatusFlags {
    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }
}

/// A set of flag assignments (and optionally a new alpha line) to merge into a partition.
///
/// Flags in neither `set` nor `clear` keep their current value, so the same delta
/// applied twice is a no-op the second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionDelta {
    pub set: PartitionStatusFlags,
    pub clear: PartitionStatusFlags,
    pub alpha: Option<&'static str>,
}

impl PartitionDelta {
    pub const fn new() -> Self {
        Self {
            set: PartitionStatusFlags::empty(),
            clear: PartitionStatusFlags::empty(),
            alpha: None,
        }
    }

    pub const fn set(mut self, flags: PartitionStatusFlags) -> Self {
        self.set = self.set.union(flags);
        self.clear = self.clear.difference(flags);
        self
    }

    pub const fn clear(mut self, flags: PartitionStatusFlags) -> Self {
        self.clear = self.clear.union(flags);
        self.set = self.set.difference(flags);
        self
    }

    /// Set or clear `flags` according to `on`.
    pub const fn assign(self, flags: PartitionStatusFlags, on: bool) -> Self {
        if on { self.set(flags) } else { self.clear(flags) }
    }

    pub const fn alpha(mut self, alpha: &'static str) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

impl Default for PartitionDelta {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single alarm partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionState {
    pub id: u32,
    pub status: PartitionStatusFlags,
    /// Keypad display text
    pub alpha: String,
    pub last_armed_by_user: String,
    pub last_disarmed_by_user: String,
}

impl PartitionState {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: PartitionStatusFlags::AC_PRESENT,
            alpha: "N/A".to_string(),
            last_armed_by_user: String::new(),
            last_disarmed_by_user: String::new(),
        }
    }

    /// Merge a delta into this partition. Returns the flags that changed.
    ///
    /// A delta that turns on one armed mode turns the other two off, and turning
    /// on either arming delay turns the other off.
    pub fn apply(&mut self, delta: &PartitionDelta) -> PartitionStatusFlags {
        let mut next = (self.status | delta.set) & !delta.clear;

        let modes = delta.set & PartitionStatusFlags::ARMED_MODES;
        if !modes.is_empty() {
            let keep = [
                PartitionStatusFlags::ARMED_MAX,
                PartitionStatusFlags::ARMED_AWAY,
                PartitionStatusFlags::ARMED_STAY,
            ]
            .into_iter()
            .find(|m| modes.contains(*m))
            .unwrap_or(modes);
            next = (next - PartitionStatusFlags::ARMED_MODES) | keep;
        }

        let delays = delta.set & PartitionStatusFlags::DELAYS;
        if delays == PartitionStatusFlags::EXIT_DELAY {
            next.remove(PartitionStatusFlags::ENTRY_DELAY);
        } else if delays == PartitionStatusFlags::ENTRY_DELAY {
            next.remove(PartitionStatusFlags::EXIT_DELAY);
        } else if delays == PartitionStatusFlags::DELAYS {
            next.remove(PartitionStatusFlags::EXIT_DELAY);
        }

        let changed = PartitionStatusFlags::changed(self.status, next);
        self.status = next;
        if let Some(alpha) = delta.alpha {
            self.alpha = alpha.to_string();
        }
        changed
    }

    pub fn set_alpha(&mut self, alpha: &str) -> bool {
        if self.alpha == alpha {
            return false;
        }
        self.alpha = alpha.to_string();
        true
    }

    // Convenience accessors
    pub fn is_alarm(&self) -> bool { self.status.contains(PartitionStatusFlags::ALARM) }
    pub fn is_armed(&self) -> bool { self.status.contains(PartitionStatusFlags::ARMED) }
    pub fn is_armed_away(&self) -> bool { self.status.contains(PartitionStatusFlags::ARMED_AWAY) }
    pub fn is_armed_stay(&self) -> bool { self.status.contains(PartitionStatusFlags::ARMED_STAY) }
    pub fn is_armed_max(&self) -> bool { self.status.contains(PartitionStatusFlags::ARMED_MAX) }
    pub fn is_ready(&self) -> bool { self.status.contains(PartitionStatusFlags::READY) }
    pub fn is_exit_delay(&self) -> bool { self.status.contains(PartitionStatusFlags::EXIT_DELAY) }
    pub fn is_entry_delay(&self) -> bool { self.status.contains(PartitionStatusFlags::ENTRY_DELAY) }
    pub fn is_ac_present(&self) -> bool { self.status.contains(PartitionStatusFlags::AC_PRESENT) }
    pub fn is_chime(&self) -> bool { self.status.contains(PartitionStatusFlags::CHIME) }
    pub fn is_trouble(&self) -> bool { self.status.contains(PartitionStatusFlags::TROUBLE) }
    pub fn is_fire(&self) -> bool { self.status.contains(PartitionStatusFlags::FIRE) }
}
