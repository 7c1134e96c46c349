// MIT License - Copyright (c) 2021 TJForc
// Zone state and status deltas

use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Zone status flags tracked by the alarm state store.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ZoneStatusFlags: u8 {
        /// Zone is open (circuit not closed)
        const OPEN   = 0b0001;
        /// Zone is faulted (Honeywell reports open and fault together)
        const FAULT  = 0b0010;
        /// Zone in alarm
        const ALARM  = 0b0100;
        /// Tamper detected
        const TAMPER = 0b1000;
    }
}

impl ZoneStatusFlags {
    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }
}

/// Flag assignments to merge into a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneDelta {
    pub set: ZoneStatusFlags,
    pub clear: ZoneStatusFlags,
}

impl ZoneDelta {
    pub const fn new() -> Self {
        Self {
            set: ZoneStatusFlags::empty(),
            clear: ZoneStatusFlags::empty(),
        }
    }

    pub const fn set(mut self, flags: ZoneStatusFlags) -> Self {
        self.set = self.set.union(flags);
        self.clear = self.clear.difference(flags);
        self
    }

    pub const fn clear(mut self, flags: ZoneStatusFlags) -> Self {
        self.clear = self.clear.union(flags);
        self.set = self.set.difference(flags);
        self
    }

    /// Open and faulted together, or closed and restored together.
    pub const fn faulted(on: bool) -> Self {
        let flags = ZoneStatusFlags::OPEN.union(ZoneStatusFlags::FAULT);
        if on { Self::new().set(flags) } else { Self::new().clear(flags) }
    }
}

impl Default for ZoneDelta {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneState {
    pub id: u32,
    pub status: ZoneStatusFlags,
    /// Only ever reported by Uno modules
    pub bypassed: Option<bool>,
    /// Seconds since the last fault transition, 0 while faulted
    pub last_fault: u32,
}

impl ZoneState {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: ZoneStatusFlags::empty(),
            bypassed: None,
            last_fault: 0,
        }
    }

    /// Merge a delta into this zone. Returns the flags that changed.
    ///
    /// A zone that becomes open or faulted has its fault timer reset.
    pub fn apply(&mut self, delta: &ZoneDelta) -> ZoneStatusFlags {
        let next = (self.status | delta.set) & !delta.clear;
        let changed = ZoneStatusFlags::changed(self.status, next);
        self.status = next;
        if (changed & next).intersects(ZoneStatusFlags::OPEN | ZoneStatusFlags::FAULT) {
            self.last_fault = 0;
        }
        changed
    }

    // Convenience accessors
    pub fn is_open(&self) -> bool { self.status.contains(ZoneStatusFlags::OPEN) }
    pub fn is_fault(&self) -> bool { self.status.contains(ZoneStatusFlags::FAULT) }
    pub fn is_alarm(&self) -> bool { self.status.contains(ZoneStatusFlags::ALARM) }
    pub fn is_tamper(&self) -> bool { self.status.contains(ZoneStatusFlags::TAMPER) }
    pub fn is_bypassed(&self) -> bool { self.bypassed.unwrap_or(false) }
}
