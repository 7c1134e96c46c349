// MIT License - Copyright (c) 2021 TJForc
// Bit-packed payloads: keypad icons, DSC LEDs, zone bitfields and zone timers

use bitflags::bitflags;

use crate::constants::{ZONE_TIMER_MAX_SECS, ZONE_TIMER_TICK_SECS};
use crate::devices::PartitionStatusFlags;
use crate::error::{Result, TpiError};

bitflags! {
    /// Honeywell keypad icon bitfield (second field of a `%00` keypad update).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IconLedFlags: u16 {
        const ALARM                  = 1 << 0;
        const ALARM_IN_MEMORY        = 1 << 1;
        const ARMED_AWAY             = 1 << 2;
        const AC_PRESENT             = 1 << 3;
        const BYPASS                 = 1 << 4;
        const CHIME                  = 1 << 5;
        const RESERVED_6             = 1 << 6;
        const ARMED_ZERO_ENTRY_DELAY = 1 << 7;
        const ALARM_FIRE_ZONE        = 1 << 8;
        const SYSTEM_TROUBLE         = 1 << 9;
        const RESERVED_10            = 1 << 10;
        const RESERVED_11            = 1 << 11;
        const READY                  = 1 << 12;
        const FIRE                   = 1 << 13;
        const LOW_BATTERY            = 1 << 14;
        const ARMED_STAY             = 1 << 15;
    }
}

/// Icon bit to partition flag mapping. Reserved bits have no partition flag.
const ICON_TO_PARTITION: [(IconLedFlags, PartitionStatusFlags); 13] = [
    (IconLedFlags::ALARM, PartitionStatusFlags::ALARM),
    (IconLedFlags::ALARM_IN_MEMORY, PartitionStatusFlags::ALARM_IN_MEMORY),
    (IconLedFlags::ARMED_AWAY, PartitionStatusFlags::ARMED_AWAY),
    (IconLedFlags::AC_PRESENT, PartitionStatusFlags::AC_PRESENT),
    (IconLedFlags::BYPASS, PartitionStatusFlags::ARMED_BYPASS),
    (IconLedFlags::CHIME, PartitionStatusFlags::CHIME),
    (IconLedFlags::ARMED_ZERO_ENTRY_DELAY, PartitionStatusFlags::ARMED_ZERO_ENTRY_DELAY),
    (IconLedFlags::ALARM_FIRE_ZONE, PartitionStatusFlags::ALARM_FIRE_ZONE),
    (IconLedFlags::SYSTEM_TROUBLE, PartitionStatusFlags::TROUBLE),
    (IconLedFlags::READY, PartitionStatusFlags::READY),
    (IconLedFlags::FIRE, PartitionStatusFlags::FIRE),
    (IconLedFlags::LOW_BATTERY, PartitionStatusFlags::BAT_TROUBLE),
    (IconLedFlags::ARMED_STAY, PartitionStatusFlags::ARMED_STAY),
];

impl IconLedFlags {
    /// Parse the 4-digit hex icon field (e.g., "1C08").
    pub fn from_hex(s: &str) -> Option<Self> {
        u16::from_str_radix(s, 16).ok().map(Self::from_bits_retain)
    }

    /// Render as 4 uppercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("{:04X}", self.bits())
    }

    /// Partition flags this icon field reports on and off.
    pub fn partition_flags(&self) -> (PartitionStatusFlags, PartitionStatusFlags) {
        let mut on = PartitionStatusFlags::empty();
        let mut off = PartitionStatusFlags::empty();
        for (icon, flag) in &ICON_TO_PARTITION {
            if self.contains(*icon) {
                on |= *flag;
            } else {
                off |= *flag;
            }
        }
        (on, off)
    }
}

bitflags! {
    /// DSC keypad LED byte carried in `510`/`511` frames.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DscLedFlags: u8 {
        const READY     = 1 << 0;
        const ARMED     = 1 << 1;
        const MEMORY    = 1 << 2;
        const BYPASS    = 1 << 3;
        const TROUBLE   = 1 << 4;
        const PROGRAM   = 1 << 5;
        const FIRE      = 1 << 6;
        const BACKLIGHT = 1 << 7;
    }
}

const DSC_LED_TO_PARTITION: [(DscLedFlags, PartitionStatusFlags); 6] = [
    (DscLedFlags::READY, PartitionStatusFlags::READY),
    (DscLedFlags::ARMED, PartitionStatusFlags::ARMED),
    (DscLedFlags::MEMORY, PartitionStatusFlags::ALARM_IN_MEMORY),
    (DscLedFlags::BYPASS, PartitionStatusFlags::ARMED_BYPASS),
    (DscLedFlags::TROUBLE, PartitionStatusFlags::TROUBLE),
    (DscLedFlags::FIRE, PartitionStatusFlags::FIRE),
];

impl DscLedFlags {
    pub fn from_hex(s: &str) -> Option<Self> {
        u8::from_str_radix(s, 16).ok().map(Self::from_bits_retain)
    }

    pub fn to_hex(&self) -> String {
        format!("{:02X}", self.bits())
    }

    /// Partition flags this LED byte reports on and off.
    pub fn partition_flags(&self) -> (PartitionStatusFlags, PartitionStatusFlags) {
        let mut on = PartitionStatusFlags::empty();
        let mut off = PartitionStatusFlags::empty();
        for (led, flag) in &DSC_LED_TO_PARTITION {
            if self.contains(*led) {
                on |= *flag;
            } else {
                off |= *flag;
            }
        }
        (on, off)
    }
}

fn hex_chunks<'a>(data: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    // Only whole 4-character groups carry a value; a trailing remainder is ignored.
    let whole = data.len() - data.len() % 4;
    (0..whole).step_by(4).filter_map(move |i| data.get(i..i + 4))
}

fn swap_bytes(chunk: &str) -> String {
    format!("{}{}", &chunk[2..4], &chunk[0..2])
}

/// Decode a Honeywell zone bitfield dump (`%01` or `%04` data).
///
/// Entry `i` of the result is zone `i + 1`; `true` means open/faulted (or bypassed).
/// The result is at least `zone_capacity` long.
pub fn decode_zone_bitfield(data: &str, zone_capacity: u32) -> Result<Vec<bool>> {
    if !data.is_ascii() || !data.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TpiError::frame(data, "zone bitfield is not hex"));
    }

    let big_endian: String = hex_chunks(data).map(swap_bytes).collect();
    let mut bits = String::with_capacity(big_endian.len() * 4);
    for c in big_endian.chars() {
        let nibble = c.to_digit(16).unwrap_or(0);
        bits.push_str(&format!("{:04b}", nibble));
    }

    // Parsed as one integer: leading zeros vanish and the width is restored to capacity.
    let significant = bits.trim_start_matches('0');
    let width = zone_capacity as usize;
    let padded = if significant.len() < width {
        format!("{}{}", "0".repeat(width - significant.len()), significant)
    } else {
        significant.to_string()
    };

    Ok(padded
        .as_bytes()
        .chunks_exact(16)
        .flat_map(|group| group.iter().rev().map(|b| *b == b'1'))
        .collect())
}

/// Encode faulted zones as a zone bitfield dump, one byte per 8 zones, zone `n` at
/// bit `(n - 1) % 8` of byte `(n - 1) / 8`.
pub fn encode_zone_bitfield(zones: &[u32], zone_count: u32) -> String {
    let mut bytes = vec![0u8; zone_count.div_ceil(8) as usize];
    for &zone in zones {
        if zone == 0 || zone > zone_count {
            continue;
        }
        let idx = (zone - 1) as usize;
        bytes[idx / 8] |= 1 << (idx % 8);
    }
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

/// Decoded state of one zone timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTimer {
    /// Zone is currently open (0xFFFF)
    Open,
    /// Zone closed this many seconds ago
    Closed { seconds: u32 },
    /// Zone closed longer ago than the timer can represent (0x0000)
    ClosedLongAgo,
}

impl ZoneTimer {
    pub fn from_raw(value: u16) -> Self {
        match value {
            0xFFFF => Self::Open,
            0x0000 => Self::ClosedLongAgo,
            v => Self::Closed {
                seconds: (65536 - v as u32) * ZONE_TIMER_TICK_SECS,
            },
        }
    }

    /// Seconds since the zone last faulted; 0 while open.
    pub fn seconds(&self) -> u32 {
        match self {
            Self::Open => 0,
            Self::Closed { seconds } => *seconds,
            Self::ClosedLongAgo => ZONE_TIMER_MAX_SECS,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Decode a zone timer dump (`%FF` or `615` data): 16-bit little-endian values.
pub fn decode_zone_timers(data: &str) -> Result<Vec<ZoneTimer>> {
    if !data.is_ascii() {
        return Err(TpiError::frame(data, "zone timers are not hex"));
    }
    hex_chunks(data)
        .map(|chunk| {
            u16::from_str_radix(&swap_bytes(chunk), 16)
                .map(ZoneTimer::from_raw)
                .map_err(|_| TpiError::frame(data, format!("bad zone timer {chunk:?}")))
        })
        .collect()
}

/// Raw timer value for a zone: open, or closed `elapsed_secs` ago.
pub fn zone_timer_value(open: bool, elapsed_secs: u64) -> u16 {
    if open {
        return 0xFFFF;
    }
    let ticks = (elapsed_secs / ZONE_TIMER_TICK_SECS as u64).clamp(2, 65536);
    (65536 - ticks) as u16
}

/// Encode raw timer values with the same byte order the decoder expects.
pub fn encode_zone_timers(values: &[u16]) -> String {
    values
        .iter()
        .map(|v| format!("{:02X}{:02X}", v & 0xFF, v >> 8))
        .collect()
}
