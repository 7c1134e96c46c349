// MIT License - Copyright (c) 2021 TJForc
// Contact-ID event decoding for realtime `%03` frames

use serde::Serialize;

use crate::error::{Result, TpiError};

/// First digit of a Contact-ID report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CidQualifier {
    /// 1 - New Event or Opening
    NewEvent,
    /// 3 - New Restore or Closing
    Restore,
    /// 6 - Previously reported condition still present
    StillPresent,
}

impl CidQualifier {
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '1' => Some(Self::NewEvent),
            '3' => Some(Self::Restore),
            '6' => Some(Self::StillPresent),
            _ => None,
        }
    }

    pub fn as_digit(&self) -> char {
        match self {
            Self::NewEvent => '1',
            Self::Restore => '3',
            Self::StillPresent => '6',
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NewEvent => "New Event or Opening",
            Self::Restore => "New Restore or Closing",
            Self::StillPresent => "Previously reported condition still present",
        }
    }
}

/// Whether the last field of a report names a zone or a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CidEventKind {
    Zone,
    User,
}

/// Entry in the Contact-ID event table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CidEventDef {
    pub code: u16,
    pub label: &'static str,
    pub kind: CidEventKind,
}

const fn zone(code: u16, label: &'static str) -> CidEventDef {
    CidEventDef { code, label, kind: CidEventKind::Zone }
}

const fn user(code: u16, label: &'static str) -> CidEventDef {
    CidEventDef { code, label, kind: CidEventKind::User }
}

/// Contact-ID event codes reported through the TPI.
pub const CID_EVENTS: &[CidEventDef] = &[
    zone(100, "Medical Alert"),
    zone(101, "Personal Emergency"),
    zone(102, "Failure to Report In"),
    zone(110, "Fire Alarm"),
    zone(111, "Smoke Alarm"),
    zone(113, "Water Flow Alarm"),
    zone(114, "Heat Alarm"),
    zone(117, "Flame Alarm"),
    zone(118, "Near Alarm"),
    zone(120, "Panic Alarm"),
    user(121, "Duress"),
    zone(122, "Alarm, 24-hour Silent"),
    zone(123, "Alarm, 24-hour Audible"),
    zone(124, "Duress - Access granted"),
    zone(125, "Duress - Egress granted"),
    zone(130, "Burglary"),
    zone(131, "Alarm, Perimeter"),
    zone(132, "Alarm, Interior"),
    zone(133, "24 Hour (Safe)"),
    zone(134, "Alarm, Entry/Exit"),
    zone(135, "Alarm, Day/Night"),
    zone(136, "Alarm, Outdoor"),
    zone(137, "Alarm, Tamper"),
    zone(139, "Intrusion Verifier"),
    zone(140, "General Alarm"),
    zone(150, "Alarm, 24-Hour Auxiliary"),
    zone(154, "Water Leakage"),
    zone(158, "High Temperature"),
    zone(159, "Low Temperature"),
    zone(162, "Carbon Monoxide Detected"),
    zone(301, "AC Loss"),
    zone(302, "Low System Battery"),
    zone(305, "System Reset"),
    zone(309, "Battery Test Failure"),
    zone(333, "Expansion Module Failure"),
    zone(344, "RF Receiver Jam Detected"),
    zone(350, "Communication Trouble"),
    zone(351, "Telco 1 Fault"),
    zone(373, "Fire Loop Trouble"),
    zone(380, "Sensor Trouble"),
    zone(381, "Loss of Supervision - RF"),
    zone(383, "Sensor Tamper"),
    zone(384, "RF Low Battery"),
    user(400, "Open/Close"),
    user(401, "Open/Close by User"),
    user(403, "Automatic Open/Close"),
    user(406, "Cancel"),
    user(407, "Remote Arm/Disarm"),
    user(408, "Quick Arm"),
    user(409, "Keyswitch Open/Close"),
    user(441, "Armed STAY"),
    user(442, "Keyswitch Armed STAY"),
    user(451, "Early Open/Close"),
    user(454, "Failed to Close"),
    user(461, "Wrong Code Entry"),
    zone(570, "Zone/Sensor Bypass"),
    zone(601, "Manual Trigger Test Report"),
    zone(602, "Periodic Test Report"),
    user(607, "Walk Test Mode"),
    user(627, "Program Mode Entry"),
    user(628, "Program Mode Exit"),
];

/// Look up a Contact-ID event code.
pub fn lookup_event(code: u16) -> Option<&'static CidEventDef> {
    CID_EVENTS.iter().find(|def| def.code == code)
}

/// A decoded realtime Contact-ID report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CidEvent {
    pub qualifier: CidQualifier,
    pub code: u16,
    /// Table label, or `"Unknown"` for codes outside the table
    pub label: &'static str,
    pub kind: CidEventKind,
    pub partition: u32,
    /// Zone or user number depending on `kind`
    pub zone_or_user: u32,
}

impl CidEvent {
    /// Parse `QEEEPPZZZ` (qualifier, event, partition, zone/user).
    pub fn parse(data: &str) -> Result<Self> {
        let data = data.trim();
        if data.len() < 9 || !data.is_ascii() {
            return Err(TpiError::frame(data, "CID report must be 9 digits"));
        }

        let qualifier = data
            .chars()
            .next()
            .and_then(CidQualifier::from_digit)
            .ok_or_else(|| TpiError::frame(data, "unknown CID qualifier"))?;
        let digits = |range: std::ops::Range<usize>, what: &str| -> Result<u32> {
            data[range]
                .parse::<u32>()
                .map_err(|_| TpiError::frame(data, format!("bad CID {what}")))
        };
        let code = digits(1..4, "event code")? as u16;
        let partition = digits(4..6, "partition")?;
        let zone_or_user = digits(6..9, "zone/user")?;

        let (label, kind) = match lookup_event(code) {
            Some(def) => (def.label, def.kind),
            None => ("Unknown", CidEventKind::Zone),
        };

        Ok(Self {
            qualifier,
            code,
            label,
            kind,
            partition,
            zone_or_user,
        })
    }

    /// Render back to the 9-digit wire form.
    pub fn to_wire(&self) -> String {
        format!(
            "{}{:03}{:02}{:03}",
            self.qualifier.as_digit(),
            self.code,
            self.partition,
            self.zone_or_user
        )
    }

    /// Whether this report marks a user arming the partition.
    pub fn is_user_closing(&self) -> bool {
        self.kind == CidEventKind::User
            && self.qualifier == CidQualifier::Restore
            && matches!(self.code, 400..=409 | 441 | 442)
    }

    /// Whether this report marks a user disarming the partition.
    pub fn is_user_opening(&self) -> bool {
        self.kind == CidEventKind::User
            && self.qualifier == CidQualifier::NewEvent
            && matches!(self.code, 400..=409 | 441 | 442)
    }
}
