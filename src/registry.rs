// MIT License - Copyright (c) 2021 TJForc
// Static code tables: wire code -> handler, callback and status template

use std::fmt;

use crate::config::Dialect;
use crate::devices::{PartitionDelta, PartitionStatusFlags as P, ZoneDelta, ZoneStatusFlags as Z};

/// What to do with a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Login prompt: reply with the password
    Login,
    LoginSuccess,
    LoginFailure,
    LoginTimeout,
    /// Honeywell `%00` keypad line
    KeypadUpdate,
    /// DSC `510` keypad LED byte
    KeypadLedState,
    /// DSC `511` keypad LED flash byte
    KeypadLedFlash,
    /// Honeywell `%01` zone bitfield
    ZoneStateChange,
    /// Honeywell `%02` partition status codes
    PartitionStateChange,
    /// Uno `%04` bypassed zone bitfield
    ZoneBypassUpdate,
    /// Uno `%05` host information
    HostInfo,
    RealtimeCidEvent,
    ZoneTimerDump,
    /// Keepalive / command acknowledgement without a result code
    PollResponse,
    /// Honeywell `^CC,EE$` acknowledgement carrying a result code
    CommandResponse,
    /// DSC `501`
    CommandResponseError,
    /// DSC `502`
    SystemError,
    /// DSC `601`..`610`: apply the zone template to the zone in the data
    ZoneUpdate,
    /// DSC `650`..`674`: apply the partition template to the partition in the data
    PartitionUpdate,
    /// DSC `652`: armed, with the arm mode in the data
    PartitionArmed,
    /// DSC `700`..`702`: partition armed by a user
    UserClosing,
    /// DSC `750`..`751`: partition disarmed by a user
    UserOpening,
    /// DSC `800`..`841`: system-wide status applied to every partition
    GeneralUpdate,
    /// DSC `849` verbose trouble bitmask
    VerboseTrouble,
}

/// Which registered callback receives a handler's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    LoginSuccess,
    LoginFailure,
    LoginTimeout,
    KeypadUpdate,
    ZoneStateChange,
    PartitionStateChange,
    RealtimeCidEvent,
    ZoneTimerDump,
    ZoneBypassUpdate,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 9] = [
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::LoginTimeout,
        Self::KeypadUpdate,
        Self::ZoneStateChange,
        Self::PartitionStateChange,
        Self::RealtimeCidEvent,
        Self::ZoneTimerDump,
        Self::ZoneBypassUpdate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::LoginTimeout => "login_timeout",
            Self::KeypadUpdate => "keypad_update",
            Self::ZoneStateChange => "zone_state_change",
            Self::PartitionStateChange => "partition_state_change",
            Self::RealtimeCidEvent => "realtime_cid_event",
            Self::ZoneTimerDump => "zone_timer_dump",
            Self::ZoneBypassUpdate => "zone_bypass_update",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseType {
    pub name: &'static str,
    pub handler: Handler,
    pub callback: Option<CallbackKind>,
    pub partition_delta: Option<PartitionDelta>,
    pub zone_delta: Option<ZoneDelta>,
}

impl ResponseType {
    const fn new(name: &'static str, handler: Handler, callback: Option<CallbackKind>) -> Self {
        Self {
            name,
            handler,
            callback,
            partition_delta: None,
            zone_delta: None,
        }
    }

    const fn partition(mut self, delta: PartitionDelta) -> Self {
        self.partition_delta = Some(delta);
        self
    }

    const fn zone(mut self, delta: ZoneDelta) -> Self {
        self.zone_delta = Some(delta);
        self
    }
}

use CallbackKind as C;
use Handler as H;

const ARMED_ANY: P = P::ARMED.union(P::ARMED_MODES).union(P::ARMED_ZERO_ENTRY_DELAY);

/// Look up a decoded code in the table for `dialect`.
pub fn lookup(dialect: Dialect, code: &str) -> Option<ResponseType> {
    match dialect {
        Dialect::Honeywell => honeywell(code),
        Dialect::Uno => uno(code).or_else(|| honeywell(code)),
        Dialect::Dsc => dsc(code),
    }
}

fn honeywell(code: &str) -> Option<ResponseType> {
    let entry = match code {
        "Login:" => ResponseType::new("Login Prompt", H::Login, None),
        "OK" => ResponseType::new("Login Success", H::LoginSuccess, Some(C::LoginSuccess)),
        "FAILED" => ResponseType::new("Login Failure", H::LoginFailure, Some(C::LoginFailure)),
        "Timed Out!" => ResponseType::new("Login Timeout", H::LoginTimeout, Some(C::LoginTimeout)),
        "%00" => ResponseType::new("Virtual Keypad Update", H::KeypadUpdate, Some(C::KeypadUpdate)),
        "%01" => ResponseType::new("Zone State Change", H::ZoneStateChange, Some(C::ZoneStateChange)),
        "%02" => ResponseType::new(
            "Partition State Change",
            H::PartitionStateChange,
            Some(C::PartitionStateChange),
        ),
        "%03" => ResponseType::new("Realtime CID Event", H::RealtimeCidEvent, Some(C::RealtimeCidEvent)),
        "%FF" => ResponseType::new("Zone Timer Dump", H::ZoneTimerDump, Some(C::ZoneTimerDump)),
        "^00" => ResponseType::new("Poll", H::PollResponse, None),
        "^01" => ResponseType::new("Change Default Partition", H::CommandResponse, None),
        "^02" => ResponseType::new("Dump Zone Timers", H::CommandResponse, None),
        "^03" => ResponseType::new("Keypress to Specific Partition", H::CommandResponse, None),
        _ => return None,
    };
    Some(entry)
}

fn uno(code: &str) -> Option<ResponseType> {
    let entry = match code {
        "%04" => ResponseType::new("Zone Bypass State", H::ZoneBypassUpdate, Some(C::ZoneBypassUpdate)),
        "%05" => ResponseType::new("Host Information", H::HostInfo, None),
        "^04" => ResponseType::new("Zone Bypass", H::CommandResponse, None),
        "^05" => ResponseType::new("Zone Unbypass", H::CommandResponse, None),
        "^08" => ResponseType::new("Stay Arm", H::CommandResponse, None),
        "^09" => ResponseType::new("Away Arm", H::CommandResponse, None),
        "^0C" => ResponseType::new("Initial State Dump", H::CommandResponse, None),
        "^0D" => ResponseType::new("Host Information Request", H::CommandResponse, None),
        "^10" => ResponseType::new("Toggle Chime", H::CommandResponse, None),
        "^11" => ResponseType::new("Panic", H::CommandResponse, None),
        "^12" => ResponseType::new("Disarm", H::CommandResponse, None),
        _ => return None,
    };
    Some(entry)
}

fn dsc(code: &str) -> Option<ResponseType> {
    let zone = |name: &'static str, delta: ZoneDelta| {
        ResponseType::new(name, H::ZoneUpdate, Some(C::ZoneStateChange)).zone(delta)
    };
    let part = |name: &'static str, delta: PartitionDelta| {
        ResponseType::new(name, H::PartitionUpdate, Some(C::PartitionStateChange)).partition(delta)
    };
    let general = |name: &'static str, delta: PartitionDelta| {
        ResponseType::new(name, H::GeneralUpdate, Some(C::KeypadUpdate)).partition(delta)
    };

    let entry = match code {
        // 505 is remapped by the codec according to its sub-status digit
        "5050" => ResponseType::new("Login Failure", H::LoginFailure, Some(C::LoginFailure)),
        "5051" => ResponseType::new("Login Success", H::LoginSuccess, Some(C::LoginSuccess)),
        "5052" => ResponseType::new("Login Timeout", H::LoginTimeout, Some(C::LoginTimeout)),
        "5053" => ResponseType::new("Login Prompt", H::Login, None),

        "500" => ResponseType::new("Command Acknowledge", H::PollResponse, None),
        "501" => ResponseType::new("Command Error", H::CommandResponseError, None),
        "502" => ResponseType::new("System Error", H::SystemError, None),
        "510" => ResponseType::new("Keypad LED State", H::KeypadLedState, Some(C::KeypadUpdate)),
        "511" => ResponseType::new("Keypad LED Flash State", H::KeypadLedFlash, None),
        "615" => ResponseType::new("Envisalink Zone Timer Dump", H::ZoneTimerDump, Some(C::ZoneTimerDump)),

        "601" => zone("Zone Alarm", ZoneDelta::new().set(Z::ALARM)),
        "602" => zone("Zone Alarm Restore", ZoneDelta::new().clear(Z::ALARM)),
        "603" => zone("Zone Tamper", ZoneDelta::new().set(Z::TAMPER)),
        "604" => zone("Zone Tamper Restore", ZoneDelta::new().clear(Z::TAMPER)),
        "605" => zone("Zone Fault", ZoneDelta::new().set(Z::FAULT)),
        "606" => zone("Zone Fault Restore", ZoneDelta::new().clear(Z::FAULT)),
        "609" => zone("Zone Open", ZoneDelta::new().set(Z::OPEN)),
        "610" => zone("Zone Restored", ZoneDelta::new().clear(Z::OPEN)),

        "650" => part("Partition Ready", PartitionDelta::new().set(P::READY).alpha("Ready")),
        "651" => part("Partition Not Ready", PartitionDelta::new().clear(P::READY).alpha("Not Ready")),
        "652" => ResponseType::new("Partition Armed", H::PartitionArmed, Some(C::PartitionStateChange)),
        "653" => part(
            "Partition Ready - Force Arming Enabled",
            PartitionDelta::new().set(P::READY).alpha("Ready - Force Arm"),
        ),
        "654" => part("Partition In Alarm", PartitionDelta::new().set(P::ALARM).alpha("In Alarm")),
        "655" => part(
            "Partition Disarmed",
            PartitionDelta::new()
                .clear(ARMED_ANY.union(P::ALARM).union(P::DELAYS))
                .alpha("Disarmed"),
        ),
        "656" => part(
            "Exit Delay in Progress",
            PartitionDelta::new().set(P::EXIT_DELAY).alpha("Exit Delay In Progress"),
        ),
        "657" => part(
            "Entry Delay in Progress",
            PartitionDelta::new().set(P::ENTRY_DELAY).alpha("Entry Delay in Progress"),
        ),
        "658" => part("Keypad Lock-out", PartitionDelta::new().alpha("Keypad Lockout")),
        "659" => part("Partition Failed to Arm", PartitionDelta::new().alpha("Failed to Arm")),
        "660" => part("PGM Output in Progress", PartitionDelta::new().alpha("PGM Output in Progress")),
        "663" => part("Chime Enabled", PartitionDelta::new().set(P::CHIME)),
        "664" => part("Chime Disabled", PartitionDelta::new().clear(P::CHIME)),
        "670" => part("Invalid Access Code", PartitionDelta::new().alpha("Invalid Access Code")),
        "671" => part("Function Not Available", PartitionDelta::new().alpha("Function Not Available")),
        "672" => part("Failure to Arm", PartitionDelta::new().alpha("Fail to Arm")),
        "673" => part("Partition is Busy", PartitionDelta::new().alpha("Partition Busy")),
        "674" => part("System Arming in Progress", PartitionDelta::new().alpha("System Arming in Progress")),

        "700" => ResponseType::new("User Closing", H::UserClosing, Some(C::PartitionStateChange)),
        "701" => ResponseType::new("Special Closing", H::UserClosing, Some(C::PartitionStateChange)),
        "702" => ResponseType::new("Partial Closing", H::UserClosing, Some(C::PartitionStateChange)),
        "750" => ResponseType::new("User Opening", H::UserOpening, Some(C::PartitionStateChange)),
        "751" => ResponseType::new("Special Opening", H::UserOpening, Some(C::PartitionStateChange)),

        "800" => general("Panel Battery Trouble", PartitionDelta::new().set(P::BAT_TROUBLE)),
        "801" => general("Panel Battery Trouble Restore", PartitionDelta::new().clear(P::BAT_TROUBLE)),
        "802" => general("Panel AC Trouble", PartitionDelta::new().clear(P::AC_PRESENT)),
        "803" => general("Panel AC Restore", PartitionDelta::new().set(P::AC_PRESENT)),
        "840" => general("Trouble LED ON", PartitionDelta::new().set(P::TROUBLE)),
        "841" => general("Trouble LED OFF", PartitionDelta::new().clear(P::TROUBLE)),
        "849" => ResponseType::new("Verbose Trouble Status", H::VerboseTrouble, Some(C::KeypadUpdate)),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_honeywell_lookup() {
        let entry = lookup(Dialect::Honeywell, "%00").unwrap();
        assert_eq!(entry.handler, Handler::KeypadUpdate);
        assert_eq!(entry.callback, Some(CallbackKind::KeypadUpdate));

        let entry = lookup(Dialect::Honeywell, "Login:").unwrap();
        assert_eq!(entry.handler, Handler::Login);
        assert_eq!(entry.callback, None);

        assert!(lookup(Dialect::Honeywell, "%04").is_none());
        assert!(lookup(Dialect::Honeywell, "%99").is_none());
    }

    #[test]
    fn test_uno_extends_honeywell() {
        assert_eq!(
            lookup(Dialect::Uno, "%04").unwrap().handler,
            Handler::ZoneBypassUpdate
        );
        assert_eq!(lookup(Dialect::Uno, "%02").unwrap().handler, Handler::PartitionStateChange);
        assert_eq!(lookup(Dialect::Uno, "^12").unwrap().handler, Handler::CommandResponse);
    }

    #[test]
    fn test_dsc_login_substatus() {
        assert_eq!(lookup(Dialect::Dsc, "5050").unwrap().handler, Handler::LoginFailure);
        assert_eq!(lookup(Dialect::Dsc, "5051").unwrap().handler, Handler::LoginSuccess);
        assert_eq!(lookup(Dialect::Dsc, "5052").unwrap().handler, Handler::LoginTimeout);
        assert_eq!(lookup(Dialect::Dsc, "5053").unwrap().handler, Handler::Login);
        assert!(lookup(Dialect::Dsc, "505").is_none());
    }

    #[test]
    fn test_dsc_templates() {
        let entry = lookup(Dialect::Dsc, "609").unwrap();
        assert_eq!(entry.handler, Handler::ZoneUpdate);
        assert_eq!(entry.zone_delta.unwrap().set, Z::OPEN);

        let entry = lookup(Dialect::Dsc, "655").unwrap();
        let delta = entry.partition_delta.unwrap();
        assert!(delta.clear.contains(P::ARMED_AWAY | P::EXIT_DELAY | P::ARMED));
        assert_eq!(delta.alpha, Some("Disarmed"));

        let entry = lookup(Dialect::Dsc, "802").unwrap();
        assert_eq!(entry.handler, Handler::GeneralUpdate);
        assert_eq!(entry.partition_delta.unwrap().clear, P::AC_PRESENT);
    }

    #[test]
    fn test_callback_names() {
        assert_eq!(CallbackKind::ZoneTimerDump.to_string(), "zone_timer_dump");
        assert_eq!(CallbackKind::ALL.len(), 9);
    }
}
