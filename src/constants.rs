// MIT License - Copyright (c) 2021 TJForc
// Protocol constants and small code tables

/// Default TPI port on the Envisalink module.
pub const DEFAULT_PORT: u16 = 4025;
/// Highest partition number the TPI can address.
pub const MAX_PARTITIONS: u32 = 8;
/// Zone capacity for protocol versions below 4 (EVL-3 and earlier).
pub const ZONES_V3: u32 = 64;
/// Zone capacity for protocol version 4 and later.
pub const ZONES_V4: u32 = 128;
/// Seconds represented by one zone timer tick.
pub const ZONE_TIMER_TICK_SECS: u32 = 5;
/// Largest elapsed time a zone timer can express (65536 ticks).
pub const ZONE_TIMER_MAX_SECS: u32 = 65536 * ZONE_TIMER_TICK_SECS;

/// Honeywell framing characters.
pub const EVENT_SENTINEL: char = '%';
pub const ACK_SENTINEL: char = '^';
pub const FRAME_TERMINATOR: char = '$';

/// Honeywell / Uno TPI command codes.
pub mod honeywell {
    pub const KEEP_ALIVE: &str = "00";
    pub const CHANGE_DEFAULT_PARTITION: &str = "01";
    pub const DUMP_ZONE_TIMERS: &str = "02";
    pub const PARTITION_KEYPRESS: &str = "03";

    // Uno extensions
    pub const BYPASS_ZONE: &str = "04";
    pub const UNBYPASS_ZONE: &str = "05";
    pub const STAY_ARM: &str = "08";
    pub const AWAY_ARM: &str = "09";
    pub const INITIAL_STATE_DUMP: &str = "0C";
    pub const HOST_INFO: &str = "0D";
    pub const TOGGLE_CHIME: &str = "10";
    pub const PANIC: &str = "11";
    pub const DISARM: &str = "12";

    /// Keypad suffixes appended to the user code.
    pub const KEY_DISARM: char = '1';
    pub const KEY_ARM_AWAY: char = '2';
    pub const KEY_ARM_STAY: char = '3';
    pub const KEY_ARM_MAX: char = '4';

    /// Bare-text login exchange.
    pub const LOGIN_PROMPT: &str = "Login:";
    pub const LOGIN_OK: &str = "OK";
    pub const LOGIN_FAILED: &str = "FAILED";
    pub const LOGIN_TIMED_OUT: &str = "Timed Out!";
}

/// DSC TPI command codes.
pub mod dsc {
    pub const KEEP_ALIVE: &str = "000";
    pub const STATUS_REPORT: &str = "001";
    pub const LOGIN: &str = "005";
    pub const DUMP_ZONE_TIMERS: &str = "008";
    pub const SET_TIME: &str = "010";
    pub const OUTPUT_CONTROL: &str = "020";
    pub const ARM_AWAY: &str = "030";
    pub const ARM_STAY: &str = "031";
    pub const ARM_MAX: &str = "032";
    pub const DISARM: &str = "040";
    pub const PANIC: &str = "060";
    pub const KEYPRESS: &str = "071";
    pub const SEND_CODE: &str = "200";

    /// Login prompt/result code; the data digit carries the sub-status.
    pub const LOGIN_STATUS: &str = "505";
}

/// Partition status codes reported by Honeywell `%02` frames (two hex digits each).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStatusCode {
    NotUsed,
    Ready,
    ReadyBypass,
    NotReady,
    ArmedStay,
    ArmedAway,
    ArmedMax,
    ExitEntryDelay,
    InAlarm,
    AlarmInMemory,
}

impl PartitionStatusCode {
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "00" => Some(Self::NotUsed),
            "01" => Some(Self::Ready),
            "02" => Some(Self::ReadyBypass),
            "03" => Some(Self::NotReady),
            "04" => Some(Self::ArmedStay),
            "05" => Some(Self::ArmedAway),
            "06" => Some(Self::ArmedMax),
            "07" => Some(Self::ExitEntryDelay),
            "08" => Some(Self::InAlarm),
            "09" => Some(Self::AlarmInMemory),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotUsed => "00",
            Self::Ready => "01",
            Self::ReadyBypass => "02",
            Self::NotReady => "03",
            Self::ArmedStay => "04",
            Self::ArmedAway => "05",
            Self::ArmedMax => "06",
            Self::ExitEntryDelay => "07",
            Self::InAlarm => "08",
            Self::AlarmInMemory => "09",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NotUsed => "NOT_USED",
            Self::Ready => "READY",
            Self::ReadyBypass => "READY_BYPASS",
            Self::NotReady => "NOT_READY",
            Self::ArmedStay => "ARMED_STAY",
            Self::ArmedAway => "ARMED_AWAY",
            Self::ArmedMax => "ARMED_MAX",
            Self::ExitEntryDelay => "EXIT_ENTRY_DELAY",
            Self::InAlarm => "IN_ALARM",
            Self::AlarmInMemory => "ALARM_IN_MEMORY",
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::ArmedStay | Self::ArmedAway | Self::ArmedMax)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready | Self::ReadyBypass)
    }
}

/// Keypad beep instruction carried in `%00` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeepMode {
    Off,
    Times(u8),
    ContinuousFast,
    ContinuousSlow,
}

impl BeepMode {
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "00" => Some(Self::Off),
            "01" => Some(Self::Times(1)),
            "02" => Some(Self::Times(2)),
            "03" => Some(Self::Times(3)),
            "04" => Some(Self::ContinuousFast),
            "05" => Some(Self::ContinuousSlow),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Times(1) => "beep 1 time",
            Self::Times(2) => "beep 2 times",
            Self::Times(_) => "beep 3 times",
            Self::ContinuousFast => "continuous fast beep",
            Self::ContinuousSlow => "continuous slow beep",
        }
    }

    pub fn is_beeping(&self) -> bool {
        *self != Self::Off
    }
}

/// DSC arm mode digit following the partition number in a `652` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DscArmMode {
    Away,
    Stay,
    ZeroEntryAway,
    ZeroEntryStay,
}

impl DscArmMode {
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Away),
            '1' => Some(Self::Stay),
            '2' => Some(Self::ZeroEntryAway),
            '3' => Some(Self::ZeroEntryStay),
            _ => None,
        }
    }

    pub fn as_digit(&self) -> char {
        match self {
            Self::Away => '0',
            Self::Stay => '1',
            Self::ZeroEntryAway => '2',
            Self::ZeroEntryStay => '3',
        }
    }

    pub fn alpha(&self) -> &'static str {
        match self {
            Self::Away => "Armed Away",
            Self::Stay => "Armed Stay",
            Self::ZeroEntryAway => "Armed Zero Entry Away",
            Self::ZeroEntryStay => "Armed Zero Entry Stay",
        }
    }
}

/// DSC `849` verbose trouble bits, lowest bit first.
pub const DSC_VERBOSE_TROUBLE: [&str; 8] = [
    "Service is Required",
    "AC Power Lost",
    "Telephone Line Fault",
    "Failure to Communicate",
    "Zone/Sensor Fault",
    "Zone/Sensor Tamper",
    "Zone/Sensor Low Battery",
    "Loss of Time",
];

/// DSC `502` system error codes.
pub fn dsc_system_error(code: &str) -> &'static str {
    match code {
        "000" => "No Error",
        "001" => "Receive Buffer Overrun",
        "002" => "Receive Buffer Overflow",
        "003" => "Transmit Buffer Overflow",
        "010" => "Keybus Transmit Buffer Overrun",
        "011" => "Keybus Transmit Time Timeout",
        "012" => "Keybus Transmit Mode Timeout",
        "013" => "Keybus Transmit Keystring Timeout",
        "014" => "Keybus Interface Not Functioning",
        "015" => "Keybus Busy - Attempting to Disarm or Arm with user code",
        "016" => "Keybus Busy - Lockout",
        "017" => "Keybus Busy - Installers Mode",
        "018" => "Keybus Busy - General Busy",
        "020" => "API Command Syntax Error",
        "021" => "API Command Partition Error",
        "022" => "API Command Not Supported",
        "023" => "API System Not Armed",
        "024" => "API System Not Ready to Arm",
        "025" => "API Command Invalid Length",
        "026" => "API User Code not Required",
        "027" => "API Invalid Characters in Command",
        _ => "Unknown Error",
    }
}
