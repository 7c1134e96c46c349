// MIT License - Copyright (c) 2021 TJForc
// Frame codec: wire lines <-> events and commands

pub mod bitfield;
pub mod dsc;
pub mod honeywell;

use crate::config::Dialect;
use crate::error::Result;
use crate::registry::{self, CallbackKind, Handler, ResponseType};

/// A decoded inbound frame.
///
/// `response` is `None` when the code has no registry entry; such events are
/// logged and dropped by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub code: String,
    pub data: String,
    pub response: Option<ResponseType>,
}

impl Event {
    pub fn new(dialect: Dialect, code: impl Into<String>, data: impl Into<String>) -> Self {
        let code = code.into();
        let response = registry::lookup(dialect, &code);
        Self {
            code,
            data: data.into(),
            response,
        }
    }

    pub fn handler(&self) -> Option<Handler> {
        self.response.map(|r| r.handler)
    }

    pub fn callback(&self) -> Option<CallbackKind> {
        self.response.and_then(|r| r.callback)
    }

    pub fn name(&self) -> &'static str {
        self.response.map(|r| r.name).unwrap_or("Unknown")
    }
}

/// An outbound request, translated by the dialect codec into wire lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    KeepAlive,
    DumpZoneTimers,
    /// Reply to the login prompt
    Login { password: String },
    ChangeDefaultPartition { partition: u32 },
    /// Keys sent to a partition, or raw to the default partition when `partition` is `None`
    Keypress { partition: Option<u32>, keys: String },
    ArmAway { code: String, partition: u32 },
    ArmStay { code: String, partition: u32 },
    ArmMax { code: String, partition: u32 },
    Disarm { code: String, partition: u32 },
    BypassZone { zone: u32 },
    UnbypassZone { zone: u32 },
    /// DSC: request a full status report
    StatusReport,
    /// Uno: request the initial state dump
    InitialStateDump,
    /// Uno: request host information
    HostInfo,
    /// A code and payload passed through as-is
    Raw { code: String, data: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeepAlive => "keepalive",
            Self::DumpZoneTimers => "dump zone timers",
            Self::Login { .. } => "login",
            Self::ChangeDefaultPartition { .. } => "change default partition",
            Self::Keypress { .. } => "keypress",
            Self::ArmAway { .. } => "arm away",
            Self::ArmStay { .. } => "arm stay",
            Self::ArmMax { .. } => "arm max",
            Self::Disarm { .. } => "disarm",
            Self::BypassZone { .. } => "bypass zone",
            Self::UnbypassZone { .. } => "unbypass zone",
            Self::StatusReport => "status report",
            Self::InitialStateDump => "initial state dump",
            Self::HostInfo => "host info",
            Self::Raw { .. } => "raw command",
        }
    }
}

/// Per-dialect frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    dialect: Dialect,
}

impl Codec {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Split one received line into individual frames.
    pub fn split_frames<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self.dialect {
            Dialect::Honeywell | Dialect::Uno => honeywell::split_frames(line),
            Dialect::Dsc => vec![line],
        }
    }

    /// Decode a single frame. `logged_in` selects how Honeywell bare text is treated.
    pub fn decode(&self, frame: &str, logged_in: bool) -> Result<Event> {
        match self.dialect {
            Dialect::Honeywell | Dialect::Uno => honeywell::decode(self.dialect, frame, logged_in),
            Dialect::Dsc => dsc::decode(frame),
        }
    }

    /// Translate a command into the wire lines to send, without line terminators.
    pub fn encode(&self, command: &Command) -> Result<Vec<String>> {
        match self.dialect {
            Dialect::Honeywell | Dialect::Uno => honeywell::encode(self.dialect, command),
            Dialect::Dsc => dsc::encode(command),
        }
    }
}
