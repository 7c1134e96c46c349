// MIT License - Copyright (c) 2021 TJForc
// Error types and TPI command result codes

use std::fmt;

/// Result codes carried in a Honeywell/Uno command acknowledgement (`^CC,EE$`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TpiResponseCode {
    /// 00 - No Error, command accepted
    Success,
    /// 01 - Receive Buffer Overrun (a command is received while another is still being processed)
    BufferOverrun,
    /// 02 - Unknown Command
    UnknownCommand,
    /// 03 - Syntax Error. Data appended to the command is incorrect in some fashion
    SyntaxError,
    /// 04 - Receive Buffer Overflow
    BufferOverflow,
    /// 05 - Receive State Machine Timeout (command not completed within 3 seconds)
    StateMachineTimeout,
}

impl TpiResponseCode {
    /// Parse a two-digit result code (e.g., "00", "02").
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "00" => Some(Self::Success),
            "01" => Some(Self::BufferOverrun),
            "02" => Some(Self::UnknownCommand),
            "03" => Some(Self::SyntaxError),
            "04" => Some(Self::BufferOverflow),
            "05" => Some(Self::StateMachineTimeout),
            _ => None,
        }
    }

    /// Human-readable description of the result code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Success => "No Error",
            Self::BufferOverrun => "Receive Buffer Overrun",
            Self::UnknownCommand => "Unknown Command",
            Self::SyntaxError => "Syntax Error",
            Self::BufferOverflow => "Receive Buffer Overflow",
            Self::StateMachineTimeout => "Receive State Machine Timeout",
        }
    }

    /// The wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "00",
            Self::BufferOverrun => "01",
            Self::UnknownCommand => "02",
            Self::SyntaxError => "03",
            Self::BufferOverflow => "04",
            Self::StateMachineTimeout => "05",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl fmt::Display for TpiResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.as_str(), self.description())
    }
}

/// All errors that can occur in the envisalink-tpi library.
#[derive(Debug, thiserror::Error)]
pub enum TpiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame {line:?}: {reason}")]
    FrameParse { line: String, reason: String },

    #[error("Checksum mismatch in {line:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        line: String,
        expected: String,
        actual: String,
    },

    #[error("Unknown code: {code}")]
    UnknownCode { code: String },

    #[error("No callback registered for {callback}")]
    MissingCallback { callback: &'static str },

    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("Login timed out")]
    LoginTimeout,

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Socket disconnected")]
    Disconnected,

    #[error("Invalid partition: {id} (max: {max})")]
    InvalidPartition { id: u32, max: u32 },

    #[error("Invalid zone: {id} (max: {max})")]
    InvalidZone { id: u32, max: u32 },

    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        operation: &'static str,
        dialect: &'static str,
    },

    #[error("Invalid control command: {line:?}")]
    InvalidControlCommand { line: String },

    #[error("Channel closed")]
    ChannelClosed,
}

impl TpiError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TpiError::Io(_)
                | TpiError::ConnectionTimeout
                | TpiError::Disconnected
                | TpiError::ChannelClosed
        )
    }

    pub(crate) fn frame(line: &str, reason: impl Into<String>) -> Self {
        TpiError::FrameParse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TpiError>;
