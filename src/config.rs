// MIT License - Copyright (c) 2021 TJForc
// Session configuration

use std::fmt;
use std::str::FromStr;

use crate::constants::{DEFAULT_PORT, MAX_PARTITIONS, ZONES_V3, ZONES_V4};

/// Wire dialect spoken by the Envisalink module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Honeywell Vista panels: `%CC,DATA$` events, `^CC,EE$` acknowledgements
    Honeywell,
    /// DSC PowerSeries panels: fixed-field frames with a two-digit checksum
    Dsc,
    /// Envisalink Uno: Honeywell framing plus bypass and direct arm commands
    Uno,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Honeywell => "honeywell",
            Self::Dsc => "dsc",
            Self::Uno => "uno",
        }
    }

    /// Whether frames use Honeywell sentinel framing.
    pub fn is_honeywell_family(&self) -> bool {
        matches!(self, Self::Honeywell | Self::Uno)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "honeywell" => Ok(Self::Honeywell),
            "dsc" => Ok(Self::Dsc),
            "uno" => Ok(Self::Uno),
            other => Err(format!("unknown dialect: {other}")),
        }
    }
}

/// Zone capacity for an Envisalink protocol version.
pub fn zone_capacity(protocol_version: u8) -> u32 {
    if protocol_version < 4 { ZONES_V3 } else { ZONES_V4 }
}

/// Configuration for a TPI client session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Envisalink host name or IP address
    pub host: String,
    /// TPI port (default: 4025)
    pub port: u16,
    pub dialect: Dialect,
    /// Web user name; the TPI itself only checks the password
    pub username: String,
    /// TPI password (default: "user")
    pub password: String,
    /// Keepalive interval in milliseconds (default: 30000)
    pub keepalive_interval_ms: u64,
    /// Zone timer dump interval in milliseconds; 0 disables (default: 0)
    pub zone_timer_dump_interval_ms: u64,
    /// Envisalink protocol version; 4 and later report 128 zones (default: 3)
    pub protocol_version: u8,
    /// Number of partitions tracked (default: 8)
    pub partitions: u32,
    /// Delay before reconnecting after a lost connection in milliseconds (default: 5000)
    pub reconnect_delay_ms: u64,
    /// TCP connect timeout in milliseconds (default: 10000)
    pub connect_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_PORT,
            dialect: Dialect::Honeywell,
            username: "user".to_string(),
            password: "user".to_string(),
            keepalive_interval_ms: 30_000,
            zone_timer_dump_interval_ms: 0,
            protocol_version: 3,
            partitions: MAX_PARTITIONS,
            reconnect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Number of zones tracked for the configured protocol version.
    pub fn zones(&self) -> u32 {
        zone_capacity(self.protocol_version)
    }
}

/// Builder for SessionConfig.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keepalive_interval_ms = ms;
        self
    }

    pub fn zone_timer_dump_interval_ms(mut self, ms: u64) -> Self {
        self.config.zone_timer_dump_interval_ms = ms;
        self
    }

    pub fn protocol_version(mut self, version: u8) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn partitions(mut self, partitions: u32) -> Self {
        self.config.partitions = partitions.clamp(1, MAX_PARTITIONS);
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
