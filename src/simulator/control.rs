// MIT License - Copyright (c) 2021 TJForc
// Line-oriented test-control interface for the panel simulator

use std::fmt;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, TpiError};
use crate::simulator::SimulatorHandle;
use crate::transport::{self, SERVER_TERMINATOR};

/// One control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// `write:<raw>` - send a raw line to the connected client
    Write(String),
    /// `fault:<zones>` - comma separated zone numbers
    Fault(Vec<u32>),
    /// `clear:<zones>`
    Clear(Vec<u32>),
    ArmAway,
    ArmStay,
    Disarm,
    /// `ready:<partition>`
    Ready(u32),
    ZoneInfo,
    /// Drop the connected client
    Disconnect,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let invalid = || TpiError::InvalidControlCommand {
            line: line.to_string(),
        };
        let (name, arg) = match line.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (line, None),
        };

        let command = match (name, arg) {
            ("write", Some(raw)) => Self::Write(raw.to_string()),
            ("fault", Some(zones)) => Self::Fault(parse_zones(zones).ok_or_else(invalid)?),
            ("clear", Some(zones)) => Self::Clear(parse_zones(zones).ok_or_else(invalid)?),
            ("arm_away", None) => Self::ArmAway,
            ("arm_stay", None) => Self::ArmStay,
            ("disarm", None) => Self::Disarm,
            ("ready", Some(p)) => Self::Ready(p.trim().parse().map_err(|_| invalid())?),
            ("zoneinfo", None) => Self::ZoneInfo,
            ("disconnect", None) => Self::Disconnect,
            _ => return Err(invalid()),
        };
        Ok(command)
    }
}

fn parse_zones(s: &str) -> Option<Vec<u32>> {
    let zones: Option<Vec<u32>> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|z| !z.is_empty())
        .map(|z| z.parse().ok())
        .collect();
    zones.filter(|z| !z.is_empty())
}

/// Reply to a control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Ok,
    Ready { partition: u32, ready: bool },
    /// Fault state of every zone, in zone order
    ZoneInfo(Vec<(u32, bool)>),
    Error(String),
}

impl fmt::Display for ControlReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Ready { partition, ready } => write!(f, "ready:{partition}:{ready}"),
            Self::ZoneInfo(zones) => {
                let states: Vec<String> = zones
                    .iter()
                    .map(|(zone, faulted)| format!("{zone}={}", u8::from(*faulted)))
                    .collect();
                write!(f, "zoneinfo:{}", states.join(" "))
            }
            Self::Error(msg) => write!(f, "error:{msg}"),
        }
    }
}

/// Serve the control protocol: one request per line, one reply line each.
pub(crate) async fn serve(
    listener: TcpListener,
    handle: SimulatorHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Control interface listening on {}", addr);
    }
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.changed() => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!("Control connection from {}", peer);
                let handle = handle.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = control_client(stream, handle, shutdown).await {
                        warn!("Control connection error: {}", e);
                    }
                });
            }
            Err(e) => warn!("Control accept failed: {}", e),
        }
    }
    debug!("Control interface stopped");
}

async fn control_client(
    stream: tokio::net::TcpStream,
    handle: SimulatorHandle,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (mut reader, writer) = transport::split(stream, SERVER_TERMINATOR);
    loop {
        let line = tokio::select! {
            line = reader.next_line() => line?,
            _ = shutdown.changed() => None,
        };
        let Some(line) = line else {
            break;
        };
        let reply = match ControlCommand::parse(&line) {
            Ok(command) => handle
                .control(command)
                .await
                .unwrap_or_else(|e| ControlReply::Error(e.to_string())),
            Err(e) => ControlReply::Error(e.to_string()),
        };
        writer.send_line(&reply.to_string()).await?;
    }
    Ok(())
}
