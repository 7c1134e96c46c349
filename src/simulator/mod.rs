// MIT License - Copyright (c) 2021 TJForc
// Panel simulator: server side of the TPI for tests and local development

mod actor;
pub mod control;
mod dsc;
mod honeywell;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Dialect;
use crate::constants::{DEFAULT_PORT, MAX_PARTITIONS, ZONES_V3};
use crate::error::{Result, TpiError};
use crate::transport::{self, LineWriter, SERVER_TERMINATOR};

pub use control::{ControlCommand, ControlReply};

use actor::SimulatorActor;

/// Simulator settings. Durations in milliseconds.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub dialect: Dialect,
    pub bind_host: String,
    /// TPI port; 0 picks a free port
    pub port: u16,
    /// Control interface port; `None` disables the TCP control listener
    pub control_port: Option<u16>,
    pub password: String,
    /// User code accepted by keypad arm/disarm sequences
    pub alarm_code: String,
    pub zones: u32,
    pub partitions: u32,
    /// Countdown step during arming
    pub tick_ms: u64,
    /// Period of the Honeywell keypad broadcast
    pub keypad_interval_ms: u64,
    /// Countdown length in ticks
    pub arm_delay_ticks: u32,
    /// Close a client that has not logged in within this; `None` waits forever
    pub login_timeout_ms: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Honeywell,
            bind_host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            control_port: None,
            password: "user".to_string(),
            alarm_code: "1234".to_string(),
            zones: ZONES_V3,
            partitions: 1,
            tick_ms: 1000,
            keypad_interval_ms: 5000,
            arm_delay_ticks: 5,
            login_timeout_ms: None,
        }
    }
}

impl SimulatorConfig {
    pub fn builder() -> SimulatorConfigBuilder {
        SimulatorConfigBuilder::default()
    }

    /// Pull counts and periods back into the range the actor can run with.
    fn normalized(mut self) -> Self {
        self.zones = self.zones.max(8);
        self.partitions = self.partitions.clamp(1, MAX_PARTITIONS);
        self.tick_ms = self.tick_ms.max(1);
        self.keypad_interval_ms = self.keypad_interval_ms.max(1);
        self
    }
}

#[derive(Debug, Default)]
pub struct SimulatorConfigBuilder {
    config: SimulatorConfig,
}

impl SimulatorConfigBuilder {
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.config.dialect = dialect;
        self
    }

    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn control_port(mut self, port: u16) -> Self {
        self.config.control_port = Some(port);
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn alarm_code(mut self, code: impl Into<String>) -> Self {
        self.config.alarm_code = code.into();
        self
    }

    pub fn zones(mut self, zones: u32) -> Self {
        self.config.zones = zones.max(8);
        self
    }

    pub fn partitions(mut self, partitions: u32) -> Self {
        self.config.partitions = partitions.clamp(1, MAX_PARTITIONS);
        self
    }

    pub fn tick_ms(mut self, ms: u64) -> Self {
        self.config.tick_ms = ms.max(1);
        self
    }

    pub fn keypad_interval_ms(mut self, ms: u64) -> Self {
        self.config.keypad_interval_ms = ms.max(1);
        self
    }

    pub fn arm_delay_ticks(mut self, ticks: u32) -> Self {
        self.config.arm_delay_ticks = ticks;
        self
    }

    pub fn login_timeout_ms(mut self, ms: u64) -> Self {
        self.config.login_timeout_ms = Some(ms.max(1));
        self
    }

    pub fn build(self) -> SimulatorConfig {
        self.config
    }
}

/// Messages processed by the simulator actor.
pub(crate) enum SimCommand {
    /// A client connected; the actor answers whether it is accepted.
    Accept {
        id: u64,
        writer: LineWriter,
        close: oneshot::Sender<()>,
        respond_to: oneshot::Sender<bool>,
    },
    Line {
        id: u64,
        line: String,
    },
    Closed {
        id: u64,
    },
    Control {
        command: ControlCommand,
        respond_to: oneshot::Sender<ControlReply>,
    },
}

/// Cheap-to-clone, in-process handle to the control interface.
#[derive(Clone)]
pub struct SimulatorHandle {
    sender: mpsc::Sender<SimCommand>,
}

impl SimulatorHandle {
    /// Run one control command and wait for its reply.
    pub async fn control(&self, command: ControlCommand) -> Result<ControlReply> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SimCommand::Control {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| TpiError::ChannelClosed)?;
        rx.await.map_err(|_| TpiError::ChannelClosed)
    }

    async fn expect_ok(&self, command: ControlCommand) -> Result<()> {
        match self.control(command).await? {
            ControlReply::Error(msg) => Err(TpiError::InvalidControlCommand { line: msg }),
            _ => Ok(()),
        }
    }

    pub async fn fault(&self, zones: &[u32]) -> Result<()> {
        self.expect_ok(ControlCommand::Fault(zones.to_vec())).await
    }

    pub async fn clear(&self, zones: &[u32]) -> Result<()> {
        self.expect_ok(ControlCommand::Clear(zones.to_vec())).await
    }

    pub async fn arm_away(&self) -> Result<()> {
        self.expect_ok(ControlCommand::ArmAway).await
    }

    pub async fn arm_stay(&self) -> Result<()> {
        self.expect_ok(ControlCommand::ArmStay).await
    }

    pub async fn disarm(&self) -> Result<()> {
        self.expect_ok(ControlCommand::Disarm).await
    }

    /// Send a raw line to the connected client.
    pub async fn write_raw(&self, raw: &str) -> Result<()> {
        self.expect_ok(ControlCommand::Write(raw.to_string())).await
    }

    pub async fn disconnect_client(&self) -> Result<()> {
        self.expect_ok(ControlCommand::Disconnect).await
    }

    pub async fn ready(&self, partition: u32) -> Result<bool> {
        match self.control(ControlCommand::Ready(partition)).await? {
            ControlReply::Ready { ready, .. } => Ok(ready),
            ControlReply::Error(_) => Err(TpiError::InvalidPartition {
                id: partition,
                max: MAX_PARTITIONS,
            }),
            other => Err(TpiError::InvalidControlCommand {
                line: other.to_string(),
            }),
        }
    }

    /// Fault state of every zone, in zone order.
    pub async fn zone_info(&self) -> Result<Vec<(u32, bool)>> {
        match self.control(ControlCommand::ZoneInfo).await? {
            ControlReply::ZoneInfo(zones) => Ok(zones),
            other => Err(TpiError::InvalidControlCommand {
                line: other.to_string(),
            }),
        }
    }
}

/// A running simulator.
///
/// ```no_run
/// use envisalink_tpi::{Dialect, PanelSimulator, SimulatorConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = SimulatorConfig::builder()
///         .dialect(Dialect::Honeywell)
///         .port(4025)
///         .control_port(8000)
///         .build();
///     let mut sim = PanelSimulator::start(config).await?;
///     sim.handle().fault(&[5]).await?;
///     tokio::signal::ctrl_c().await?;
///     sim.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct PanelSimulator {
    local_addr: SocketAddr,
    control_addr: Option<SocketAddr>,
    handle: SimulatorHandle,
    shutdown_tx: watch::Sender<bool>,
    actor_handle: Option<JoinHandle<()>>,
    listener_handle: Option<JoinHandle<()>>,
    control_handle: Option<JoinHandle<()>>,
}

impl PanelSimulator {
    /// Bind the listeners and spawn the actor.
    pub async fn start(config: SimulatorConfig) -> Result<Self> {
        let config = config.normalized();
        let listener = TcpListener::bind((config.bind_host.as_str(), config.port)).await?;
        let local_addr = listener.local_addr()?;
        let control_listener = match config.control_port {
            Some(port) => Some(TcpListener::bind((config.bind_host.as_str(), port)).await?),
            None => None,
        };
        let control_addr = control_listener
            .as_ref()
            .map(|l| l.local_addr())
            .transpose()?;

        info!(
            "{} simulator listening on {} ({} zones, {} partitions)",
            config.dialect, local_addr, config.zones, config.partitions
        );

        let (sender, receiver) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SimulatorHandle { sender };

        let actor = SimulatorActor::new(config, receiver, shutdown_rx.clone());
        let actor_handle = tokio::spawn(actor.run());
        let listener_handle = tokio::spawn(accept_loop(
            listener,
            handle.sender.clone(),
            shutdown_rx.clone(),
        ));
        let control_handle = control_listener
            .map(|l| tokio::spawn(control::serve(l, handle.clone(), shutdown_rx.clone())));

        Ok(Self {
            local_addr,
            control_addr,
            handle,
            shutdown_tx,
            actor_handle: Some(actor_handle),
            listener_handle: Some(listener_handle),
            control_handle,
        })
    }

    /// Address of the TPI listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    pub fn handle(&self) -> SimulatorHandle {
        self.handle.clone()
    }

    /// Stop listening, drop the client and end the actor.
    pub async fn shutdown(&mut self) {
        info!("Simulator shutting down");
        self.shutdown_tx.send_replace(true);
        for handle in [
            self.listener_handle.take(),
            self.control_handle.take(),
            self.actor_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.await;
        }
    }
}

impl Drop for PanelSimulator {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in [
            self.listener_handle.take(),
            self.control_handle.take(),
            self.actor_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Accept TPI connections and hand each one to the actor.
async fn accept_loop(
    listener: TcpListener,
    sender: mpsc::Sender<SimCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_id: u64 = 0;
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.changed() => break,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        next_id += 1;
        let id = next_id;
        info!("Accepted connection {} from {}", id, peer);
        tokio::spawn(connection(id, stream, sender.clone(), shutdown.clone()));
    }
    debug!("Listener stopped");
}

/// Per-connection reader: forwards lines to the actor until either side closes.
async fn connection(
    id: u64,
    stream: tokio::net::TcpStream,
    sender: mpsc::Sender<SimCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = transport::split(stream, SERVER_TERMINATOR);
    let (close_tx, mut close_rx) = oneshot::channel();
    let (accept_tx, accept_rx) = oneshot::channel();

    let accept = SimCommand::Accept {
        id,
        writer: writer.clone(),
        close: close_tx,
        respond_to: accept_tx,
    };
    if sender.send(accept).await.is_err() || !accept_rx.await.unwrap_or(false) {
        let _ = writer.shutdown().await;
        return;
    }
    drop(writer);

    loop {
        let line = tokio::select! {
            line = reader.next_line() => line,
            _ = &mut close_rx => break,
            _ = shutdown.changed() => break,
        };
        match line {
            Ok(Some(line)) => {
                if sender.send(SimCommand::Line { id, line }).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Connection {} read error: {}", id, e);
                break;
            }
        }
    }

    let _ = sender.send(SimCommand::Closed { id }).await;
    debug!("Connection {} reader finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_config() {
        let config = SimulatorConfig {
            zones: 0,
            partitions: 0,
            tick_ms: 0,
            keypad_interval_ms: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.zones, 8);
        assert_eq!(config.partitions, 1);
        assert_eq!(config.tick_ms, 1);
        assert_eq!(config.keypad_interval_ms, 1);

        let config = SimulatorConfig {
            partitions: 20,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.partitions, MAX_PARTITIONS);
        assert_eq!(config.zones, ZONES_V3);
    }

    #[test]
    fn test_builder_login_timeout() {
        assert_eq!(SimulatorConfig::default().login_timeout_ms, None);
        let config = SimulatorConfig::builder().login_timeout_ms(0).build();
        assert_eq!(config.login_timeout_ms, Some(1));
    }
}
