// MIT License - Copyright (c) 2021 TJForc
// Simulator actor: single owner of the simulated panel and its client connection

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use crate::codec::bitfield::{zone_timer_value, IconLedFlags};
use crate::config::Dialect;
use crate::simulator::control::{ControlCommand, ControlReply};
use crate::simulator::{SimCommand, SimulatorConfig};
use crate::transport::LineWriter;

/// How a simulated partition is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ArmMode {
    Away,
    Stay,
    Max,
    Night,
}

#[derive(Debug, Clone)]
pub(super) struct SimZone {
    pub faulted: bool,
    pub bypassed: bool,
    /// Last fault or restore
    pub changed_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub(super) struct SimPartition {
    pub arm: Option<ArmMode>,
    /// Exit delay ticks remaining; 0 once armed
    pub countdown: u32,
    pub ready: bool,
    pub chime: bool,
    /// Keys received since the last complete sequence
    pub keys: String,
}

impl SimPartition {
    pub fn is_arming(&self) -> bool {
        self.arm.is_some() && self.countdown > 0
    }

    pub fn is_armed(&self) -> bool {
        self.arm.is_some() && self.countdown == 0
    }
}

pub(super) struct Client {
    pub id: u64,
    writer: LineWriter,
    close: Option<oneshot::Sender<()>>,
    pub logged_in: bool,
}

/// Owns all simulator state. Runs in one task; listener, connection readers
/// and the control interface reach it through `SimCommand` messages.
pub(super) struct SimulatorActor {
    pub config: SimulatorConfig,
    receiver: mpsc::Receiver<SimCommand>,
    shutdown: watch::Receiver<bool>,
    /// Open client connections; at most one
    conns_open: u32,
    pub client: Option<Client>,
    pub zones: Vec<SimZone>,
    pub partitions: Vec<SimPartition>,
    /// Next zone the idle keypad line reports
    pub keypad_zone_index: usize,
    /// Partition that receives unaddressed keypresses
    pub default_partition: u32,
    next_keypad: Option<Instant>,
    next_tick: Option<Instant>,
    /// Client must log in before this
    login_deadline: Option<Instant>,
}

impl SimulatorActor {
    pub fn new(
        config: SimulatorConfig,
        receiver: mpsc::Receiver<SimCommand>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let now = Instant::now();
        let zones = (0..config.zones)
            .map(|_| SimZone {
                faulted: false,
                bypassed: false,
                changed_at: now,
            })
            .collect();
        let partitions = (0..config.partitions)
            .map(|_| SimPartition {
                ready: true,
                ..Default::default()
            })
            .collect();

        Self {
            config,
            receiver,
            shutdown,
            conns_open: 0,
            client: None,
            zones,
            partitions,
            keypad_zone_index: 0,
            default_partition: 1,
            next_keypad: None,
            next_tick: None,
            login_deadline: None,
        }
    }

    pub async fn run(mut self) {
        info!("Simulator actor starting ({})", self.config.dialect);

        loop {
            let deadline = [self.next_keypad, self.next_tick, self.login_deadline]
                .into_iter()
                .flatten()
                .min();

            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_timer().await;
                }
                _ = self.shutdown.changed() => break,
            }
        }

        self.close_client("simulator shutting down").await;
        info!("Simulator actor stopped");
    }

    async fn handle_command(&mut self, command: SimCommand) {
        match command {
            SimCommand::Accept {
                id,
                writer,
                close,
                respond_to,
            } => {
                if self.conns_open > 0 {
                    info!(
                        "Already have {} connection(s) open, refusing connection {}",
                        self.conns_open, id
                    );
                    let _ = respond_to.send(false);
                    return;
                }
                self.conns_open += 1;
                self.client = Some(Client {
                    id,
                    writer,
                    close: Some(close),
                    logged_in: false,
                });
                let _ = respond_to.send(true);
                self.login_deadline = self
                    .config
                    .login_timeout_ms
                    .map(|ms| Instant::now() + Duration::from_millis(ms));
                self.hello().await;
            }
            SimCommand::Line { id, line } => {
                if self.client.as_ref().is_some_and(|c| c.id == id) {
                    debug!("recv: {}", line);
                    self.process_line(&line).await;
                }
            }
            SimCommand::Closed { id } => {
                if self.client.as_ref().is_some_and(|c| c.id == id) {
                    self.close_client("client closed the connection").await;
                }
            }
            SimCommand::Control {
                command,
                respond_to,
            } => {
                let reply = self.control(command).await;
                let _ = respond_to.send(reply);
            }
        }
    }

    async fn hello(&mut self) {
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_hello().await,
            Dialect::Dsc => self.dsc_hello().await,
        }
    }

    async fn login_timed_out(&mut self) {
        warn!("Client did not log in in time");
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_login_timed_out().await,
            Dialect::Dsc => self.dsc_login_timed_out().await,
        }
        self.close_client("login timed out").await;
    }

    async fn process_line(&mut self, line: &str) {
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_line(line).await,
            Dialect::Dsc => self.dsc_line(line).await,
        }
    }

    /// Write one line to the client. A failed write drops the client.
    pub async fn send(&mut self, line: &str) {
        let Some(client) = self.client.as_ref() else {
            debug!("No client connected, dropping {:?}", line);
            return;
        };
        if let Err(e) = client.writer.send_line(line).await {
            warn!("Write to client failed: {}", e);
            self.close_client("write failed").await;
        }
    }

    pub async fn close_client(&mut self, reason: &str) {
        let Some(mut client) = self.client.take() else {
            return;
        };
        info!("Closing connection {}: {}", client.id, reason);
        if let Some(close) = client.close.take() {
            let _ = close.send(());
        }
        let _ = client.writer.shutdown().await;
        self.conns_open = self.conns_open.saturating_sub(1);
        self.next_keypad = None;
        self.login_deadline = None;
        for partition in &mut self.partitions {
            partition.keys.clear();
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.logged_in)
    }

    pub fn set_logged_in(&mut self) {
        if let Some(client) = self.client.as_mut() {
            client.logged_in = true;
        }
        self.login_deadline = None;
        if self.config.dialect.is_honeywell_family() {
            self.next_keypad = Some(Instant::now());
        }
    }

    pub fn partition_index(&self, partition: u32) -> Option<usize> {
        let idx = partition.checked_sub(1)? as usize;
        (idx < self.partitions.len()).then_some(idx)
    }

    /// Zones are all assigned to partition 1.
    pub fn compute_ready(&self, idx: usize) -> bool {
        let disarmed = self.partitions[idx].arm.is_none();
        disarmed && (idx != 0 || !self.zones.iter().any(|z| z.faulted && !z.bypassed))
    }

    pub fn faulted_zones(&self) -> Vec<u32> {
        self.zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.faulted)
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    pub fn bypassed_zones(&self) -> Vec<u32> {
        self.zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.bypassed)
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    /// Keypad icon bits for a partition.
    pub fn led_state(&self, idx: usize) -> IconLedFlags {
        let partition = &self.partitions[idx];
        let mut leds = IconLedFlags::AC_PRESENT;
        if partition.ready {
            leds |= IconLedFlags::READY | IconLedFlags::RESERVED_10 | IconLedFlags::RESERVED_11;
        }
        leds |= match partition.arm {
            Some(ArmMode::Away) => IconLedFlags::ARMED_AWAY,
            Some(ArmMode::Stay) => IconLedFlags::ARMED_STAY,
            Some(ArmMode::Max) => IconLedFlags::ARMED_AWAY | IconLedFlags::ARMED_ZERO_ENTRY_DELAY,
            Some(ArmMode::Night) => {
                IconLedFlags::ARMED_STAY | IconLedFlags::ARMED_ZERO_ENTRY_DELAY
            }
            None => IconLedFlags::empty(),
        };
        if partition.chime {
            leds |= IconLedFlags::CHIME;
        }
        if idx == 0 && self.zones.iter().any(|z| z.bypassed) {
            leds |= IconLedFlags::BYPASS;
        }
        leds
    }

    /// Raw zone timer values in zone order.
    pub fn zone_timer_values(&self) -> Vec<u16> {
        let now = Instant::now();
        self.zones
            .iter()
            .map(|z| zone_timer_value(z.faulted, now.duration_since(z.changed_at).as_secs()))
            .collect()
    }

    // --- Shared panel operations ---

    /// Start arming a partition. Returns false when it cannot arm.
    pub async fn arm(&mut self, partition: u32, mode: ArmMode) -> bool {
        let Some(idx) = self.partition_index(partition) else {
            warn!("Arm request for unknown partition {}", partition);
            return false;
        };
        if self.partitions[idx].arm.is_some() {
            info!("Partition {} is already armed", partition);
            return false;
        }
        if !self.compute_ready(idx) {
            warn!("Partition {} is not ready to arm", partition);
            return false;
        }

        info!("Arming partition {} ({:?})", partition, mode);
        let ticks = self.config.arm_delay_ticks;
        let p = &mut self.partitions[idx];
        p.arm = Some(mode);
        p.countdown = ticks;
        p.ready = false;

        if ticks == 0 {
            self.armed(idx).await;
        } else {
            self.exit_delay(idx).await;
            self.next_tick = Some(Instant::now() + Duration::from_millis(self.config.tick_ms));
        }
        true
    }

    pub async fn disarm(&mut self, partition: u32) -> bool {
        let Some(idx) = self.partition_index(partition) else {
            warn!("Disarm request for unknown partition {}", partition);
            return false;
        };
        info!("Disarming partition {}", partition);
        let p = &mut self.partitions[idx];
        p.arm = None;
        p.countdown = 0;
        let ready = self.compute_ready(idx);
        self.partitions[idx].ready = ready;
        self.disarmed(idx).await;
        true
    }

    /// Fault or restore zones, then broadcast the consequences.
    pub async fn set_zone_state(&mut self, zones: &[u32], faulted: bool) -> Result<(), String> {
        let max = self.zones.len() as u32;
        if let Some(bad) = zones.iter().find(|z| **z == 0 || **z > max) {
            return Err(format!("invalid zone {bad} (max {max})"));
        }

        for &zone in zones {
            let now = Instant::now();
            let z = &mut self.zones[zone as usize - 1];
            if z.faulted != faulted {
                z.faulted = faulted;
                z.changed_at = now;
            }

            let ready_changed = self.refresh_ready(0);
            self.zone_changed(zone, faulted, ready_changed).await;
        }
        Ok(())
    }

    /// Recompute readiness of a disarmed partition. Returns whether it changed.
    pub fn refresh_ready(&mut self, idx: usize) -> bool {
        if self.partitions[idx].arm.is_some() {
            return false;
        }
        let ready = self.compute_ready(idx);
        let changed = self.partitions[idx].ready != ready;
        self.partitions[idx].ready = ready;
        changed
    }

    async fn zone_changed(&mut self, zone: u32, faulted: bool, ready_changed: bool) {
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => {
                self.honeywell_zone_changed(zone, faulted, ready_changed).await
            }
            Dialect::Dsc => self.dsc_zone_changed(zone, faulted, ready_changed).await,
        }
    }

    async fn exit_delay(&mut self, idx: usize) {
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_exit_delay(idx).await,
            Dialect::Dsc => self.dsc_exit_delay(idx).await,
        }
    }

    async fn armed(&mut self, idx: usize) {
        info!("Partition {} armed", idx + 1);
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_armed(idx).await,
            Dialect::Dsc => self.dsc_armed(idx).await,
        }
    }

    async fn disarmed(&mut self, idx: usize) {
        match self.config.dialect {
            Dialect::Honeywell | Dialect::Uno => self.honeywell_disarmed(idx).await,
            Dialect::Dsc => self.dsc_disarmed(idx).await,
        }
    }

    async fn on_timer(&mut self) {
        let now = Instant::now();

        if self.login_deadline.is_some_and(|t| t <= now) {
            self.login_deadline = None;
            if self.client.is_some() && !self.is_logged_in() {
                self.login_timed_out().await;
            }
        }

        if self.next_tick.is_some_and(|t| t <= now) {
            self.next_tick = None;
            for idx in 0..self.partitions.len() {
                if !self.partitions[idx].is_arming() {
                    continue;
                }
                if self.config.dialect.is_honeywell_family() {
                    self.send_arming_keypad(idx).await;
                }
                self.partitions[idx].countdown -= 1;
                if self.partitions[idx].countdown == 0 {
                    self.armed(idx).await;
                }
            }
            if self.partitions.iter().any(SimPartition::is_arming) {
                self.next_tick = Some(now + Duration::from_millis(self.config.tick_ms));
            }
        }

        if self.next_keypad.is_some_and(|t| t <= now) {
            self.next_keypad = Some(now + Duration::from_millis(self.config.keypad_interval_ms));
            if self.is_logged_in() && !self.partitions.iter().any(SimPartition::is_arming) {
                self.send_idle_keypad(0).await;
            }
        }
    }

    async fn control(&mut self, command: ControlCommand) -> ControlReply {
        debug!("Control: {:?}", command);
        match command {
            ControlCommand::Write(raw) => {
                if self.client.is_none() {
                    return ControlReply::Error("no client connected".into());
                }
                self.send(&raw).await;
                ControlReply::Ok
            }
            ControlCommand::Fault(zones) => match self.set_zone_state(&zones, true).await {
                Ok(()) => ControlReply::Ok,
                Err(msg) => ControlReply::Error(msg),
            },
            ControlCommand::Clear(zones) => match self.set_zone_state(&zones, false).await {
                Ok(()) => ControlReply::Ok,
                Err(msg) => ControlReply::Error(msg),
            },
            ControlCommand::ArmAway => {
                let ok = self.arm(1, ArmMode::Away).await;
                control_result(ok)
            }
            ControlCommand::ArmStay => {
                let ok = self.arm(1, ArmMode::Stay).await;
                control_result(ok)
            }
            ControlCommand::Disarm => {
                let ok = self.disarm(1).await;
                control_result(ok)
            }
            ControlCommand::Ready(partition) => match self.partition_index(partition) {
                Some(idx) => ControlReply::Ready {
                    partition,
                    ready: self.partitions[idx].ready,
                },
                None => ControlReply::Error(format!("invalid partition {partition}")),
            },
            ControlCommand::ZoneInfo => ControlReply::ZoneInfo(
                self.zones
                    .iter()
                    .enumerate()
                    .map(|(i, z)| (i as u32 + 1, z.faulted))
                    .collect(),
            ),
            ControlCommand::Disconnect => {
                if self.client.is_none() {
                    return ControlReply::Error("no client connected".into());
                }
                self.close_client("disconnect requested").await;
                ControlReply::Ok
            }
        }
    }
}

fn control_result(ok: bool) -> ControlReply {
    if ok {
        ControlReply::Ok
    } else {
        ControlReply::Error("partition 1 cannot do that now".into())
    }
}
