// MIT License - Copyright (c) 2021 TJForc
// Simulated DSC panel: checksummed command handling and outbound frames

use tracing::{debug, info, warn};

use crate::codec::bitfield::{encode_zone_timers, DscLedFlags};
use crate::codec::dsc::{encode_frame, parse_frame};
use crate::constants::{dsc as cmd, DscArmMode};
use crate::simulator::actor::{ArmMode, SimulatorActor};

const ACK: &str = "500";
const COMMAND_ERROR: &str = "501";
const SYSTEM_ERROR: &str = "502";
const KEYPAD_LED_STATE: &str = "510";
const ZONE_TIMER_DUMP: &str = "615";
const ZONE_OPEN: &str = "609";
const ZONE_RESTORED: &str = "610";
const PARTITION_READY: &str = "650";
const PARTITION_NOT_READY: &str = "651";
const PARTITION_ARMED: &str = "652";
const PARTITION_DISARMED: &str = "655";
const EXIT_DELAY: &str = "656";
const INVALID_ACCESS_CODE: &str = "670";
const TROUBLE_LED_OFF: &str = "841";

/// `502` error codes the simulator reports.
const ERR_SYNTAX: &str = "020";
const ERR_PARTITION: &str = "021";
const ERR_NOT_SUPPORTED: &str = "022";
const ERR_NOT_READY: &str = "024";

fn dsc_mode(mode: ArmMode) -> DscArmMode {
    match mode {
        ArmMode::Away => DscArmMode::Away,
        ArmMode::Stay => DscArmMode::Stay,
        ArmMode::Max => DscArmMode::ZeroEntryAway,
        ArmMode::Night => DscArmMode::ZeroEntryStay,
    }
}

/// Split `<partition digit><user code>` command data.
fn partition_and_code(data: &str) -> Option<(u32, &str)> {
    let partition = data.chars().next()?.to_digit(10)?;
    Some((partition, &data[1..]))
}

impl SimulatorActor {
    pub(super) async fn dsc_hello(&mut self) {
        self.send(&encode_frame(cmd::LOGIN_STATUS, "3")).await;
    }

    pub(super) async fn dsc_login_timed_out(&mut self) {
        self.send(&encode_frame(cmd::LOGIN_STATUS, "2")).await;
    }

    pub(super) async fn dsc_line(&mut self, line: &str) {
        let (code, data) = match parse_frame(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Rejecting frame: {}", e);
                self.send(&encode_frame(COMMAND_ERROR, "")).await;
                return;
            }
        };

        if !self.is_logged_in() {
            if code != cmd::LOGIN {
                debug!("Ignoring {} before login", code);
                return;
            }
            self.send(&encode_frame(ACK, code)).await;
            if data == self.config.password {
                info!("Client logged in");
                self.send(&encode_frame(cmd::LOGIN_STATUS, "1")).await;
                self.set_logged_in();
            } else {
                warn!("Client sent a bad password");
                self.send(&encode_frame(cmd::LOGIN_STATUS, "0")).await;
                self.close_client("login failed").await;
            }
            return;
        }

        match code {
            cmd::KEEP_ALIVE | cmd::SET_TIME | cmd::OUTPUT_CONTROL | cmd::PANIC
            | cmd::KEYPRESS | cmd::SEND_CODE | cmd::LOGIN => {
                self.send(&encode_frame(ACK, code)).await;
            }
            cmd::STATUS_REPORT => {
                self.send(&encode_frame(ACK, code)).await;
                self.dsc_status_report().await;
            }
            cmd::DUMP_ZONE_TIMERS => {
                self.send(&encode_frame(ACK, code)).await;
                let timers = encode_zone_timers(&self.zone_timer_values());
                self.send(&encode_frame(ZONE_TIMER_DUMP, &timers)).await;
            }
            cmd::ARM_AWAY | cmd::ARM_STAY | cmd::ARM_MAX | cmd::DISARM => {
                self.dsc_arm_command(code, data).await;
            }
            _ => {
                debug!("Unsupported command {}", code);
                self.send(&encode_frame(SYSTEM_ERROR, ERR_NOT_SUPPORTED)).await;
            }
        }
    }

    async fn dsc_arm_command(&mut self, code: &str, data: &str) {
        let Some((partition, user_code)) = partition_and_code(data) else {
            self.send(&encode_frame(SYSTEM_ERROR, ERR_SYNTAX)).await;
            return;
        };
        if self.partition_index(partition).is_none() {
            self.send(&encode_frame(SYSTEM_ERROR, ERR_PARTITION)).await;
            return;
        }
        self.send(&encode_frame(ACK, code)).await;
        if user_code != self.config.alarm_code {
            warn!("Bad user code for partition {}", partition);
            self.send(&encode_frame(INVALID_ACCESS_CODE, &partition.to_string()))
                .await;
            return;
        }

        let mode = match code {
            cmd::ARM_AWAY => ArmMode::Away,
            cmd::ARM_STAY => ArmMode::Stay,
            cmd::ARM_MAX => ArmMode::Max,
            _ => {
                self.disarm(partition).await;
                return;
            }
        };
        if !self.arm(partition, mode).await {
            self.send(&encode_frame(SYSTEM_ERROR, ERR_NOT_READY)).await;
        }
    }

    fn dsc_leds(&self, idx: usize) -> DscLedFlags {
        let partition = &self.partitions[idx];
        let mut leds = DscLedFlags::BACKLIGHT;
        if partition.ready {
            leds |= DscLedFlags::READY;
        }
        if partition.is_armed() {
            leds |= DscLedFlags::ARMED;
        }
        if idx == 0 && self.zones.iter().any(|z| z.bypassed) {
            leds |= DscLedFlags::BYPASS;
        }
        leds
    }

    async fn send_dsc_leds(&mut self, idx: usize) {
        // The keypad LED frame carries no partition number and describes partition 1
        if idx == 0 {
            let leds = self.dsc_leds(0).to_hex();
            self.send(&encode_frame(KEYPAD_LED_STATE, &leds)).await;
        }
    }

    fn dsc_partition_line(&self, idx: usize) -> String {
        let partition = &self.partitions[idx];
        let p = (idx + 1).to_string();
        match partition.arm {
            Some(_) if partition.is_arming() => encode_frame(EXIT_DELAY, &p),
            Some(mode) => {
                encode_frame(PARTITION_ARMED, &format!("{p}{}", dsc_mode(mode).as_digit()))
            }
            None if partition.ready => encode_frame(PARTITION_READY, &p),
            None => encode_frame(PARTITION_NOT_READY, &p),
        }
    }

    async fn dsc_status_report(&mut self) {
        let mut lines: Vec<String> = self
            .zones
            .iter()
            .enumerate()
            .map(|(i, z)| {
                let code = if z.faulted { ZONE_OPEN } else { ZONE_RESTORED };
                encode_frame(code, &format!("{:03}", i + 1))
            })
            .collect();
        for idx in 0..self.partitions.len() {
            lines.push(self.dsc_partition_line(idx));
        }
        for idx in 0..self.partitions.len() {
            lines.push(encode_frame(TROUBLE_LED_OFF, &(idx + 1).to_string()));
        }
        for line in lines {
            self.send(&line).await;
        }
        self.send_dsc_leds(0).await;
    }

    pub(super) async fn dsc_zone_changed(&mut self, zone: u32, faulted: bool, ready_changed: bool) {
        let code = if faulted { ZONE_OPEN } else { ZONE_RESTORED };
        self.send(&encode_frame(code, &format!("{zone:03}"))).await;
        if ready_changed {
            self.send(&self.dsc_partition_line(0)).await;
        }
        // A real keypad refreshes its LEDs on every zone change
        self.send_dsc_leds(0).await;
    }

    pub(super) async fn dsc_exit_delay(&mut self, idx: usize) {
        self.send(&self.dsc_partition_line(idx)).await;
        self.send_dsc_leds(idx).await;
    }

    pub(super) async fn dsc_armed(&mut self, idx: usize) {
        self.send(&self.dsc_partition_line(idx)).await;
        self.send_dsc_leds(idx).await;
    }

    pub(super) async fn dsc_disarmed(&mut self, idx: usize) {
        let p = (idx + 1).to_string();
        self.send(&encode_frame(PARTITION_DISARMED, &p)).await;
        self.send(&self.dsc_partition_line(idx)).await;
        self.send_dsc_leds(idx).await;
    }
}
