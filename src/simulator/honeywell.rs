// MIT License - Copyright (c) 2021 TJForc
// Simulated Honeywell / Uno panel: command handling and outbound frames

use tracing::{debug, info, warn};

use crate::cid::CidQualifier;
use crate::codec::bitfield::{encode_zone_bitfield, encode_zone_timers, IconLedFlags};
use crate::codec::honeywell::split_frames;
use crate::config::Dialect;
use crate::constants::{
    honeywell as cmd, PartitionStatusCode, ACK_SENTINEL, FRAME_TERMINATOR, MAX_PARTITIONS,
};
use crate::error::TpiResponseCode;
use crate::simulator::actor::{ArmMode, SimulatorActor};

/// What a completed keypad sequence asks the panel to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Disarm,
    Arm(ArmMode),
}

/// Contact-ID event codes the simulated keypad reports.
const CID_OPEN_CLOSE_BY_USER: u16 = 401;
const CID_MEDICAL: u16 = 100;
const CID_FIRE: u16 = 110;
const CID_PANIC: u16 = 120;

/// Faulted zones carried by one Honeywell `%01` update.
const HONEYWELL_ZONE_UPDATE_LIMIT: usize = 4;

fn event(code: &str, data: &str) -> String {
    format!("%{code},{data}{FRAME_TERMINATOR}")
}

fn ack(code: &str, result: TpiResponseCode) -> String {
    format!("{ACK_SENTINEL}{code},{}{FRAME_TERMINATOR}", result.as_str())
}

fn cid(qualifier: CidQualifier, code: u16, partition: u32, zone_or_user: u32) -> String {
    let data = format!(
        "{}{:03}{:02}{:03}",
        qualifier.as_digit(),
        code,
        partition,
        zone_or_user
    );
    event("03", &data)
}

fn armed_message(mode: ArmMode) -> &'static str {
    match mode {
        ArmMode::Away => "ARMED ***AWAY***",
        ArmMode::Stay => "ARMED ***STAY***",
        ArmMode::Max => "ARMED *MAXIMUM*",
        ArmMode::Night => "ARMED *NIGHT*",
    }
}

fn keypad_line(partition: u32, leds: IconLedFlags, field: u32, alpha: &str) -> String {
    event(
        "00",
        &format!("{:02},{},{:02},00,{}", partition, leds.to_hex(), field, alpha),
    )
}

impl SimulatorActor {
    pub(super) async fn honeywell_hello(&mut self) {
        self.send(cmd::LOGIN_PROMPT).await;
    }

    pub(super) async fn honeywell_login_timed_out(&mut self) {
        self.send(cmd::LOGIN_TIMED_OUT).await;
    }

    pub(super) async fn honeywell_line(&mut self, line: &str) {
        if !self.is_logged_in() {
            if line.trim() == self.config.password {
                info!("Client logged in");
                self.send(cmd::LOGIN_OK).await;
                self.set_logged_in();
            } else {
                warn!("Client sent a bad password");
                self.send(cmd::LOGIN_FAILED).await;
                self.close_client("login failed").await;
            }
            return;
        }

        for frame in split_frames(line) {
            self.honeywell_frame(frame.trim()).await;
        }
    }

    async fn honeywell_frame(&mut self, frame: &str) {
        let Some(body) = frame.strip_prefix(ACK_SENTINEL) else {
            // Unframed text is keys for the default partition
            let partition = self.default_partition;
            self.keypresses(partition, frame).await;
            return;
        };
        let body = body.strip_suffix(FRAME_TERMINATOR).unwrap_or(body);
        let (code, data) = body.split_once(',').unwrap_or((body, ""));
        let uno = self.config.dialect == Dialect::Uno;

        match code {
            cmd::KEEP_ALIVE => self.send(&ack(code, TpiResponseCode::Success)).await,
            cmd::CHANGE_DEFAULT_PARTITION => {
                match data.parse().ok().filter(|p| self.partition_index(*p).is_some()) {
                    Some(partition) => {
                        self.default_partition = partition;
                        self.send(&ack(code, TpiResponseCode::Success)).await;
                    }
                    None => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
                }
            }
            cmd::DUMP_ZONE_TIMERS => {
                self.send(&ack(code, TpiResponseCode::Success)).await;
                let timers = encode_zone_timers(&self.zone_timer_values());
                self.send(&event("FF", &timers)).await;
            }
            cmd::PARTITION_KEYPRESS => {
                let parsed = data
                    .split_once(',')
                    .and_then(|(p, keys)| p.parse::<u32>().ok().map(|p| (p, keys)));
                let Some((partition, keys)) = parsed else {
                    self.send(&ack(code, TpiResponseCode::SyntaxError)).await;
                    return;
                };
                self.send(&ack(code, TpiResponseCode::Success)).await;
                self.keypresses(partition, keys).await;
            }
            cmd::BYPASS_ZONE | cmd::UNBYPASS_ZONE if uno => {
                let bypass = code == cmd::BYPASS_ZONE;
                match data.parse::<u32>() {
                    Ok(zone) if zone >= 1 && zone as usize <= self.zones.len() => {
                        self.send(&ack(code, TpiResponseCode::Success)).await;
                        self.set_bypass(zone, bypass).await;
                    }
                    _ => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
                }
            }
            cmd::STAY_ARM | cmd::AWAY_ARM if uno => {
                let mode = if code == cmd::STAY_ARM {
                    ArmMode::Stay
                } else {
                    ArmMode::Away
                };
                match data.parse::<u32>() {
                    Ok(partition) => {
                        self.send(&ack(code, TpiResponseCode::Success)).await;
                        self.arm(partition, mode).await;
                    }
                    Err(_) => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
                }
            }
            cmd::DISARM if uno => {
                let parsed = data
                    .split_once(',')
                    .and_then(|(p, code)| p.parse::<u32>().ok().map(|p| (p, code)));
                match parsed {
                    Some((partition, user_code)) if user_code == self.config.alarm_code => {
                        self.send(&ack(code, TpiResponseCode::Success)).await;
                        self.disarm(partition).await;
                    }
                    _ => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
                }
            }
            cmd::INITIAL_STATE_DUMP if uno => {
                self.send(&ack(code, TpiResponseCode::Success)).await;
                self.send(&self.partition_status_line()).await;
                self.send(&self.zone_state_line(1)).await;
                self.send(&self.bypass_state_line()).await;
            }
            cmd::HOST_INFO if uno => {
                self.send(&ack(code, TpiResponseCode::Success)).await;
                self.send(&event("05", "010203040506,UNO,1.2.3.4")).await;
            }
            cmd::TOGGLE_CHIME if uno => match self.partition_index(data.parse().unwrap_or(1)) {
                Some(idx) => {
                    self.send(&ack(code, TpiResponseCode::Success)).await;
                    self.partitions[idx].chime = !self.partitions[idx].chime;
                    self.send_idle_keypad(idx).await;
                }
                None => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
            },
            cmd::PANIC if uno => {
                let cid_code = match data {
                    "1" => Some(CID_FIRE),
                    "2" => Some(CID_MEDICAL),
                    "3" => Some(CID_PANIC),
                    _ => None,
                };
                match cid_code {
                    Some(cid_code) => {
                        self.send(&ack(code, TpiResponseCode::Success)).await;
                        self.send(&cid(CidQualifier::NewEvent, cid_code, 1, 0)).await;
                    }
                    None => self.send(&ack(code, TpiResponseCode::SyntaxError)).await,
                }
            }
            _ => {
                debug!("Unknown command {:?}", frame);
                self.send(&ack(code, TpiResponseCode::UnknownCommand)).await;
            }
        }
    }

    /// Feed keys into a partition's keypad buffer. `code` + `33` arms night
    /// when both keys arrive together; a lone `3` arms stay.
    async fn keypresses(&mut self, partition: u32, keys: &str) {
        let Some(idx) = self.partition_index(partition) else {
            warn!("Keypress for unknown partition {}", partition);
            return;
        };
        let mut chars = keys.chars().peekable();
        while let Some(key) = chars.next() {
            let night = key == cmd::KEY_ARM_STAY
                && chars.peek() == Some(&cmd::KEY_ARM_STAY)
                && self.partitions[idx].keys == self.config.alarm_code;
            if night {
                chars.next();
                self.partitions[idx].keys.clear();
                self.key_action(partition, KeyAction::Arm(ArmMode::Night)).await;
            } else {
                self.keypress(idx, key).await;
            }
        }
    }

    async fn keypress(&mut self, idx: usize, key: char) {
        let partition = idx as u32 + 1;

        let panic = match key {
            'A' => Some(CID_FIRE),
            'B' => Some(CID_MEDICAL),
            'C' => Some(CID_PANIC),
            _ => None,
        };
        if let Some(cid_code) = panic {
            self.partitions[idx].keys.clear();
            info!("Panic key {} on partition {}", key, partition);
            self.send(&cid(CidQualifier::NewEvent, cid_code, partition, 0)).await;
            return;
        }

        let mut keys = std::mem::take(&mut self.partitions[idx].keys);
        keys.push(key);
        let code = self.config.alarm_code.clone();

        let action = keys
            .strip_prefix(code.as_str())
            .and_then(|suffix| match suffix.chars().next() {
                Some(cmd::KEY_DISARM) => Some(KeyAction::Disarm),
                Some(cmd::KEY_ARM_AWAY) => Some(KeyAction::Arm(ArmMode::Away)),
                Some(cmd::KEY_ARM_STAY) => Some(KeyAction::Arm(ArmMode::Stay)),
                Some(cmd::KEY_ARM_MAX) => Some(KeyAction::Arm(ArmMode::Max)),
                Some('7') => Some(KeyAction::Arm(ArmMode::Night)),
                _ => None,
            });

        match action {
            Some(action) => self.key_action(partition, action).await,
            None if code.starts_with(keys.as_str()) => self.partitions[idx].keys = keys,
            None if code.starts_with(key) => self.partitions[idx].keys = key.to_string(),
            None => debug!("Discarding key sequence {:?}", keys),
        }
    }

    /// Run a completed sequence and report it as a user open/close.
    async fn key_action(&mut self, partition: u32, action: KeyAction) {
        match action {
            KeyAction::Disarm => {
                if self.disarm(partition).await {
                    self.send(&cid(CidQualifier::NewEvent, CID_OPEN_CLOSE_BY_USER, partition, 1))
                        .await;
                }
            }
            KeyAction::Arm(mode) => {
                if self.arm(partition, mode).await {
                    self.send(&cid(CidQualifier::Restore, CID_OPEN_CLOSE_BY_USER, partition, 1))
                        .await;
                }
            }
        }
    }

    async fn set_bypass(&mut self, zone: u32, bypassed: bool) {
        self.zones[zone as usize - 1].bypassed = bypassed;
        info!(
            "Zone {} {}",
            zone,
            if bypassed { "bypassed" } else { "unbypassed" }
        );
        self.send(&self.bypass_state_line()).await;
        if self.refresh_ready(0) {
            self.send(&self.partition_status_line()).await;
        }
        self.send_idle_keypad(0).await;
    }

    fn partition_code(&self, idx: usize) -> PartitionStatusCode {
        let partition = &self.partitions[idx];
        match partition.arm {
            Some(_) if partition.is_arming() => PartitionStatusCode::ExitEntryDelay,
            Some(ArmMode::Away) => PartitionStatusCode::ArmedAway,
            Some(ArmMode::Stay | ArmMode::Night) => PartitionStatusCode::ArmedStay,
            Some(ArmMode::Max) => PartitionStatusCode::ArmedMax,
            None if !partition.ready => PartitionStatusCode::NotReady,
            None if idx == 0 && self.zones.iter().any(|z| z.bypassed) => {
                PartitionStatusCode::ReadyBypass
            }
            None => PartitionStatusCode::Ready,
        }
    }

    /// `%02` with one code per partition, padded to the full partition count.
    fn partition_status_line(&self) -> String {
        let mut data: String = (0..self.partitions.len())
            .map(|idx| self.partition_code(idx).as_str())
            .collect();
        for _ in self.partitions.len()..MAX_PARTITIONS as usize {
            data.push_str(PartitionStatusCode::NotUsed.as_str());
        }
        event("02", &data)
    }

    /// `%01` zone bitfield. Honeywell modules only report the first few
    /// faulted zones found walking from `start_zone`; Uno reports them all.
    fn zone_state_line(&self, start_zone: u32) -> String {
        let count = self.zones.len();
        let start = (start_zone.max(1) - 1) as usize;
        let limit = if self.config.dialect == Dialect::Uno {
            count
        } else {
            HONEYWELL_ZONE_UPDATE_LIMIT
        };
        let faulted: Vec<u32> = (0..count)
            .map(|offset| (start + offset) % count)
            .filter(|idx| self.zones[*idx].faulted)
            .take(limit)
            .map(|idx| idx as u32 + 1)
            .collect();
        event("01", &encode_zone_bitfield(&faulted, self.config.zones))
    }

    fn bypass_state_line(&self) -> String {
        event(
            "04",
            &encode_zone_bitfield(&self.bypassed_zones(), self.config.zones),
        )
    }

    fn ready_keypad_line(&self, idx: usize) -> String {
        keypad_line(
            idx as u32 + 1,
            self.led_state(idx),
            8,
            "****DISARMED****  Ready to Arm  ",
        )
    }

    fn fault_keypad_line(&self, zone: u32) -> String {
        let alpha = format!("{:<16}{:<16}", format!("FAULT {zone:02} Zone {zone}"), "");
        keypad_line(1, self.led_state(0), zone, &alpha)
    }

    pub(super) async fn send_arming_keypad(&mut self, idx: usize) {
        let partition = &self.partitions[idx];
        let Some(mode) = partition.arm else {
            return;
        };
        let alpha = format!(
            "{:<16}May Exit Now {:03}",
            armed_message(mode),
            partition.countdown
        );
        let line = keypad_line(
            idx as u32 + 1,
            self.led_state(idx),
            partition.countdown,
            &alpha,
        );
        self.send(&line).await;
    }

    /// Periodic keypad line: armed banner, the next faulted zone, or ready.
    pub(super) async fn send_idle_keypad(&mut self, idx: usize) {
        let partition = &self.partitions[idx];
        let line = if let Some(mode) = partition.arm.filter(|_| partition.is_armed()) {
            let alpha = format!("{:<16}{:<16}", armed_message(mode), "");
            keypad_line(idx as u32 + 1, self.led_state(idx), 0, &alpha)
        } else if partition.is_arming() {
            return self.send_arming_keypad(idx).await;
        } else if idx == 0 && !partition.ready {
            let faulted: Vec<u32> = self
                .zones
                .iter()
                .enumerate()
                .filter(|(_, z)| z.faulted && !z.bypassed)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            if faulted.is_empty() {
                return;
            }
            let zone = faulted[self.keypad_zone_index % faulted.len()];
            self.keypad_zone_index = self.keypad_zone_index.wrapping_add(1);
            self.fault_keypad_line(zone)
        } else {
            self.ready_keypad_line(idx)
        };
        self.send(&line).await;
    }

    pub(super) async fn honeywell_zone_changed(
        &mut self,
        zone: u32,
        faulted: bool,
        ready_changed: bool,
    ) {
        if ready_changed {
            self.send(&self.partition_status_line()).await;
        }
        self.send(&self.zone_state_line(zone)).await;

        let (armed, ready) = (self.partitions[0].arm.is_some(), self.partitions[0].ready);
        if armed {
            return;
        }
        if faulted && !self.zones[zone as usize - 1].bypassed {
            self.send(&self.fault_keypad_line(zone)).await;
        } else if ready {
            self.send(&self.ready_keypad_line(0)).await;
        }
    }

    pub(super) async fn honeywell_exit_delay(&mut self, idx: usize) {
        self.send(&self.partition_status_line()).await;
        self.send_arming_keypad(idx).await;
    }

    pub(super) async fn honeywell_armed(&mut self, idx: usize) {
        self.send(&self.partition_status_line()).await;
        self.send_idle_keypad(idx).await;
    }

    pub(super) async fn honeywell_disarmed(&mut self, idx: usize) {
        self.send(&self.partition_status_line()).await;
        self.send_idle_keypad(idx).await;
    }
}
