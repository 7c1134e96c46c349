// MIT License - Copyright (c) 2021 TJForc
// Handler execution: decoded event -> state mutation, replies and callback event

use tracing::{debug, error, info, warn};

use crate::cid::CidEvent;
use crate::codec::bitfield::{
    decode_zone_bitfield, decode_zone_timers, DscLedFlags, IconLedFlags,
};
use crate::codec::{Codec, Command, Event};
use crate::constants::{
    dsc_system_error, BeepMode, DscArmMode, PartitionStatusCode, DSC_VERBOSE_TROUBLE,
    MAX_PARTITIONS,
};
use crate::devices::{PartitionDelta, PartitionStatusFlags as P, ZoneDelta};
use crate::error::{Result, TpiError, TpiResponseCode};
use crate::event::PanelEvent;
use crate::registry::{Handler, ResponseType};
use crate::state::AlarmState;

/// Session-level consequence of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    LoggedIn,
    /// Password rejected: close and stay disconnected
    LoginRejected,
    /// Login not completed in time: close and stay disconnected
    LoginTimedOut,
}

/// Everything a handler produced.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// Delivered to the event's callback
    pub event: Option<PanelEvent>,
    /// Wire lines to send back, in order
    pub replies: Vec<String>,
    pub signal: Option<SessionSignal>,
}

impl Outcome {
    fn event(event: PanelEvent) -> Self {
        Self {
            event: Some(event),
            ..Self::default()
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

/// Runs the registry handler for each decoded event against an [`AlarmState`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    codec: Codec,
    password: String,
}

impl Dispatcher {
    pub fn new(codec: Codec, password: impl Into<String>) -> Self {
        Self {
            codec,
            password: password.into(),
        }
    }

    /// Run the handler for `event`. Events without a registry entry are an
    /// `UnknownCode` error and leave the state untouched.
    pub fn dispatch(&self, event: &Event, state: &mut AlarmState) -> Result<Outcome> {
        let response = event.response.ok_or_else(|| TpiError::UnknownCode {
            code: event.code.clone(),
        })?;
        let data = event.data.as_str();

        match response.handler {
            Handler::Login => {
                info!("Login prompt received, sending password");
                let replies = self.codec.encode(&Command::Login {
                    password: self.password.clone(),
                })?;
                Ok(Outcome {
                    replies,
                    ..Outcome::none()
                })
            }
            Handler::LoginSuccess => {
                info!("Password accepted, session logged in");
                Ok(Outcome {
                    event: Some(PanelEvent::LoginSuccess),
                    signal: Some(SessionSignal::LoggedIn),
                    ..Outcome::none()
                })
            }
            Handler::LoginFailure => {
                error!("Password rejected by the Envisalink");
                Ok(Outcome {
                    event: Some(PanelEvent::LoginFailure),
                    signal: Some(SessionSignal::LoginRejected),
                    ..Outcome::none()
                })
            }
            Handler::LoginTimeout => {
                error!("Envisalink timed out waiting for the password");
                Ok(Outcome {
                    event: Some(PanelEvent::LoginTimeout),
                    signal: Some(SessionSignal::LoginTimedOut),
                    ..Outcome::none()
                })
            }
            Handler::KeypadUpdate => keypad_update(data, state),
            Handler::KeypadLedState => keypad_led_state(data, state),
            Handler::KeypadLedFlash => {
                debug!("Keypad LED flash state: {}", data);
                Ok(Outcome::none())
            }
            Handler::ZoneStateChange => zone_state_change(data, state),
            Handler::PartitionStateChange => partition_state_change(data, state),
            Handler::ZoneBypassUpdate => zone_bypass_update(data, state),
            Handler::HostInfo => {
                info!("Envisalink host information: {}", data);
                Ok(Outcome::none())
            }
            Handler::RealtimeCidEvent => realtime_cid_event(data, state),
            Handler::ZoneTimerDump => zone_timer_dump(data, state),
            Handler::PollResponse => {
                debug!("Acknowledged: {} {}", event.code, data);
                Ok(Outcome::none())
            }
            Handler::CommandResponse => {
                command_response(&event.code, data);
                Ok(Outcome::none())
            }
            Handler::CommandResponseError => {
                error!("Envisalink rejected the last command: bad checksum");
                Ok(Outcome::none())
            }
            Handler::SystemError => {
                error!("Envisalink system error {}: {}", data, dsc_system_error(data));
                Ok(Outcome::none())
            }
            Handler::ZoneUpdate => zone_update(&response, data, state),
            Handler::PartitionUpdate => partition_update(&response, data, state),
            Handler::PartitionArmed => partition_armed(data, state),
            Handler::UserClosing => user_report(data, state, true),
            Handler::UserOpening => user_report(data, state, false),
            Handler::GeneralUpdate => general_update(&response, state),
            Handler::VerboseTrouble => verbose_trouble(data, state),
        }
    }
}

fn parse_number(data: &str, field: &str, what: &str) -> Result<u32> {
    field
        .trim()
        .parse::<u32>()
        .map_err(|_| TpiError::frame(data, format!("bad {what} {field:?}")))
}

/// First data digit of a DSC partition frame.
fn dsc_partition(data: &str) -> Result<u32> {
    let digit = data.get(..1).unwrap_or("");
    let partition = parse_number(data, digit, "partition")?;
    if partition == 0 || partition > MAX_PARTITIONS {
        return Err(TpiError::InvalidPartition {
            id: partition,
            max: MAX_PARTITIONS,
        });
    }
    Ok(partition)
}

/// `%00`: `PP,IIII,ZZ,BB,ALPHA`.
fn keypad_update(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let fields: Vec<&str> = data.split(',').collect();
    if fields.len() != 5 || data.contains('%') {
        return Err(TpiError::frame(data, "keypad update must have 5 fields"));
    }

    let partition = parse_number(data, fields[0], "partition")?;
    let icons = IconLedFlags::from_hex(fields[1])
        .ok_or_else(|| TpiError::frame(data, "bad keypad icon field"))?;
    let beep = BeepMode::from_code(fields[3]);
    let alpha = fields[4];

    let (on, off) = icons.partition_flags();
    let delta = PartitionDelta::new()
        .set(on)
        .clear(off)
        .assign(P::BEEP, beep.is_some_and(|b| b.is_beeping()));

    let p = state.partition_mut(partition)?;
    p.apply(&delta);
    p.set_alpha(alpha);
    debug!("(partition {}) keypad: {} [{}]", partition, alpha, icons.to_hex());

    Ok(Outcome::event(PanelEvent::KeypadUpdate {
        partition: Some(partition),
        alpha: alpha.to_string(),
        beep,
    }))
}

/// `510`: DSC keypad LEDs, reported for partition 1.
fn keypad_led_state(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let leds = DscLedFlags::from_hex(data)
        .ok_or_else(|| TpiError::frame(data, "bad keypad LED byte"))?;
    let (on, off) = leds.partition_flags();
    let p = state.partition_mut(1)?;
    p.apply(&PartitionDelta::new().set(on).clear(off));

    Ok(Outcome::event(PanelEvent::KeypadUpdate {
        partition: Some(1),
        alpha: p.alpha.clone(),
        beep: None,
    }))
}

/// `%01`: every zone's open/fault state.
fn zone_state_change(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let zones = decode_zone_bitfield(data, state.num_zones())?;
    let mut changed = Vec::new();
    for (idx, faulted) in zones.iter().enumerate().take(state.num_zones() as usize) {
        let zone = idx as u32 + 1;
        if !state.apply_zone_status(zone, &ZoneDelta::faulted(*faulted))?.is_empty() {
            debug!(
                "(zone {}) is {}",
                zone,
                if *faulted { "Open/Faulted" } else { "Closed/Not Faulted" }
            );
            changed.push(zone);
        }
    }
    Ok(Outcome::event(PanelEvent::ZoneStateChange { zones: changed }))
}

/// `%02`: one two-digit status code per partition.
fn partition_state_change(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let mut changed = Vec::new();
    for idx in 0..state.num_partitions() {
        let start = idx as usize * 2;
        let Some(code) = data.get(start..start + 2) else {
            break;
        };
        let Some(status) = PartitionStatusCode::from_code(code) else {
            warn!("Unknown partition status code {:?} for partition {}", code, idx + 1);
            continue;
        };
        let partition = idx + 1;
        if !state.apply_partition_code(partition, status)?.is_empty() {
            debug!("(partition {}) state has changed to {}", partition, status.name());
            changed.push(partition);
        }
    }
    Ok(Outcome::event(PanelEvent::PartitionStateChange { partitions: changed }))
}

/// `%04` (Uno): bypassed zone bitfield.
fn zone_bypass_update(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let zones = decode_zone_bitfield(data, state.num_zones())?;
    let mut bypassed = Vec::new();
    for (idx, on) in zones.iter().enumerate().take(state.num_zones() as usize) {
        let zone = idx as u32 + 1;
        state.set_zone_bypassed(zone, *on)?;
        if *on {
            bypassed.push(zone);
        }
    }
    debug!("Bypassed zones: {:?}", bypassed);
    Ok(Outcome::event(PanelEvent::ZoneBypassUpdate { bypassed }))
}

/// `%03`: realtime Contact-ID report. User open/close reports update the
/// partition's last arming/disarming user.
fn realtime_cid_event(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let cid = CidEvent::parse(data)?;
    info!(
        "CID event: {} ({}), partition {}, {:?} {}",
        cid.label,
        cid.qualifier.description(),
        cid.partition,
        cid.kind,
        cid.zone_or_user
    );

    if (cid.is_user_closing() || cid.is_user_opening())
        && let Ok(p) = state.partition_mut(cid.partition)
    {
        let user = format!("{:03}", cid.zone_or_user);
        if cid.is_user_closing() {
            p.last_armed_by_user = user;
        } else {
            p.last_disarmed_by_user = user;
        }
    }

    Ok(Outcome::event(PanelEvent::RealtimeCidEvent(cid)))
}

/// `%FF` / `615`: per-zone timers.
fn zone_timer_dump(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let timers = decode_zone_timers(data)?;
    for (idx, timer) in timers.iter().enumerate().take(state.num_zones() as usize) {
        let zone = idx as u32 + 1;
        state.apply_zone_status(zone, &ZoneDelta::faulted(timer.is_open()))?;
        state.set_last_fault(zone, timer.seconds())?;
    }
    Ok(Outcome::event(PanelEvent::ZoneTimerDump { timers }))
}

/// `^CC,EE$`: acknowledgement with a result code.
fn command_response(code: &str, data: &str) {
    match TpiResponseCode::from_code(data) {
        Some(rc) if rc.is_success() => debug!("Command {} acknowledged", code),
        Some(rc) => error!("Command {} failed: {}", code, rc),
        None => warn!("Command {} returned unknown result {:?}", code, data),
    }
}

/// DSC `601`..`610`: zone number is the last three data digits.
fn zone_update(response: &ResponseType, data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let delta = response.zone_delta.ok_or_else(|| TpiError::UnknownCode {
        code: response.name.to_string(),
    })?;
    let digits = data.get(data.len().saturating_sub(3)..).unwrap_or("");
    let zone = parse_number(data, digits, "zone")?;
    state.apply_zone_status(zone, &delta)?;
    debug!("(zone {}) {}", zone, response.name);
    Ok(Outcome::event(PanelEvent::ZoneStateChange { zones: vec![zone] }))
}

/// DSC `650`..`674`: partition number is the first data digit.
fn partition_update(
    response: &ResponseType,
    data: &str,
    state: &mut AlarmState,
) -> Result<Outcome> {
    let delta = response.partition_delta.ok_or_else(|| TpiError::UnknownCode {
        code: response.name.to_string(),
    })?;
    let partition = dsc_partition(data)?;
    state.apply_partition_status(partition, &delta)?;
    debug!("(partition {}) {}", partition, response.name);
    Ok(Outcome::event(PanelEvent::PartitionStateChange {
        partitions: vec![partition],
    }))
}

/// DSC `652`: partition digit then arm mode digit.
fn partition_armed(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let partition = dsc_partition(data)?;
    let Some(mode) = data.chars().nth(1).and_then(DscArmMode::from_digit) else {
        return Err(TpiError::frame(data, "missing or unknown arm mode"));
    };

    let mode_flag = match mode {
        DscArmMode::Away | DscArmMode::ZeroEntryAway => P::ARMED_AWAY,
        DscArmMode::Stay | DscArmMode::ZeroEntryStay => P::ARMED_STAY,
    };
    let zero_entry = matches!(mode, DscArmMode::ZeroEntryAway | DscArmMode::ZeroEntryStay);
    let delta = PartitionDelta::new()
        .set(P::ARMED.union(mode_flag))
        .assign(P::ARMED_ZERO_ENTRY_DELAY, zero_entry)
        .clear(P::DELAYS.union(P::READY))
        .alpha(mode.alpha());

    state.apply_partition_status(partition, &delta)?;
    info!("(partition {}) {}", partition, mode.alpha());
    Ok(Outcome::event(PanelEvent::PartitionStateChange {
        partitions: vec![partition],
    }))
}

/// DSC `700`/`750` family: partition digit then four-digit user number.
fn user_report(data: &str, state: &mut AlarmState, closing: bool) -> Result<Outcome> {
    let partition = dsc_partition(data)?;
    let user = data.get(1..).unwrap_or("").to_string();
    let p = state.partition_mut(partition)?;
    if closing {
        info!("(partition {}) armed by user {}", partition, user);
        p.last_armed_by_user = user;
    } else {
        info!("(partition {}) disarmed by user {}", partition, user);
        p.last_disarmed_by_user = user;
    }
    Ok(Outcome::event(PanelEvent::PartitionStateChange {
        partitions: vec![partition],
    }))
}

/// DSC `800`..`841`: system status applied to every partition.
fn general_update(response: &ResponseType, state: &mut AlarmState) -> Result<Outcome> {
    let delta = response.partition_delta.ok_or_else(|| TpiError::UnknownCode {
        code: response.name.to_string(),
    })?;
    state.apply_all_partitions(&delta);
    info!("{}", response.name);
    Ok(Outcome::event(PanelEvent::KeypadUpdate {
        partition: None,
        alpha: response.name.to_string(),
        beep: None,
    }))
}

/// DSC `849`: trouble bitmask, one description per set bit.
fn verbose_trouble(data: &str, state: &mut AlarmState) -> Result<Outcome> {
    let bits = u8::from_str_radix(data.trim(), 16)
        .map_err(|_| TpiError::frame(data, "bad verbose trouble bitmask"))?;
    let troubles: Vec<&str> = DSC_VERBOSE_TROUBLE
        .iter()
        .enumerate()
        .filter(|(bit, _)| bits & (1 << bit) != 0)
        .map(|(_, desc)| *desc)
        .collect();
    let alpha = troubles.join(", ");

    let delta = PartitionDelta::new()
        .assign(P::AC_PRESENT, bits & 0b10 == 0)
        .assign(P::TROUBLE, bits != 0);
    state.apply_all_partitions(&delta);
    if !alpha.is_empty() {
        for id in 1..=state.num_partitions() {
            state.partition_mut(id)?.set_alpha(&alpha);
        }
    }
    warn!("Verbose trouble status: {}", if alpha.is_empty() { "none" } else { &alpha });

    Ok(Outcome::event(PanelEvent::KeypadUpdate {
        partition: None,
        alpha,
        beep: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bitfield::{encode_zone_bitfield, encode_zone_timers};
    use crate::codec::dsc::encode_frame;
    use crate::config::Dialect;

    fn honeywell() -> (Dispatcher, Codec, AlarmState) {
        let codec = Codec::new(Dialect::Honeywell);
        (Dispatcher::new(codec, "user"), codec, AlarmState::initialize(8, 64))
    }

    fn dsc() -> (Dispatcher, Codec, AlarmState) {
        let codec = Codec::new(Dialect::Dsc);
        (Dispatcher::new(codec, "user"), codec, AlarmState::initialize(8, 64))
    }

    fn run(d: &Dispatcher, codec: &Codec, state: &mut AlarmState, line: &str, logged_in: bool) -> Outcome {
        let event = codec.decode(line, logged_in).unwrap();
        d.dispatch(&event, state).unwrap()
    }

    #[test]
    fn test_login_prompt_replies_with_password() {
        let (d, codec, mut state) = honeywell();
        let outcome = run(&d, &codec, &mut state, "Login:", false);
        assert_eq!(outcome.replies, vec!["user"]);
        assert_eq!(outcome.event, None);

        let outcome = run(&d, &codec, &mut state, "OK", false);
        assert_eq!(outcome.signal, Some(SessionSignal::LoggedIn));
        assert_eq!(outcome.event, Some(PanelEvent::LoginSuccess));

        let outcome = run(&d, &codec, &mut state, "FAILED", false);
        assert_eq!(outcome.signal, Some(SessionSignal::LoginRejected));
    }

    #[test]
    fn test_dsc_login_prompt() {
        let (d, codec, mut state) = dsc();
        let outcome = run(&d, &codec, &mut state, &encode_frame("505", "3"), false);
        assert_eq!(outcome.replies, vec![encode_frame("005", "user")]);
        let outcome = run(&d, &codec, &mut state, &encode_frame("505", "2"), false);
        assert_eq!(outcome.signal, Some(SessionSignal::LoginTimedOut));
    }

    #[test]
    fn test_keypad_update_ready() {
        let (d, codec, mut state) = honeywell();
        let outcome = run(
            &d,
            &codec,
            &mut state,
            "%00,01,1C08,08,00,****DISARMED****  Ready to Arm  $",
            true,
        );
        let p = state.partition(1).unwrap();
        assert!(p.is_ready());
        assert!(p.is_ac_present());
        assert!(!p.is_armed_away());
        assert_eq!(p.alpha, "****DISARMED****  Ready to Arm  ");
        assert!(matches!(
            outcome.event,
            Some(PanelEvent::KeypadUpdate { partition: Some(1), beep: Some(BeepMode::Off), .. })
        ));
    }

    #[test]
    fn test_keypad_update_wrong_field_count() {
        let (d, codec, mut state) = honeywell();
        let event = codec.decode("%00,01,1C08,08,00$", true).unwrap();
        assert!(matches!(
            d.dispatch(&event, &mut state),
            Err(TpiError::FrameParse { .. })
        ));
        let before = state.snapshot();
        let event = codec.decode("%00,01,1C08,08,00,A,B$", true).unwrap();
        assert!(d.dispatch(&event, &mut state).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_zone_state_change() {
        let (d, codec, mut state) = honeywell();
        let line = format!("%01,{}$", encode_zone_bitfield(&[5], 64));
        let outcome = run(&d, &codec, &mut state, &line, true);
        assert_eq!(outcome.event, Some(PanelEvent::ZoneStateChange { zones: vec![5] }));
        assert!(state.zone(5).unwrap().is_fault());
        assert!(state.zone(5).unwrap().is_open());
        assert!(!state.zone(4).unwrap().is_open());

        let line = format!("%01,{}$", encode_zone_bitfield(&[], 64));
        run(&d, &codec, &mut state, &line, true);
        assert!(!state.zone(5).unwrap().is_open());
    }

    #[test]
    fn test_partition_state_change_exit_then_armed() {
        let (d, codec, mut state) = honeywell();
        run(&d, &codec, &mut state, "%02,0700000000000000$", true);
        assert!(state.partition(1).unwrap().is_exit_delay());

        let outcome = run(&d, &codec, &mut state, "%02,0500000000000000$", true);
        let p = state.partition(1).unwrap();
        assert!(p.is_armed());
        assert!(p.is_armed_away());
        assert!(!p.is_exit_delay());
        assert!(matches!(
            outcome.event,
            Some(PanelEvent::PartitionStateChange { ref partitions }) if partitions.contains(&1)
        ));
    }

    #[test]
    fn test_cid_user_closing_updates_partition() {
        let (d, codec, mut state) = honeywell();
        run(&d, &codec, &mut state, "%03,340101003$", true);
        assert_eq!(state.partition(1).unwrap().last_armed_by_user, "003");
        run(&d, &codec, &mut state, "%03,140101007$", true);
        assert_eq!(state.partition(1).unwrap().last_disarmed_by_user, "007");
    }

    #[test]
    fn test_zone_timer_dump() {
        let (d, codec, mut state) = honeywell();
        let mut values = vec![0u16; 64];
        values[0] = 0xFFFF;
        values[1] = 0xFFF4;
        let line = format!("%FF,{}$", encode_zone_timers(&values));
        run(&d, &codec, &mut state, &line, true);
        assert!(state.zone(1).unwrap().is_open());
        assert_eq!(state.zone(1).unwrap().last_fault, 0);
        assert!(!state.zone(2).unwrap().is_open());
        assert_eq!(state.zone(2).unwrap().last_fault, 60);
        assert_eq!(state.zone(3).unwrap().last_fault, 327_680);
    }

    #[test]
    fn test_unknown_code_leaves_state() {
        let (d, codec, mut state) = honeywell();
        let before = state.snapshot();
        let event = codec.decode("%7E,00$", true).unwrap();
        assert!(matches!(
            d.dispatch(&event, &mut state),
            Err(TpiError::UnknownCode { .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_command_response_has_no_event() {
        let (d, codec, mut state) = honeywell();
        let outcome = run(&d, &codec, &mut state, "^03,02$", true);
        assert_eq!(outcome, Outcome::default());
    }

    #[test]
    fn test_dsc_zone_and_partition_updates() {
        let (d, codec, mut state) = dsc();
        run(&d, &codec, &mut state, &encode_frame("609", "005"), true);
        assert!(state.zone(5).unwrap().is_open());
        run(&d, &codec, &mut state, &encode_frame("610", "005"), true);
        assert!(!state.zone(5).unwrap().is_open());

        run(&d, &codec, &mut state, &encode_frame("656", "1"), true);
        assert!(state.partition(1).unwrap().is_exit_delay());
        run(&d, &codec, &mut state, &encode_frame("652", "10"), true);
        let p = state.partition(1).unwrap();
        assert!(p.is_armed_away());
        assert!(!p.is_exit_delay());
        assert!(!p.is_ready());
        assert_eq!(p.alpha, "Armed Away");

        run(&d, &codec, &mut state, &encode_frame("655", "1"), true);
        let p = state.partition(1).unwrap();
        assert!(!p.is_armed());
        assert!(!p.is_armed_away());
        assert_eq!(p.alpha, "Disarmed");
    }

    #[test]
    fn test_dsc_armed_without_mode_is_rejected() {
        let (d, codec, mut state) = dsc();
        for data in ["1", "19"] {
            let event = codec.decode(&encode_frame("652", data), true).unwrap();
            let err = d.dispatch(&event, &mut state).unwrap_err();
            assert!(matches!(err, TpiError::FrameParse { .. }));
        }
        let p = state.partition(1).unwrap();
        assert!(!p.is_armed());
        assert!(!p.is_armed_away());

        run(&d, &codec, &mut state, &encode_frame("652", "11"), true);
        let p = state.partition(1).unwrap();
        assert!(p.is_armed());
        assert_eq!(p.alpha, "Armed Stay");
    }

    #[test]
    fn test_dsc_led_and_general_updates() {
        let (d, codec, mut state) = dsc();
        run(&d, &codec, &mut state, &encode_frame("510", "81"), true);
        assert!(state.partition(1).unwrap().is_ready());

        run(&d, &codec, &mut state, &encode_frame("802", "000"), true);
        assert!(state.partitions().iter().all(|p| !p.is_ac_present()));
        run(&d, &codec, &mut state, &encode_frame("803", "000"), true);
        assert!(state.partitions().iter().all(|p| p.is_ac_present()));
    }

    #[test]
    fn test_dsc_verbose_trouble() {
        let (d, codec, mut state) = dsc();
        let outcome = run(&d, &codec, &mut state, &encode_frame("849", "03"), true);
        let p = state.partition(2).unwrap();
        assert!(!p.is_ac_present());
        assert!(p.is_trouble());
        assert_eq!(p.alpha, "Service is Required, AC Power Lost");
        assert!(matches!(outcome.event, Some(PanelEvent::KeypadUpdate { partition: None, .. })));
    }

    #[test]
    fn test_dsc_user_reports() {
        let (d, codec, mut state) = dsc();
        run(&d, &codec, &mut state, &encode_frame("700", "10040"), true);
        assert_eq!(state.partition(1).unwrap().last_armed_by_user, "0040");
        run(&d, &codec, &mut state, &encode_frame("750", "20012"), true);
        assert_eq!(state.partition(2).unwrap().last_disarmed_by_user, "0012");
    }

    #[test]
    fn test_uno_bypass_update() {
        let codec = Codec::new(Dialect::Uno);
        let d = Dispatcher::new(codec, "user");
        let mut state = AlarmState::initialize(1, 64);
        let line = format!("%04,{}$", encode_zone_bitfield(&[2, 10], 64));
        let outcome = run(&d, &codec, &mut state, &line, true);
        assert_eq!(
            outcome.event,
            Some(PanelEvent::ZoneBypassUpdate { bypassed: vec![2, 10] })
        );
        assert_eq!(state.zone(2).unwrap().bypassed, Some(true));
        assert_eq!(state.zone(3).unwrap().bypassed, Some(false));
    }
}
