// MIT License - Copyright (c) 2021 TJForc
// Envisalink monitor: logs panel events and periodic state snapshots

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use envisalink_tpi::{
    AlarmState, CallbackKind, Dialect, PanelEvent, Session, SessionConfig, SessionState,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "envisalink-monitor")]
#[command(about = "Connect to an Envisalink module and log alarm panel activity")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    #[serde(default)]
    monitor: MonitorToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u32, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    /// "honeywell", "dsc" or "uno"
    #[serde(default = "default_dialect")]
    dialect: String,
    #[serde(default = "default_username")]
    username: String,
    #[serde(default = "default_password")]
    password: String,
    #[serde(default = "default_keepalive_interval")]
    keepalive_interval_ms: u64,
    #[serde(default)]
    zone_timer_dump_interval_ms: u64,
    #[serde(default = "default_protocol_version")]
    protocol_version: u8,
    #[serde(default = "default_partitions")]
    partitions: u32,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
}

fn default_port() -> u16 {
    4025
}
fn default_dialect() -> String {
    "honeywell".to_string()
}
fn default_username() -> String {
    "user".to_string()
}
fn default_password() -> String {
    "user".to_string()
}
fn default_keepalive_interval() -> u64 {
    30000
}
fn default_protocol_version() -> u8 {
    3
}
fn default_partitions() -> u32 {
    8
}
fn default_reconnect_delay() -> u64 {
    5000
}
fn default_connect_timeout() -> u64 {
    10000
}

#[derive(Debug, Deserialize)]
struct MonitorToml {
    #[serde(default = "default_snapshot_interval")]
    snapshot_interval_secs: u64,
    /// Only partitions up to this number appear in snapshots
    #[serde(default = "default_snapshot_partitions")]
    snapshot_partitions: u32,
}

impl Default for MonitorToml {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: default_snapshot_interval(),
            snapshot_partitions: default_snapshot_partitions(),
        }
    }
}

fn default_snapshot_interval() -> u64 {
    60
}
fn default_snapshot_partitions() -> u32 {
    1
}

fn build_session_config(toml: &PanelToml) -> Result<SessionConfig> {
    let dialect: Dialect = toml
        .dialect
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    Ok(SessionConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .dialect(dialect)
        .username(&toml.username)
        .password(&toml.password)
        .keepalive_interval_ms(toml.keepalive_interval_ms)
        .zone_timer_dump_interval_ms(toml.zone_timer_dump_interval_ms)
        .protocol_version(toml.protocol_version)
        .partitions(toml.partitions)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .build())
}

// ---------------------------------------------------------------------------
// Snapshot JSON
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Snapshot {
    state: String,
    parts: Vec<PartitionSnapshot>,
    /// Zones that are open, faulted, alarmed, tampered or bypassed
    zones: Vec<ZoneSnapshot>,
}

#[derive(Serialize)]
struct PartitionSnapshot {
    id: u32,
    alpha: String,
    ready: bool,
    #[serde(rename = "armAway")]
    arm_away: bool,
    #[serde(rename = "armStay")]
    arm_stay: bool,
    #[serde(rename = "armMax")]
    arm_max: bool,
    #[serde(rename = "exitDelay")]
    exit_delay: bool,
    #[serde(rename = "entryDelay")]
    entry_delay: bool,
    alarm: bool,
    trouble: bool,
    #[serde(rename = "lastArmedBy", skip_serializing_if = "String::is_empty")]
    last_armed_by: String,
    #[serde(rename = "lastDisarmedBy", skip_serializing_if = "String::is_empty")]
    last_disarmed_by: String,
}

#[derive(Serialize)]
struct ZoneSnapshot {
    id: u32,
    name: String,
    open: bool,
    fault: bool,
    alarm: bool,
    tamper: bool,
    bypass: bool,
    #[serde(rename = "lastFault")]
    last_fault: u32,
}

fn zone_label(zone_id: u32, overrides: &HashMap<u32, String>) -> String {
    overrides
        .get(&zone_id)
        .cloned()
        .unwrap_or_else(|| format!("Zone {zone_id}"))
}

fn build_snapshot(
    session_state: SessionState,
    alarm: &AlarmState,
    partitions: u32,
    zone_names: &HashMap<u32, String>,
) -> Snapshot {
    let parts = alarm
        .partitions()
        .iter()
        .filter(|p| p.id <= partitions)
        .map(|p| PartitionSnapshot {
            id: p.id,
            alpha: p.alpha.clone(),
            ready: p.is_ready(),
            arm_away: p.is_armed_away(),
            arm_stay: p.is_armed_stay(),
            arm_max: p.is_armed_max(),
            exit_delay: p.is_exit_delay(),
            entry_delay: p.is_entry_delay(),
            alarm: p.is_alarm(),
            trouble: p.is_trouble(),
            last_armed_by: p.last_armed_by_user.clone(),
            last_disarmed_by: p.last_disarmed_by_user.clone(),
        })
        .collect();

    let zones = alarm
        .zones()
        .iter()
        .filter(|z| !z.status.is_empty() || z.is_bypassed())
        .map(|z| ZoneSnapshot {
            id: z.id,
            name: zone_label(z.id, zone_names),
            open: z.is_open(),
            fault: z.is_fault(),
            alarm: z.is_alarm(),
            tamper: z.is_tamper(),
            bypass: z.is_bypassed(),
            last_fault: z.last_fault,
        })
        .collect();

    Snapshot {
        state: format!("{:?}", session_state),
        parts,
        zones,
    }
}

async fn log_snapshot(session: &Session, partitions: u32, zone_names: &HashMap<u32, String>) {
    let alarm = session.snapshot().await;
    let snapshot = build_snapshot(session.state(), &alarm, partitions, zone_names);
    match serde_json::to_string(&snapshot) {
        Ok(json) => info!("Snapshot: {json}"),
        Err(e) => error!("Failed to serialize snapshot: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Event handling
// ---------------------------------------------------------------------------

/// Route every callback kind to the log, naming zones where possible.
async fn install_callbacks(session: &Session, zone_names: Arc<HashMap<u32, String>>) {
    for kind in CallbackKind::ALL {
        let names = Arc::clone(&zone_names);
        session
            .set_callback(
                kind,
                Arc::new(move |event: &PanelEvent| log_event(event, &names)),
            )
            .await;
    }
}

fn log_event(event: &PanelEvent, zone_names: &HashMap<u32, String>) {
    match event {
        PanelEvent::LoginSuccess => info!("Logged in to the Envisalink"),
        PanelEvent::LoginFailure => error!("Envisalink rejected the password"),
        PanelEvent::LoginTimeout => error!("Envisalink login timed out"),
        PanelEvent::KeypadUpdate {
            partition, alpha, ..
        } => match partition {
            Some(p) => info!("Keypad (partition {p}): {}", alpha.trim_end()),
            None => info!("Keypad: {}", alpha.trim_end()),
        },
        PanelEvent::ZoneStateChange { zones } => {
            for zone in zones {
                info!("Zone changed: {}", zone_label(*zone, zone_names));
            }
        }
        PanelEvent::PartitionStateChange { partitions } => {
            info!("Partitions changed: {partitions:?}");
        }
        PanelEvent::ZoneBypassUpdate { bypassed } => {
            let names: Vec<String> = bypassed.iter().map(|z| zone_label(*z, zone_names)).collect();
            info!("Bypassed zones: {names:?}");
        }
        PanelEvent::RealtimeCidEvent(cid) => {
            info!(
                "CID {} {}: partition {}, {:?} {}",
                cid.code, cid.label, cid.partition, cid.kind, cid.zone_or_user
            );
        }
        PanelEvent::ZoneTimerDump { timers } => {
            let open = timers.iter().filter(|t| t.is_open()).count();
            debug!("Zone timer dump: {} zones, {} open", timers.len(), open);
        }
        PanelEvent::Connected | PanelEvent::Disconnected => {}
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn load_config(path: &str) -> Result<Config> {
    let config_text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&config_text).context("Failed to parse config file")
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=envisalink_tpi=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    let mut session_config = build_session_config(&config.panel)?;

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    loop {
        let zone_names = Arc::new(config.zone_names.clone());
        let snapshot_partitions = config.monitor.snapshot_partitions;
        let snapshot_interval_secs = config.monitor.snapshot_interval_secs.max(1);

        info!(
            "Connecting to {} Envisalink at {}:{}",
            session_config.dialect, session_config.host, session_config.port
        );
        let mut session = Session::new(session_config.clone());
        install_callbacks(&session, Arc::clone(&zone_names)).await;
        let mut events = session.subscribe();
        let mut states = session.subscribe_state();
        session.start();

        let mut ticker = interval(Duration::from_secs(snapshot_interval_secs));
        // The first tick fires immediately; there is nothing to report yet
        ticker.tick().await;

        info!("Monitor running. Send SIGHUP to reload, SIGINT/SIGTERM to stop.");
        let restart = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    log_snapshot(&session, snapshot_partitions, &zone_names).await;
                }
                event = events.recv() => match event {
                    Ok(PanelEvent::Connected) => info!("Connected"),
                    Ok(PanelEvent::Disconnected) => warn!("Disconnected"),
                    Ok(PanelEvent::LoginSuccess) => {
                        log_snapshot(&session, snapshot_partitions, &zone_names).await;
                    }
                    // The session does not reconnect after a refused login
                    Ok(PanelEvent::LoginFailure | PanelEvent::LoginTimeout) => {
                        error!("Login refused, exiting");
                        break false;
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break false;
                    }
                },
                changed = states.changed() => {
                    if changed.is_err() {
                        break false;
                    }
                    debug!("Session state: {:?}", *states.borrow_and_update());
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down...");
                    break false;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break false;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading config and reconnecting...");
                    break true;
                }
            }
        };

        session.stop().await;

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => match build_session_config(&new_config.panel) {
                Ok(new_session_config) => {
                    session_config = new_session_config;
                    config = new_config;
                    info!("Config reloaded successfully");
                }
                Err(e) => warn!("Invalid panel config in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }
    }

    info!("Shutdown complete");
    Ok(())
}
