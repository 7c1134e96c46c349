// MIT License - Copyright (c) 2021 TJForc
// Stand-alone Envisalink panel simulator

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use envisalink_tpi::{Dialect, PanelSimulator, SimulatorConfig};

#[derive(Parser)]
#[command(name = "evl-sim")]
#[command(about = "Simulate an Envisalink module and its alarm panel")]
struct Cli {
    /// Panel dialect: honeywell, dsc or uno
    #[arg(long, default_value = "honeywell")]
    dialect: Dialect,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// TPI port
    #[arg(long, default_value_t = 4025)]
    port: u16,

    /// Test-control port; omit to disable the control interface
    #[arg(long)]
    control_port: Option<u16>,

    /// TPI password clients must send
    #[arg(long, default_value = "user")]
    password: String,

    /// User code for keypad arm/disarm sequences
    #[arg(long, default_value = "1234")]
    code: String,

    #[arg(long, default_value_t = 64)]
    zones: u32,

    #[arg(long, default_value_t = 1)]
    partitions: u32,

    /// Countdown step while arming, in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Keypad broadcast period, in milliseconds
    #[arg(long, default_value_t = 5000)]
    keypad_interval_ms: u64,

    /// Exit delay length in ticks
    #[arg(long, default_value_t = 5)]
    arm_delay_ticks: u32,

    /// Drop clients that have not logged in after this many milliseconds
    #[arg(long)]
    login_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let mut builder = SimulatorConfig::builder()
        .dialect(cli.dialect)
        .bind_host(cli.bind)
        .port(cli.port)
        .password(cli.password)
        .alarm_code(cli.code)
        .zones(cli.zones)
        .partitions(cli.partitions)
        .tick_ms(cli.tick_ms)
        .keypad_interval_ms(cli.keypad_interval_ms)
        .arm_delay_ticks(cli.arm_delay_ticks);
    if let Some(port) = cli.control_port {
        builder = builder.control_port(port);
    }
    if let Some(ms) = cli.login_timeout_ms {
        builder = builder.login_timeout_ms(ms);
    }

    let mut simulator = PanelSimulator::start(builder.build())
        .await
        .context("Failed to start simulator")?;
    info!("TPI listening on {}", simulator.local_addr());
    if let Some(addr) = simulator.control_addr() {
        info!("Control interface on {}", addr);
    }

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }

    simulator.shutdown().await;
    Ok(())
}
