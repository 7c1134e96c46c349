//! Example: Arm and disarm a partition against a local simulated panel.

use std::time::Duration;

use envisalink_tpi::{
    Dialect, PanelEvent, PanelSimulator, Session, SessionConfig, SimulatorConfig,
};

const CODE: &str = "1234";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut simulator = PanelSimulator::start(
        SimulatorConfig::builder()
            .dialect(Dialect::Honeywell)
            .port(0)
            .alarm_code(CODE)
            .tick_ms(500)
            .arm_delay_ticks(3)
            .build(),
    )
    .await?;

    let config = SessionConfig::builder()
        .host("127.0.0.1")
        .port(simulator.local_addr().port())
        .dialect(Dialect::Honeywell)
        .partitions(1)
        .build();
    let mut session = Session::new(config);
    let mut events = session.subscribe();
    session.start();

    while !matches!(events.recv().await?, PanelEvent::LoginSuccess) {}

    // Show current partition state
    let print_partition = |label: &str, state: &envisalink_tpi::AlarmState| {
        if let Some(part) = state.partition(1) {
            println!(
                "{label}: {:32} (ready={}, armed={}, away={}, exit delay={})",
                part.alpha.trim_end(),
                part.is_ready(),
                part.is_armed(),
                part.is_armed_away(),
                part.is_exit_delay(),
            );
        }
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    print_partition("Before", &session.snapshot().await);

    println!("Arming partition 1 (away)...");
    session.arm_away(CODE, 1).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    print_partition("Arming", &session.snapshot().await);
    tokio::time::sleep(Duration::from_secs(2)).await;
    print_partition("Armed", &session.snapshot().await);

    println!("Disarming partition 1...");
    session.disarm(CODE, 1).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    print_partition("After", &session.snapshot().await);

    session.stop().await;
    simulator.shutdown().await;
    Ok(())
}
