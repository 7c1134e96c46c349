//! Example: Connect to an Envisalink module and print panel status.

use envisalink_tpi::{Dialect, PanelEvent, Session, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = SessionConfig::builder()
        .host("192.168.0.50")
        .port(4025)
        .dialect(Dialect::Honeywell)
        .password("user")
        .build();

    println!("Connecting to Envisalink...");
    let mut session = Session::new(config);
    let mut events = session.subscribe();
    session.start();

    // Wait for the login and the first keypad update
    loop {
        match events.recv().await? {
            PanelEvent::LoginSuccess => println!("Logged in"),
            PanelEvent::LoginFailure | PanelEvent::LoginTimeout => {
                anyhow::bail!("login refused");
            }
            PanelEvent::KeypadUpdate { .. } => break,
            _ => {}
        }
    }

    let state = session.snapshot().await;

    println!("\n--- Partitions ({}) ---", state.num_partitions());
    for part in state.partitions() {
        println!(
            "  Partition {}: {:32} ready={} armed={} stay={} away={}",
            part.id,
            part.alpha,
            part.is_ready(),
            part.is_armed(),
            part.is_armed_stay(),
            part.is_armed_away(),
        );
    }

    println!("\n--- Open zones ---");
    for zone in state.zones().iter().filter(|z| z.is_open() || z.is_fault()) {
        println!("  Zone {:3}: open={} fault={}", zone.id, zone.is_open(), zone.is_fault());
    }

    println!("\nPress Ctrl+C to disconnect...");
    tokio::signal::ctrl_c().await?;
    session.stop().await;
    println!("Disconnected.");

    Ok(())
}
