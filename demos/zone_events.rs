//! Example: Subscribe to zone events and print each zone's new status.

use std::sync::Arc;

use envisalink_tpi::{CallbackKind, Dialect, PanelEvent, Session, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = SessionConfig::builder()
        .host("192.168.0.50")
        .dialect(Dialect::Dsc)
        .password("user")
        .zone_timer_dump_interval_ms(60_000)
        .build();

    let mut session = Session::new(config);
    // Zone updates go to subscribers below; silence the default callback log
    session
        .set_callback(CallbackKind::ZoneStateChange, Arc::new(|_: &PanelEvent| {}))
        .await;
    let mut events = session.subscribe();
    session.start();

    println!("Listening for zone events (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(PanelEvent::ZoneStateChange { zones }) => {
                        let state = session.snapshot().await;
                        for zone in zones.iter().filter_map(|id| state.zone(*id)) {
                            let names: Vec<&str> = zone.status.iter_names().map(|(name, _)| name).collect();
                            println!("Zone {} status: {:?}", zone.id, names);
                        }
                    }
                    Ok(PanelEvent::ZoneTimerDump { timers }) => {
                        let open = timers.iter().filter(|t| t.is_open()).count();
                        println!("Zone timers: {} zones, {} open", timers.len(), open);
                    }
                    Ok(PanelEvent::Disconnected) => {
                        println!("Envisalink disconnected, the session will reconnect");
                    }
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    session.stop().await;
    Ok(())
}
