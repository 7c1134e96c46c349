// MIT License - Copyright (c) 2021 TJForc
// End-to-end tests: a real Session against the in-process PanelSimulator

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::Instant;

use envisalink_tpi::codec::dsc::encode_frame;
use envisalink_tpi::{
    AlarmState, Command, Dialect, PanelEvent, PanelSimulator, Session, SessionConfig,
    SessionState, SimulatorConfig,
};

const CODE: &str = "1234";
const TIMEOUT_MS: u64 = 5000;

async fn start_simulator(dialect: Dialect) -> PanelSimulator {
    let config = SimulatorConfig::builder()
        .dialect(dialect)
        .port(0)
        .alarm_code(CODE)
        .tick_ms(50)
        .arm_delay_ticks(3)
        .keypad_interval_ms(200)
        .build();
    PanelSimulator::start(config).await.unwrap()
}

fn session_config(sim: &PanelSimulator, dialect: Dialect, password: &str) -> SessionConfig {
    SessionConfig::builder()
        .host("127.0.0.1")
        .port(sim.local_addr().port())
        .dialect(dialect)
        .password(password)
        .partitions(1)
        .reconnect_delay_ms(100)
        .connect_timeout_ms(1000)
        .build()
}

/// Poll `check` against the session every 20 ms until it holds or the timeout passes.
async fn wait_for_session(session: &Session, check: impl Fn(&Session) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(TIMEOUT_MS);
    while Instant::now() < deadline {
        if check(session) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Poll `check` against alarm state snapshots.
async fn wait_for_partition(session: &Session, check: impl Fn(&AlarmState) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(TIMEOUT_MS);
    while Instant::now() < deadline {
        if check(&session.snapshot().await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn logged_in(session: &Session) -> bool {
    wait_for_session(session, |s| s.state() == SessionState::LoggedIn).await
}

fn ready(state: &AlarmState) -> bool {
    state.partition(1).is_some_and(|p| p.is_ready() && !p.is_armed())
}

/// Config pointed at an arbitrary local port.
fn port_config(port: u16, dialect: Dialect, reconnect_delay_ms: u64) -> SessionConfig {
    SessionConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .dialect(dialect)
        .password("user")
        .partitions(1)
        .reconnect_delay_ms(reconnect_delay_ms)
        .connect_timeout_ms(1000)
        .build()
}

/// A local port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Scripted panel: sends `prompt`, waits for the password line, answers with
/// `replies` and hangs up. Returns the port and a count of accepted connections.
async fn scripted_panel(prompt: String, replies: Vec<String>) -> (u16, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicU32::new(0));
    let count = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            count.fetch_add(1, Ordering::SeqCst);
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let _ = writer.write_all(format!("{prompt}\r\n").as_bytes()).await;
            let _ = lines.next_line().await;
            for reply in &replies {
                let _ = writer.write_all(format!("{reply}\r\n").as_bytes()).await;
            }
            let _ = writer.shutdown().await;
        }
    });
    (port, accepted)
}

async fn wait_for_event(events: &mut envisalink_tpi::EventReceiver, wanted: PanelEvent) -> bool {
    tokio::time::timeout(Duration::from_millis(TIMEOUT_MS), async {
        loop {
            match events.recv().await {
                Ok(event) if event == wanted => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false)
}

#[tokio::test]
async fn test_honeywell_arm_away_then_disarm() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "user"));
    session.start();

    assert!(logged_in(&session).await);
    assert!(wait_for_partition(&session, ready).await, "never became ready");

    session.arm_away(CODE, 1).await.unwrap();
    let armed = wait_for_partition(&session, |s| {
        s.partition(1)
            .is_some_and(|p| p.is_armed() && p.is_armed_away() && !p.is_ready())
    })
    .await;
    assert!(armed, "never armed away");
    assert!(!sim.handle().ready(1).await.unwrap());
    assert!(
        wait_for_partition(&session, |s| {
            s.partition(1).is_some_and(|p| p.last_armed_by_user == "001")
        })
        .await
    );

    session.disarm(CODE, 1).await.unwrap();
    assert!(wait_for_partition(&session, ready).await, "never disarmed");
    assert!(sim.handle().ready(1).await.unwrap());
    let state = session.snapshot().await;
    let partition = state.partition(1).unwrap();
    assert!(!partition.is_armed_away());
    assert_eq!(partition.last_disarmed_by_user, "001");

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_fault_and_clear_zone() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let handle = sim.handle();
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "user"));
    session.start();

    assert!(logged_in(&session).await);
    assert!(wait_for_partition(&session, ready).await);

    handle.fault(&[5]).await.unwrap();
    let faulted = wait_for_partition(&session, |s| {
        s.zone(5).is_some_and(|z| z.is_open() && z.is_fault())
            && s.partition(1).is_some_and(|p| !p.is_ready())
    })
    .await;
    assert!(faulted, "zone 5 fault never reached the client");
    assert!(!handle.ready(1).await.unwrap());
    let zones = handle.zone_info().await.unwrap();
    assert_eq!(zones[4], (5, true));
    assert!(zones.iter().filter(|(_, f)| *f).count() == 1);

    // Arming is refused while a zone is faulted
    session.arm_away(CODE, 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!session.snapshot().await.partition(1).unwrap().is_armed());

    handle.clear(&[5]).await.unwrap();
    let cleared = wait_for_partition(&session, |s| {
        s.zone(5).is_some_and(|z| !z.is_open() && !z.is_fault()) && ready(s)
    })
    .await;
    assert!(cleared, "zone 5 restore never reached the client");
    assert!(handle.ready(1).await.unwrap());

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_once_after_server_disconnect() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "user"));
    session.start();

    assert!(logged_in(&session).await);
    assert_eq!(session.connect_attempts(), 1);

    sim.handle().disconnect_client().await.unwrap();
    let reconnected = wait_for_session(&session, |s| {
        s.connect_attempts() == 2 && s.state() == SessionState::LoggedIn
    })
    .await;
    assert!(reconnected, "session did not reconnect");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.connect_attempts(), 2);
    assert_eq!(session.state(), SessionState::LoggedIn);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    sim.shutdown().await;
}

#[tokio::test]
async fn test_login_failure_does_not_reconnect() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "wrong"));
    let mut events = session.subscribe();
    session.start();

    let failed = tokio::time::timeout(Duration::from_millis(TIMEOUT_MS), async {
        loop {
            match events.recv().await {
                Ok(PanelEvent::LoginFailure) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(failed, "no login failure reported");

    // Several reconnect delays pass without another attempt
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.connect_attempts(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.arm_away(CODE, 1).await.is_err());

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_login_timeout_does_not_reconnect() {
    let (port, accepted) =
        scripted_panel("Login:".to_string(), vec!["Timed Out!".to_string()]).await;
    let mut session = Session::new(port_config(port, Dialect::Honeywell, 100));
    let mut events = session.subscribe();
    session.start();

    assert!(wait_for_event(&mut events, PanelEvent::LoginTimeout).await);
    assert!(wait_for_session(&session, |s| s.state() == SessionState::Disconnected).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.connect_attempts(), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Disconnected);

    session.stop().await;
}

#[tokio::test]
async fn test_dsc_login_timeout_does_not_reconnect() {
    let (port, accepted) = scripted_panel(
        encode_frame("505", "3"),
        vec![encode_frame("500", "005"), encode_frame("505", "2")],
    )
    .await;
    let mut session = Session::new(port_config(port, Dialect::Dsc, 100));
    let mut events = session.subscribe();
    session.start();

    assert!(wait_for_event(&mut events, PanelEvent::LoginTimeout).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.connect_attempts(), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Disconnected);

    session.stop().await;
}

#[tokio::test]
async fn test_failed_connect_is_retried() {
    let port = closed_port().await;
    let mut session = Session::new(port_config(port, Dialect::Honeywell, 100));
    session.start();

    let retried = wait_for_session(&session, |s| s.connect_attempts() >= 3).await;
    assert!(retried, "refused connects were not retried");
    assert_ne!(session.state(), SessionState::LoggedIn);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_stop_during_reconnect_delay() {
    let port = closed_port().await;
    let mut session = Session::new(port_config(port, Dialect::Honeywell, 60_000));
    session.start();

    assert!(wait_for_session(&session, |s| s.connect_attempts() == 1
        && s.state() == SessionState::Disconnected)
    .await);

    // Returns without waiting out the delay
    tokio::time::timeout(Duration::from_millis(TIMEOUT_MS), session.stop())
        .await
        .expect("stop waited for the reconnect delay");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(session.connect_attempts(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_stop_while_awaiting_login() {
    // Accepts through the backlog but never sends a prompt
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut session = Session::new(port_config(port, Dialect::Honeywell, 100));
    session.start();

    assert!(wait_for_session(&session, |s| s.state() == SessionState::AwaitingLogin).await);
    tokio::time::timeout(Duration::from_millis(TIMEOUT_MS), session.stop())
        .await
        .expect("stop hung on a pending login");

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.connect_attempts(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
    drop(listener);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "user"));
    session.start();
    assert!(logged_in(&session).await);
    assert_eq!(session.connect_attempts(), 1);

    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    session.start();
    assert!(logged_in(&session).await, "session did not come back after stop");
    assert_eq!(session.connect_attempts(), 2);
    assert!(wait_for_partition(&session, ready).await);

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_restart_after_rejected_login() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "wrong"));
    let mut events = session.subscribe();
    session.start();
    assert!(wait_for_event(&mut events, PanelEvent::LoginFailure).await);
    assert!(wait_for_session(&session, |s| s.state() == SessionState::Disconnected).await);
    assert_eq!(session.connect_attempts(), 1);

    // The finished supervisor does not block a new start
    session.start();
    assert!(wait_for_event(&mut events, PanelEvent::LoginFailure).await);
    assert_eq!(session.connect_attempts(), 2);

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_login_status_and_arm() {
    let mut sim = start_simulator(Dialect::Dsc).await;
    let handle = sim.handle();
    let mut session = Session::new(session_config(&sim, Dialect::Dsc, "user"));
    session.start();

    assert!(logged_in(&session).await);
    session.send_command(Command::StatusReport).await.unwrap();
    assert!(wait_for_partition(&session, ready).await, "status report never arrived");

    handle.fault(&[7]).await.unwrap();
    assert!(
        wait_for_partition(&session, |s| {
            s.zone(7).is_some_and(|z| z.is_open()) && s.partition(1).is_some_and(|p| !p.is_ready())
        })
        .await
    );
    handle.clear(&[7]).await.unwrap();
    assert!(wait_for_partition(&session, ready).await);

    session.arm_away(CODE, 1).await.unwrap();
    let armed = wait_for_partition(&session, |s| {
        s.partition(1)
            .is_some_and(|p| p.is_armed() && p.is_armed_away() && !p.is_ready() && !p.is_exit_delay())
    })
    .await;
    assert!(armed, "DSC partition never armed");
    assert_eq!(session.snapshot().await.partition(1).unwrap().alpha, "Armed Away");

    session.disarm(CODE, 1).await.unwrap();
    assert!(wait_for_partition(&session, ready).await, "DSC partition never disarmed");

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_zone_timer_dump() {
    let mut sim = start_simulator(Dialect::Dsc).await;
    let mut session = Session::new(session_config(&sim, Dialect::Dsc, "user"));
    let mut events = session.subscribe();
    session.start();

    assert!(logged_in(&session).await);
    sim.handle().fault(&[2]).await.unwrap();
    session.dump_zone_timers().await.unwrap();

    let timers = tokio::time::timeout(Duration::from_millis(TIMEOUT_MS), async {
        loop {
            if let Ok(PanelEvent::ZoneTimerDump { timers }) = events.recv().await {
                return timers;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(timers.len(), 64);
    assert!(timers[1].is_open());
    assert!(!timers[0].is_open());

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_uno_bypass_restores_readiness() {
    let mut sim = start_simulator(Dialect::Uno).await;
    let handle = sim.handle();
    let mut session = Session::new(session_config(&sim, Dialect::Uno, "user"));
    session.start();

    assert!(logged_in(&session).await);
    assert!(wait_for_partition(&session, ready).await);

    handle.fault(&[3]).await.unwrap();
    assert!(
        wait_for_partition(&session, |s| s.partition(1).is_some_and(|p| !p.is_ready())).await
    );

    session.bypass_zone(3).await.unwrap();
    let bypassed = wait_for_partition(&session, |s| {
        s.zone(3).is_some_and(|z| z.is_bypassed()) && s.partition(1).is_some_and(|p| p.is_ready())
    })
    .await;
    assert!(bypassed, "bypass never reached the client");
    assert!(handle.ready(1).await.unwrap());

    session.unbypass_zone(3).await.unwrap();
    let unbypassed = wait_for_partition(&session, |s| {
        s.zone(3).is_some_and(|z| z.bypassed == Some(false))
            && s.partition(1).is_some_and(|p| !p.is_ready())
    })
    .await;
    assert!(unbypassed, "unbypass never reached the client");

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_uno_direct_arm_stay() {
    let mut sim = start_simulator(Dialect::Uno).await;
    let mut session = Session::new(session_config(&sim, Dialect::Uno, "user"));
    session.start();

    assert!(logged_in(&session).await);
    assert!(wait_for_partition(&session, ready).await);

    session.arm_stay(CODE, 1).await.unwrap();
    assert!(
        wait_for_partition(&session, |s| {
            s.partition(1).is_some_and(|p| p.is_armed() && p.is_armed_stay())
        })
        .await
    );

    session.disarm(CODE, 1).await.unwrap();
    assert!(wait_for_partition(&session, ready).await);

    session.stop().await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_bypass_is_unsupported_on_honeywell() {
    let mut sim = start_simulator(Dialect::Honeywell).await;
    let mut session = Session::new(session_config(&sim, Dialect::Honeywell, "user"));
    session.start();

    assert!(logged_in(&session).await);
    let err = session.bypass_zone(3).await.unwrap_err();
    assert!(matches!(err, envisalink_tpi::TpiError::Unsupported { .. }));

    session.stop().await;
    sim.shutdown().await;
}
