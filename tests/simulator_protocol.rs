// MIT License - Copyright (c) 2021 TJForc
// Wire-level tests: raw TCP clients against the panel simulator

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use envisalink_tpi::codec::dsc::encode_frame;
use envisalink_tpi::{Dialect, DscLedFlags, PanelSimulator, SimulatorConfig};

struct RawClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line from the server, `None` at EOF.
    async fn recv(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(None)
            .map(|l| l.trim_end_matches('\r').to_string())
    }

    /// Next line that is not a periodic keypad update.
    async fn recv_skipping_keypad(&mut self) -> Option<String> {
        loop {
            let line = self.recv().await?;
            if !line.starts_with("%00,") {
                return Some(line);
            }
        }
    }
}

async fn start(dialect: Dialect, control: bool) -> PanelSimulator {
    let mut builder = SimulatorConfig::builder()
        .dialect(dialect)
        .port(0)
        .keypad_interval_ms(60_000);
    if control {
        builder = builder.control_port(0);
    }
    PanelSimulator::start(builder.build()).await.unwrap()
}

async fn honeywell_login(addr: SocketAddr) -> RawClient {
    let mut client = RawClient::connect(addr).await;
    assert_eq!(client.recv().await.as_deref(), Some("Login:"));
    client.send("user").await;
    assert_eq!(client.recv().await.as_deref(), Some("OK"));
    client
}

#[tokio::test]
async fn test_second_connection_is_refused() {
    let mut sim = start(Dialect::Honeywell, false).await;
    let _first = honeywell_login(sim.local_addr()).await;

    let mut second = RawClient::connect(sim.local_addr()).await;
    assert_eq!(second.recv().await, None);

    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_bad_password_closes() {
    let mut sim = start(Dialect::Honeywell, false).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    assert_eq!(client.recv().await.as_deref(), Some("Login:"));
    client.send("nope").await;
    assert_eq!(client.recv().await.as_deref(), Some("FAILED"));
    assert_eq!(client.recv().await, None);

    // The slot is free again
    let _client = honeywell_login(sim.local_addr()).await;
    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_unknown_command() {
    let mut sim = start(Dialect::Honeywell, false).await;
    let mut client = honeywell_login(sim.local_addr()).await;

    client.send("^7F$").await;
    assert_eq!(client.recv_skipping_keypad().await.as_deref(), Some("^7F,02$"));

    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_uno_only_commands_rejected() {
    let mut sim = start(Dialect::Honeywell, false).await;
    let mut client = honeywell_login(sim.local_addr()).await;

    client.send("^04,03$").await;
    assert_eq!(client.recv_skipping_keypad().await.as_deref(), Some("^04,02$"));

    sim.shutdown().await;
}

#[tokio::test]
async fn test_honeywell_zone_timer_dump() {
    let mut sim = start(Dialect::Honeywell, false).await;
    let mut client = honeywell_login(sim.local_addr()).await;

    client.send("^02$").await;
    assert_eq!(client.recv_skipping_keypad().await.as_deref(), Some("^02,00$"));
    let dump = client.recv_skipping_keypad().await.unwrap();
    let expected = format!("%FF,{}$", "FEFF".repeat(64));
    assert_eq!(dump, expected);

    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_login_and_bad_checksum() {
    let mut sim = start(Dialect::Dsc, false).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    assert_eq!(client.recv().await, Some(encode_frame("505", "3")));

    client.send(&encode_frame("005", "user")).await;
    assert_eq!(client.recv().await, Some(encode_frame("500", "005")));
    assert_eq!(client.recv().await, Some(encode_frame("505", "1")));

    client.send("00091").await;
    assert_eq!(client.recv().await, Some(encode_frame("501", "")));

    client.send(&encode_frame("000", "")).await;
    assert_eq!(client.recv().await, Some(encode_frame("500", "000")));

    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_bad_password_closes() {
    let mut sim = start(Dialect::Dsc, false).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    assert_eq!(client.recv().await, Some(encode_frame("505", "3")));

    client.send(&encode_frame("005", "guess")).await;
    assert_eq!(client.recv().await, Some(encode_frame("500", "005")));
    assert_eq!(client.recv().await, Some(encode_frame("505", "0")));
    assert_eq!(client.recv().await, None);

    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_zone_fault_reaches_client() {
    let mut sim = start(Dialect::Dsc, false).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    client.recv().await;
    client.send(&encode_frame("005", "user")).await;
    client.recv().await;
    client.recv().await;

    sim.handle().fault(&[12]).await.unwrap();
    assert_eq!(client.recv().await, Some(encode_frame("609", "012")));
    assert_eq!(client.recv().await, Some(encode_frame("651", "1")));
    let not_ready = encode_frame("510", &DscLedFlags::BACKLIGHT.to_hex());
    assert_eq!(client.recv().await, Some(not_ready.clone()));

    // Readiness is unchanged, the LED frame still follows
    sim.handle().fault(&[13]).await.unwrap();
    assert_eq!(client.recv().await, Some(encode_frame("609", "013")));
    assert_eq!(client.recv().await, Some(not_ready));

    sim.handle().clear(&[12]).await.unwrap();
    assert_eq!(client.recv().await, Some(encode_frame("610", "012")));
    assert_eq!(
        client.recv().await,
        Some(encode_frame("510", &DscLedFlags::BACKLIGHT.to_hex()))
    );

    sim.shutdown().await;
}

async fn start_with_login_timeout(dialect: Dialect) -> PanelSimulator {
    let config = SimulatorConfig::builder()
        .dialect(dialect)
        .port(0)
        .keypad_interval_ms(60_000)
        .login_timeout_ms(200)
        .build();
    PanelSimulator::start(config).await.unwrap()
}

#[tokio::test]
async fn test_honeywell_login_timeout_closes() {
    let mut sim = start_with_login_timeout(Dialect::Honeywell).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    assert_eq!(client.recv().await.as_deref(), Some("Login:"));
    assert_eq!(client.recv().await.as_deref(), Some("Timed Out!"));
    assert_eq!(client.recv().await, None);

    // The slot is free again and a prompt login beats the deadline
    let mut client = honeywell_login(sim.local_addr()).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    client.send("^02$").await;
    assert_eq!(client.recv_skipping_keypad().await.as_deref(), Some("^02,00$"));

    sim.shutdown().await;
}

#[tokio::test]
async fn test_dsc_login_timeout_closes() {
    let mut sim = start_with_login_timeout(Dialect::Dsc).await;
    let mut client = RawClient::connect(sim.local_addr()).await;
    assert_eq!(client.recv().await, Some(encode_frame("505", "3")));
    assert_eq!(client.recv().await, Some(encode_frame("505", "2")));
    assert_eq!(client.recv().await, None);

    sim.shutdown().await;
}

#[tokio::test]
async fn test_zero_counts_are_clamped() {
    let config = SimulatorConfig {
        port: 0,
        zones: 0,
        partitions: 0,
        ..Default::default()
    };
    let mut sim = PanelSimulator::start(config).await.unwrap();
    let handle = sim.handle();

    let zones = handle.zone_info().await.unwrap();
    assert_eq!(zones.len(), 8);
    assert!(handle.ready(1).await.unwrap());
    handle.fault(&[8]).await.unwrap();
    assert!(!handle.ready(1).await.unwrap());
    assert!(handle.fault(&[9]).await.is_err());

    sim.shutdown().await;
}

#[tokio::test]
async fn test_control_interface_over_tcp() {
    let mut sim = start(Dialect::Honeywell, true).await;
    let mut control = RawClient::connect(sim.control_addr().unwrap()).await;

    control.send("fault:2").await;
    assert_eq!(control.recv().await.as_deref(), Some("ok"));

    control.send("ready:1").await;
    assert_eq!(control.recv().await.as_deref(), Some("ready:1:false"));

    control.send("zoneinfo").await;
    let info = control.recv().await.unwrap();
    assert!(info.starts_with("zoneinfo:1=0 2=1 3=0"), "{info}");

    control.send("clear:2").await;
    assert_eq!(control.recv().await.as_deref(), Some("ok"));
    control.send("ready:1").await;
    assert_eq!(control.recv().await.as_deref(), Some("ready:1:true"));

    control.send("bogus").await;
    let reply = control.recv().await.unwrap();
    assert!(reply.starts_with("error:"), "{reply}");

    sim.shutdown().await;
}
