// MIT License - Copyright (c) 2021 TJForc
// Client session: connection supervisor, login, keepalive, reconnect

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::codec::{Codec, Command};
use crate::config::SessionConfig;
use crate::dispatch::{Dispatcher, SessionSignal};
use crate::error::{Result, TpiError};
use crate::event::{event_channel, Callback, Callbacks, EventReceiver, EventSender, PanelEvent};
use crate::registry::CallbackKind;
use crate::state::AlarmState;
use crate::transport::{self, LineReader, LineWriter, CLIENT_TERMINATOR};

/// Connection lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingLogin,
    LoggedIn,
    ShuttingDown,
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        *self == Self::LoggedIn
    }
}

/// Why a connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Reconnect after the delay only if the error is retryable
    Failed(TpiError),
    Shutdown,
}

struct Inner {
    config: SessionConfig,
    codec: Codec,
    dispatcher: Dispatcher,
    alarm: RwLock<AlarmState>,
    callbacks: RwLock<Callbacks>,
    writer: Mutex<Option<LineWriter>>,
    state_tx: watch::Sender<SessionState>,
    shutdown_tx: watch::Sender<bool>,
    connect_attempts: AtomicU32,
    event_tx: EventSender,
}

/// A client connection to one Envisalink module.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use envisalink_tpi::{CallbackKind, Dialect, PanelEvent, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = SessionConfig::builder()
///         .host("192.168.1.100")
///         .dialect(Dialect::Honeywell)
///         .password("user")
///         .build();
///
///     let mut session = Session::new(config);
///     session
///         .set_callback(
///             CallbackKind::ZoneStateChange,
///             Arc::new(|event: &PanelEvent| println!("{:?}", event)),
///         )
///         .await;
///     session.start();
///
///     tokio::signal::ctrl_c().await?;
///     session.stop().await;
///     Ok(())
/// }
/// ```
pub struct Session {
    inner: Arc<Inner>,
    supervisor_handle: Option<JoinHandle<()>>,
    keepalive_handle: Option<JoinHandle<()>>,
    zone_timer_handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Build a session. Nothing connects until [`Session::start`].
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, _event_rx) = event_channel(256);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        let codec = Codec::new(config.dialect);
        let dispatcher = Dispatcher::new(codec, config.password.clone());
        let alarm = AlarmState::initialize(config.partitions, config.zones());

        Self {
            inner: Arc::new(Inner {
                config,
                codec,
                dispatcher,
                alarm: RwLock::new(alarm),
                callbacks: RwLock::new(Callbacks::with_defaults()),
                writer: Mutex::new(None),
                state_tx,
                shutdown_tx,
                connect_attempts: AtomicU32::new(0),
                event_tx,
            }),
            supervisor_handle: None,
            keepalive_handle: None,
            zone_timer_handle: None,
        }
    }

    /// Spawn the connection supervisor and the periodic tasks.
    ///
    /// Calling it again after `stop()` or after a refused login starts over.
    pub fn start(&mut self) {
        // A supervisor that gave up has already raised the shutdown flag
        let running = self
            .supervisor_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if running && !*self.inner.shutdown_tx.borrow() {
            warn!("Session already started");
            return;
        }
        for handle in [
            self.supervisor_handle.take(),
            self.keepalive_handle.take(),
            self.zone_timer_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        self.inner.shutdown_tx.send_replace(false);

        let config = &self.inner.config;
        info!(
            "Starting {} session for {}:{}",
            config.dialect, config.host, config.port
        );

        self.supervisor_handle = Some(tokio::spawn(self.inner.clone().supervise()));

        if config.keepalive_interval_ms > 0 {
            self.keepalive_handle = Some(tokio::spawn(self.inner.clone().periodic(
                config.keepalive_interval_ms,
                Command::KeepAlive,
            )));
        }
        if config.zone_timer_dump_interval_ms > 0 {
            self.zone_timer_handle = Some(tokio::spawn(self.inner.clone().periodic(
                config.zone_timer_dump_interval_ms,
                Command::DumpZoneTimers,
            )));
        }
    }

    /// Close the connection and stop all tasks. No reconnect follows.
    pub async fn stop(&mut self) {
        info!("Stopping session");
        self.inner.set_state(SessionState::ShuttingDown);
        self.inner.shutdown_tx.send_replace(true);

        for handle in [
            self.supervisor_handle.take(),
            self.keepalive_handle.take(),
            self.zone_timer_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                error!("Session task failed: {}", e);
            }
        }
        self.inner.set_state(SessionState::Disconnected);
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch session state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to every event the session produces, connection changes included.
    pub fn subscribe(&self) -> EventReceiver {
        self.inner.event_tx.subscribe()
    }

    /// Number of TCP connection attempts since the session was created.
    pub fn connect_attempts(&self) -> u32 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Cloned view of the alarm state.
    pub async fn snapshot(&self) -> AlarmState {
        self.inner.alarm.read().await.snapshot()
    }

    pub async fn set_callback(&self, kind: CallbackKind, callback: Callback) {
        self.inner.callbacks.write().await.set(kind, callback);
    }

    pub async fn clear_callback(&self, kind: CallbackKind) {
        self.inner.callbacks.write().await.clear(kind);
    }

    // --- Commands ---

    /// Encode and send any command. Requires a logged-in session.
    pub async fn send_command(&self, command: Command) -> Result<()> {
        if !self.state().is_logged_in() {
            return Err(TpiError::Disconnected);
        }
        debug!("Sending {}", command.name());
        self.inner.send(&command).await
    }

    pub async fn dump_zone_timers(&self) -> Result<()> {
        self.send_command(Command::DumpZoneTimers).await
    }

    pub async fn change_partition(&self, partition: u32) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::ChangeDefaultPartition { partition })
            .await
    }

    pub async fn keypresses_to_default_partition(&self, keys: &str) -> Result<()> {
        self.send_command(Command::Keypress {
            partition: None,
            keys: keys.to_string(),
        })
        .await
    }

    pub async fn keypresses_to_partition(&self, partition: u32, keys: &str) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::Keypress {
            partition: Some(partition),
            keys: keys.to_string(),
        })
        .await
    }

    pub async fn arm_stay(&self, code: &str, partition: u32) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::ArmStay {
            code: code.to_string(),
            partition,
        })
        .await
    }

    pub async fn arm_away(&self, code: &str, partition: u32) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::ArmAway {
            code: code.to_string(),
            partition,
        })
        .await
    }

    pub async fn arm_max(&self, code: &str, partition: u32) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::ArmMax {
            code: code.to_string(),
            partition,
        })
        .await
    }

    pub async fn disarm(&self, code: &str, partition: u32) -> Result<()> {
        self.check_partition(partition)?;
        self.send_command(Command::Disarm {
            code: code.to_string(),
            partition,
        })
        .await
    }

    /// Uno only.
    pub async fn bypass_zone(&self, zone: u32) -> Result<()> {
        self.check_zone(zone)?;
        self.send_command(Command::BypassZone { zone }).await
    }

    /// Uno only.
    pub async fn unbypass_zone(&self, zone: u32) -> Result<()> {
        self.check_zone(zone)?;
        self.send_command(Command::UnbypassZone { zone }).await
    }

    fn check_partition(&self, id: u32) -> Result<()> {
        let max = self.inner.config.partitions;
        if id == 0 || id > max {
            return Err(TpiError::InvalidPartition { id, max });
        }
        Ok(())
    }

    fn check_zone(&self, id: u32) -> Result<()> {
        let max = self.inner.config.zones();
        if id == 0 || id > max {
            return Err(TpiError::InvalidZone { id, max });
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.shutdown_tx.send_replace(true);
        for handle in [
            self.supervisor_handle.take(),
            self.keepalive_handle.take(),
            self.zone_timer_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session state {:?} -> {:?}", previous, state);
        }
    }

    fn current_state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    async fn send(&self, command: &Command) -> Result<()> {
        let lines = self.codec.encode(command)?;
        let writer = self.writer.lock().await.clone();
        let writer = writer.ok_or(TpiError::Disconnected)?;
        writer.send_lines(&lines).await
    }

    /// Connect, read until the connection ends, then reconnect unless told not to.
    async fn supervise(self: Arc<Self>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let config = &self.config;

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(SessionState::Connecting);
            let attempt = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("Connection attempt {}", attempt);

            let connected = tokio::select! {
                result = transport::connect(&config.host, config.port, config.connect_timeout_ms) => result,
                _ = shutdown.changed() => break,
            };

            let end = match connected {
                Ok(stream) => self.run_connection(stream, &mut shutdown).await,
                Err(e) => {
                    warn!("Unable to connect to {}:{}: {}", config.host, config.port, e);
                    ConnectionEnd::Failed(e)
                }
            };

            let retry = match end {
                ConnectionEnd::Shutdown => false,
                ConnectionEnd::Failed(e) if !e.is_retryable() => {
                    error!("{}, not reconnecting", e);
                    self.shutdown_tx.send_replace(true);
                    false
                }
                ConnectionEnd::Failed(e) => {
                    debug!("Connection ended: {}", e);
                    true
                }
            };
            self.set_state(SessionState::Disconnected);
            if !retry || *shutdown.borrow() {
                break;
            }

            info!("Reconnecting in {} ms", config.reconnect_delay_ms);
            tokio::select! {
                _ = sleep(Duration::from_millis(config.reconnect_delay_ms)) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(SessionState::Disconnected);
        debug!("Session supervisor stopped");
    }

    async fn run_connection(
        &self,
        stream: TcpStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ConnectionEnd {
        let (mut reader, writer) = transport::split(stream, CLIENT_TERMINATOR);
        *self.writer.lock().await = Some(writer.clone());
        self.set_state(SessionState::AwaitingLogin);
        info!("Connected to Envisalink, awaiting login");
        let _ = self.event_tx.send(PanelEvent::Connected);

        let end = tokio::select! {
            end = self.read_loop(&mut reader) => end,
            _ = shutdown.changed() => ConnectionEnd::Shutdown,
        };

        self.writer.lock().await.take();
        if let Err(e) = writer.shutdown().await {
            debug!("Socket shutdown: {}", e);
        }
        let _ = self.event_tx.send(PanelEvent::Disconnected);
        info!("Disconnected from Envisalink");
        end
    }

    async fn read_loop(&self, reader: &mut LineReader) -> ConnectionEnd {
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    debug!("RX < {}", line);
                    if let Some(end) = self.handle_line(&line).await {
                        return end;
                    }
                }
                Ok(None) => {
                    warn!("Connection closed by the Envisalink");
                    return ConnectionEnd::Failed(TpiError::Disconnected);
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    return ConnectionEnd::Failed(e);
                }
            }
        }
    }

    /// Decode, dispatch and deliver every frame on one line, in order.
    async fn handle_line(&self, line: &str) -> Option<ConnectionEnd> {
        for frame in self.codec.split_frames(line) {
            let logged_in = self.current_state().is_logged_in();
            let event = match self.codec.decode(frame, logged_in) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Dropping frame {:?}: {}", frame, e);
                    continue;
                }
            };

            let outcome = {
                let mut alarm = self.alarm.write().await;
                self.dispatcher.dispatch(&event, &mut alarm)
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Dropping {} frame {:?}: {}", event.name(), frame, e);
                    continue;
                }
            };

            if !outcome.replies.is_empty() {
                let writer = self.writer.lock().await.clone();
                if let Some(writer) = writer
                    && let Err(e) = writer.send_lines(&outcome.replies).await
                {
                    error!("Failed to reply to {}: {}", event.name(), e);
                    return Some(ConnectionEnd::Failed(e));
                }
            }

            if outcome.signal == Some(SessionSignal::LoggedIn) {
                self.set_state(SessionState::LoggedIn);
            }
            if let Some(event) = outcome.event {
                self.deliver(event).await;
            }
            match outcome.signal {
                Some(SessionSignal::LoginRejected) => {
                    return Some(ConnectionEnd::Failed(TpiError::AuthenticationFailure));
                }
                Some(SessionSignal::LoginTimedOut) => {
                    return Some(ConnectionEnd::Failed(TpiError::LoginTimeout));
                }
                _ => {}
            }
        }
        None
    }

    /// Hand an event to its callback, then to subscribers.
    async fn deliver(&self, event: PanelEvent) {
        if let Some(kind) = event.callback_kind() {
            let callback = self.callbacks.read().await.get(kind);
            match callback {
                Some(callback) => callback(&event),
                None => warn!(
                    "{}",
                    TpiError::MissingCallback {
                        callback: kind.name()
                    }
                ),
            }
        }
        let _ = self.event_tx.send(event);
    }

    /// Send `command` every `period_ms` while logged in.
    async fn periodic(self: Arc<Self>, period_ms: u64, command: Command) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let period = Duration::from_millis(period_ms);
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.current_state().is_logged_in() {
                        continue;
                    }
                    if let Err(e) = self.send(&command).await {
                        warn!("Periodic {} failed: {}", command.name(), e);
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        debug!("Periodic {} stopped", command.name());
    }
}
