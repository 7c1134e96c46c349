// MIT License - Copyright (c) 2021 TJForc
// Events delivered to callbacks and subscribers

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::cid::CidEvent;
use crate::codec::bitfield::ZoneTimer;
use crate::constants::BeepMode;
use crate::registry::CallbackKind;

/// Everything a session reports about the panel.
///
/// Handler results are delivered to the callback registered for their
/// [`CallbackKind`]; every event, including connection changes, is also
/// broadcast to subscribers of `Session::subscribe()`.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// TCP connection to the module established
    Connected,
    /// TCP connection lost or closed
    Disconnected,
    LoginSuccess,
    LoginFailure,
    LoginTimeout,
    /// Keypad display or LED state changed. `partition` is `None` for
    /// system-wide updates that were applied to every partition.
    KeypadUpdate {
        partition: Option<u32>,
        alpha: String,
        beep: Option<BeepMode>,
    },
    /// Zones whose status changed
    ZoneStateChange { zones: Vec<u32> },
    /// Partitions whose status changed
    PartitionStateChange { partitions: Vec<u32> },
    /// Zones currently bypassed (Uno)
    ZoneBypassUpdate { bypassed: Vec<u32> },
    RealtimeCidEvent(CidEvent),
    /// Zone timers in zone order, starting at zone 1
    ZoneTimerDump { timers: Vec<ZoneTimer> },
}

impl PanelEvent {
    /// The callback this event is delivered to, if any.
    pub fn callback_kind(&self) -> Option<CallbackKind> {
        match self {
            Self::Connected | Self::Disconnected => None,
            Self::LoginSuccess => Some(CallbackKind::LoginSuccess),
            Self::LoginFailure => Some(CallbackKind::LoginFailure),
            Self::LoginTimeout => Some(CallbackKind::LoginTimeout),
            Self::KeypadUpdate { .. } => Some(CallbackKind::KeypadUpdate),
            Self::ZoneStateChange { .. } => Some(CallbackKind::ZoneStateChange),
            Self::PartitionStateChange { .. } => Some(CallbackKind::PartitionStateChange),
            Self::ZoneBypassUpdate { .. } => Some(CallbackKind::ZoneBypassUpdate),
            Self::RealtimeCidEvent(_) => Some(CallbackKind::RealtimeCidEvent),
            Self::ZoneTimerDump { .. } => Some(CallbackKind::ZoneTimerDump),
        }
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}

/// A collaborator callback. Runs on the session's read loop, so it must not block.
pub type Callback = Arc<dyn Fn(&PanelEvent) + Send + Sync>;

/// One callback per [`CallbackKind`].
#[derive(Clone)]
pub struct Callbacks {
    map: HashMap<CallbackKind, Callback>,
}

impl Callbacks {
    /// A registry where every kind logs that no callback was set.
    pub fn with_defaults() -> Self {
        let map = CallbackKind::ALL
            .iter()
            .map(|kind| {
                let kind = *kind;
                let cb: Callback = Arc::new(move |_event: &PanelEvent| {
                    info!("Callback {} has not been set by client", kind);
                });
                (kind, cb)
            })
            .collect();
        Self { map }
    }

    pub fn set(&mut self, kind: CallbackKind, callback: Callback) {
        self.map.insert(kind, callback);
    }

    /// Remove the callback for `kind`; its events are then logged as missing.
    pub fn clear(&mut self, kind: CallbackKind) {
        self.map.remove(&kind);
    }

    pub fn get(&self, kind: CallbackKind) -> Option<Callback> {
        self.map.get(&kind).cloned()
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&'static str> = self.map.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("Callbacks").field("registered", &kinds).finish()
    }
}
