// MIT License - Copyright (c) 2021 TJForc
// Envisalink TPI client engine and panel simulator
//
//! # envisalink-tpi
//!
//! Client engine for the Envisalink Third-Party Interface (TPI), the line
//! protocol spoken by Envisalink modules attached to Honeywell Vista, DSC
//! PowerSeries and Uno alarm panels.
//!
//! A [`Session`] owns one TCP connection: it logs in, keeps the link alive,
//! decodes every frame into an [`AlarmState`] and delivers a [`PanelEvent`]
//! to the registered callback and to broadcast subscribers. A
//! [`PanelSimulator`] plays the module's side of the protocol for tests and
//! local development.
//!
//! ## Quick Start
//!
//! ```no_run
//! use envisalink_tpi::{Dialect, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::builder()
//!         .host("192.168.0.50")
//!         .dialect(Dialect::Honeywell)
//!         .password("user")
//!         .build();
//!
//!     let mut session = Session::new(config);
//!     let mut events = session.subscribe();
//!     session.start();
//!
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.stop().await;
//!     Ok(())
//! }
//! ```

pub mod cid;
pub mod codec;
pub mod config;
pub mod constants;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod registry;
pub mod session;
pub mod simulator;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use cid::{CidEvent, CidQualifier};
pub use codec::bitfield::{DscLedFlags, IconLedFlags, ZoneTimer};
pub use codec::{Codec, Command, Event};
pub use config::{Dialect, SessionConfig, SessionConfigBuilder};
pub use devices::partition::{PartitionState, PartitionStatusFlags};
pub use devices::zone::{ZoneState, ZoneStatusFlags};
pub use error::{Result, TpiError, TpiResponseCode};
pub use event::{Callback, EventReceiver, PanelEvent};
pub use registry::CallbackKind;
pub use session::{Session, SessionState};
pub use simulator::{
    ControlCommand, ControlReply, PanelSimulator, SimulatorConfig, SimulatorConfigBuilder,
    SimulatorHandle,
};
pub use state::AlarmState;
