//! # tesira-client
//!
//! Session-level client for the Tesira text protocol.
//!
//! The device answers commands strictly in order and without transaction ids,
//! and it delivers attribute changes as push lines tagged with a name chosen
//! by the client. This crate turns that into something you can build on:
//!
//! - **Command queue** - one command in flight at a time, so every reply is
//!   matched to the control point that asked for it
//! - **Control points** - fader, state, meter, router, source selector,
//!   crosspoint, dialer and room combiner groups sharing one command and
//!   subscription contract
//! - **Subscription registry** - routes push lines by token and rejects
//!   colliding tokens at registration
//! - **Watchdog** - probes a random subscription each interval and escalates
//!   when the device stops answering
//! - **Resubscription supervisor** - paced unsubscribe/subscribe cycles on
//!   session start, sentinel, watchdog escalation or request
//!
//! # Example
//!
//! ```rust,no_run
//! use tesira_client::{ClientConfig, ControlPointConfig, ControlPointKind, TcpLineTransport, TesiraClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, events) = TcpLineTransport::connect("192.168.1.50:23").await?;
//! let points = vec![ControlPointConfig::new("program", ControlPointKind::Fader, "ProgramLevel")];
//! let client = TesiraClient::with_control_points(ClientConfig::default(), transport, &points)?;
//!
//! let mut feedback = client.feedback();
//! tokio::spawn(async move {
//!     while let Ok(update) = feedback.recv().await {
//!         println!("{} {} = {:?}", update.control_point, update.attribute, update.value);
//!     }
//! });
//!
//! client.run(events).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod context;
mod engine;
mod error;
mod event;
mod queue;
mod registry;
mod supervisor;
mod transport;
mod watchdog;

pub mod control_point;

#[cfg(test)]
mod test_support;

pub use client::TesiraClient;
pub use config::ClientConfig;
pub use context::ProtocolContext;
pub use control_point::{
    build_control_point, ControlPoint, ControlPointBase, ControlPointConfig, ControlPointId, ControlPointKind,
    Crosspoint, DeviceIdentity, DeviceInfo, Dialer, ExpanderInventory, Fader, LevelRange, Meter, RoomCombiner,
    Router, SourceSelector, StateControl, TagSelector,
};
pub use engine::{EngineSignal, ProtocolEngine, WatchdogAction};
pub use error::{ClientError, ControlPointError, ControlPointResult, RegistryError, Result, TransportError};
pub use event::{CyclePhase, CycleReason, Feedback, FeedbackValue, SessionEvent};
pub use queue::{CommandQueue, QueuedCommand, ReplyDelivery};
pub use registry::{RegistryStats, SubscriptionRegistry};
pub use supervisor::ResubscriptionSupervisor;
pub use transport::{ConnectionState, LineSender, TcpLineTransport, TransportEvent, COMMAND_TERMINATOR};
pub use watchdog::{TickOutcome, Watchdog, WatchdogState, WatchdogTask, MAX_UNCONFIRMED_BACKOFF_TICKS};

pub use tesira_protocol;
