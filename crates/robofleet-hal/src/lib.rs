//! `robofleet-hal` – everything between a strategy's intent and the wire.
//!
//! # Modules
//!
//! - [`controller`] – [`Controller`][controller::Controller]: the per-slot
//!   closed-loop translator from position intents to bounded velocity
//!   commands, configured by [`ControllerConfig`][controller::ControllerConfig].
//! - [`transport`] – collaborator traits for the robot, debug, referee and
//!   vision channels, plus the UDP and serial command links.
//! - [`world_model`] – the [`WorldModel`][world_model::WorldModel] seam and a
//!   detection-tracking implementation.
//! - [`sim`] – an in-process kinematic field so the whole loop can run in
//!   tests and CI without robots.

pub mod controller;
pub mod sim;
pub mod transport;
pub mod world_model;

pub use controller::{Controller, ControllerConfig, ControllerPolicy, StopReset};
pub use sim::{SimConfig, SimField, SimTransports};
pub use transport::{
    CommandSender, DEFAULT_BAUD_RATE, DebugReceiver, DebugSender, RefereeReceiver, SerialCommandSender,
    TransportFactory, TransportKind, UdpCommandSender, VisionReceiver,
};
pub use world_model::{TrackedWorld, WorldModel};
