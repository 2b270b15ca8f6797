//! `robofleet-runtime` – the real-time control loop.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`Orchestrator`]: the Idle → Starting → Running →
//!   Stopping state machine.  Owns the loop thread, its termination flag,
//!   the world model and one controller per robot slot.
//! - `cycle` (private) – the loop unit itself: latest-frame acquisition,
//!   novelty check, world update, throttled strategy run, per-slot dispatch.
//! - [`strategy`] – the [`Strategy`] seam.  Any
//!   `FnMut(&GameState) -> Result<Decision, FleetError>` closure qualifies.
//! - [`stats`] – [`CycleStats`], counters readable while the loop runs.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with optional OTLP export.
//!
//! [`GameState`]: robofleet_types::GameState
//! [`Decision`]: robofleet_types::Decision

mod cycle;
pub mod orchestrator;
pub mod stats;
pub mod strategy;
pub mod telemetry;

pub use orchestrator::{Orchestrator, OrchestratorConfig, Phase, StopHandle};
pub use stats::CycleStats;
pub use strategy::Strategy;
