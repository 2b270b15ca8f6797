//! `robofleet-types` – shared vocabulary of the robofleet workspace.
//!
//! # Modules
//!
//! - [`geometry`] – [`Position`], [`Pose`] and the [`FieldBounds`] rectangle
//!   every positional command is clamped into.
//! - [`command`] – the per-cycle [`Command`] model (move, rotate, kick, stop).
//! - [`world`] – read-only snapshot types handed to strategies
//!   ([`GameState`], [`Player`], [`VisionFrame`], …).
//! - [`error`] – [`FleetError`], the error type used across every crate.

pub mod command;
pub mod error;
pub mod geometry;
pub mod world;

pub use command::{Command, CommandKind, DEFAULT_DRIBBLE_SPEED, KICK_MAX_SPEED};
pub use error::FleetError;
pub use geometry::{FieldBounds, Pose, Position};
pub use world::{
    DebugAnnotation, DebugInput, Decision, FieldGeometry, GameState, Player, RefereeCommand,
    RefereeState, RobotDetection, SlotId, TeamColor, VisionFrame,
};
