//! World snapshot types.
//!
//! These are the values a world-model collaborator exposes and a strategy
//! consumes.  None of them hold references into each other: robots are named
//! by ([`TeamColor`], [`SlotId`]) and resolved against the current snapshot
//! when needed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::FleetError;
use crate::geometry::{FieldBounds, Pose, Position};

/// Stable index of one physical robot within its team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamColor {
    #[default]
    Blue,
    Yellow,
}

impl TeamColor {
    pub fn opponent(self) -> TeamColor {
        match self {
            TeamColor::Blue => TeamColor::Yellow,
            TeamColor::Yellow => TeamColor::Blue,
        }
    }
}

impl fmt::Display for TeamColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamColor::Blue => write!(f, "blue"),
            TeamColor::Yellow => write!(f, "yellow"),
        }
    }
}

impl FromStr for TeamColor {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(TeamColor::Blue),
            "yellow" => Ok(TeamColor::Yellow),
            other => Err(FleetError::Configuration(format!(
                "unknown team color '{other}' (expected 'blue' or 'yellow')"
            ))),
        }
    }
}

/// One robot as currently known to the world model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub slot: SlotId,
    pub team: TeamColor,
    pub pose: Pose,
}

impl Player {
    pub fn new(slot: SlotId, team: TeamColor, pose: Pose) -> Self {
        Self { slot, team, pose }
    }
}

/// Referee command currently in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefereeCommand {
    #[default]
    Halt,
    Stop,
    NormalStart,
    ForceStart,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RefereeState {
    pub command: RefereeCommand,
    /// Incremented by the referee every time a new command is issued.
    pub command_counter: u64,
}

/// Static description of the playing field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub bounds: FieldBounds,
    pub goal_width: f64,
}

impl Default for FieldGeometry {
    fn default() -> Self {
        Self {
            bounds: FieldBounds::default(),
            goal_width: 1000.0,
        }
    }
}

/// A robot seen by the vision source in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobotDetection {
    pub slot: SlotId,
    pub pose: Pose,
}

/// One sensor frame.
///
/// `frame_number` and `t_capture` (seconds) are both monotonically
/// increasing for a given source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisionFrame {
    pub frame_number: u64,
    pub t_capture: f64,
    pub robots_blue: Vec<RobotDetection>,
    pub robots_yellow: Vec<RobotDetection>,
    pub balls: Vec<Position>,
}

impl VisionFrame {
    pub fn robots(&self, team: TeamColor) -> &[RobotDetection] {
        match team {
            TeamColor::Blue => &self.robots_blue,
            TeamColor::Yellow => &self.robots_yellow,
        }
    }
}

/// Visual annotation produced by a strategy for the debug UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DebugAnnotation {
    Text { message: String },
    Point { position: Position, label: String },
    Line { start: Position, end: Position },
    Target { slot: SlotId, pose: Pose },
}

/// Pending input coming back from the debug UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInput {
    pub topic: String,
    pub body: String,
}

/// Snapshot handed to the strategy once per strategic decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    pub field: FieldGeometry,
    pub referee: RefereeState,
    /// Robots of the active team, in slot order.
    pub friends: Vec<Player>,
    pub enemies: Vec<Player>,
    /// Capture timestamp of the newest processed frame, in seconds.
    pub timestamp: f64,
    pub debug: Option<DebugInput>,
}

impl GameState {
    pub fn friend(&self, slot: SlotId) -> Option<&Player> {
        self.friends.iter().find(|p| p.slot == slot)
    }
}

/// What a strategy returns for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    /// One command per slot the strategy wants to drive.
    pub commands: Vec<Command>,
    pub debug: Vec<DebugAnnotation>,
}

impl Decision {
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands,
            debug: Vec::new(),
        }
    }

    pub fn with_debug(mut self, annotations: Vec<DebugAnnotation>) -> Self {
        self.debug = annotations;
        self
    }
}
