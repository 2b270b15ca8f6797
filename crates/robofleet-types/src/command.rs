//! Per-cycle robot commands.
//!
//! A [`Command`] describes what one robot should do during one dispatch
//! cycle.  Every constructor validates its numeric inputs and clamps any
//! carried position into the [`FieldBounds`] rectangle, so a `Command` value
//! is always well-formed once it exists.
//!
//! Commands refer to their robot by ([`TeamColor`], [`SlotId`]) only.  The
//! robot's pose at construction time seeds the command (e.g. `move_to` keeps
//! the current heading) but the robot itself is not embedded.
//!
//! # Example
//!
//! ```rust
//! use robofleet_types::{Command, FieldBounds, Player, Pose, Position, SlotId, TeamColor};
//!
//! let robot = Player::new(SlotId(2), TeamColor::Blue, Pose::new(0.0, 0.0, 0.3));
//! let field = FieldBounds::default();
//!
//! let cmd = Command::move_to(&robot, Position::new(9000.0, 0.0), &field).unwrap();
//! assert_eq!(cmd.pose().position.x, field.x_right);
//! assert_eq!(cmd.pose().orientation, 0.3);
//! ```

use serde::Serialize;

use crate::error::FleetError;
use crate::geometry::{FieldBounds, Pose, Position};
use crate::world::{Player, SlotId, TeamColor};

/// Physical kick speed (m/s) reached by a normalised kick of `1.0`.
pub const KICK_MAX_SPEED: f64 = 8.0;

pub const DEFAULT_DRIBBLE_SPEED: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    MoveTo,
    Rotate,
    MoveToAndRotate,
    Kick,
    Stop,
}

/// One robot's intent for one cycle.
///
/// Fields are read-only; the only mutation is [`Command::with_velocity`],
/// which the dispatch path uses to replace the target pose by the
/// controller's velocity output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    kind: CommandKind,
    slot: SlotId,
    team: TeamColor,
    pose: Pose,
    dribble: bool,
    dribble_speed: f64,
    kick: bool,
    kick_speed: f64,
    is_speed_command: bool,
    stop_cmd: bool,
}

impl Command {
    fn base(kind: CommandKind, slot: SlotId, team: TeamColor, pose: Pose) -> Self {
        Self {
            kind,
            slot,
            team,
            pose,
            dribble: true,
            dribble_speed: DEFAULT_DRIBBLE_SPEED,
            kick: false,
            kick_speed: 0.0,
            is_speed_command: false,
            stop_cmd: false,
        }
    }

    /// Drive `robot` to `position`, keeping its current orientation.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if `position` is not finite.
    pub fn move_to(
        robot: &Player,
        position: Position,
        field: &FieldBounds,
    ) -> Result<Self, FleetError> {
        if !position.is_finite() {
            return Err(FleetError::non_finite("move_to position"));
        }
        let pose = Pose::from_parts(field.clamp(position), robot.pose.orientation);
        Ok(Self::base(CommandKind::MoveTo, robot.slot, robot.team, pose))
    }

    /// Turn `robot` to `orientation` in place.  The robot's current position
    /// is clamped into the field like any other target.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if `orientation` is not finite.
    pub fn rotate(robot: &Player, orientation: f64, field: &FieldBounds) -> Result<Self, FleetError> {
        if !orientation.is_finite() {
            return Err(FleetError::non_finite("rotate orientation"));
        }
        let pose = Pose::from_parts(field.clamp(robot.pose.position), orientation);
        Ok(Self::base(CommandKind::Rotate, robot.slot, robot.team, pose))
    }

    /// Drive `robot` to `target`.  Only the position is clamped; the
    /// orientation passes through.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if any component of `target` is
    /// not finite.
    pub fn move_to_and_rotate(
        robot: &Player,
        target: Pose,
        field: &FieldBounds,
    ) -> Result<Self, FleetError> {
        if !target.is_finite() {
            return Err(FleetError::non_finite("move_to_and_rotate pose"));
        }
        let pose = Pose::from_parts(field.clamp(target.position), target.orientation);
        Ok(Self::base(CommandKind::MoveToAndRotate, robot.slot, robot.team, pose))
    }

    /// Kick with a normalised strength in `[0, 1]`, scaled linearly to
    /// [`KICK_MAX_SPEED`].  The robot holds its current pose.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] when `kick_speed` is outside
    /// `[0, 1]` or not a number.
    pub fn kick(robot: &Player, kick_speed: f64) -> Result<Self, FleetError> {
        if !(0.0..=1.0).contains(&kick_speed) {
            return Err(FleetError::Configuration(format!(
                "kick speed {kick_speed} outside [0, 1]"
            )));
        }
        let mut cmd = Self::base(CommandKind::Kick, robot.slot, robot.team, robot.pose);
        cmd.kick = true;
        cmd.kick_speed = kick_speed * KICK_MAX_SPEED;
        cmd.is_speed_command = true;
        Ok(cmd)
    }

    /// Halt `robot`.
    pub fn stop(robot: &Player) -> Self {
        Self::stop_slot(robot.slot, robot.team)
    }

    /// Halt the robot in `slot` of `team` without needing its pose.
    pub fn stop_slot(slot: SlotId, team: TeamColor) -> Self {
        let mut cmd = Self::base(CommandKind::Stop, slot, team, Pose::ZERO);
        cmd.is_speed_command = true;
        cmd.stop_cmd = true;
        cmd
    }

    /// Replace the target pose by a velocity pose computed for this cycle.
    pub fn with_velocity(mut self, velocity: Pose) -> Self {
        self.pose = velocity;
        self
    }

    /// Toggle the dribbler for this command.
    pub fn with_dribble(mut self, dribble: bool) -> Self {
        self.dribble = dribble;
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn team(&self) -> TeamColor {
        self.team
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn dribble(&self) -> bool {
        self.dribble
    }

    pub fn dribble_speed(&self) -> f64 {
        self.dribble_speed
    }

    pub fn kick_enabled(&self) -> bool {
        self.kick
    }

    /// Physical kick speed in m/s.
    pub fn kick_speed(&self) -> f64 {
        self.kick_speed
    }

    pub fn is_speed_command(&self) -> bool {
        self.is_speed_command
    }

    pub fn is_stop(&self) -> bool {
        self.stop_cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn robot_at(x: f64, y: f64, orientation: f64) -> Player {
        Player::new(SlotId(1), TeamColor::Yellow, Pose::new(x, y, orientation))
    }

    #[test]
    fn move_to_keeps_inside_target_and_robot_heading() {
        let field = FieldBounds::default();
        let robot = robot_at(0.0, 0.0, 1.2);
        let cmd = Command::move_to(&robot, Position::new(100.0, -200.0), &field).unwrap();
        assert_eq!(cmd.kind(), CommandKind::MoveTo);
        assert_eq!(cmd.pose(), Pose::new(100.0, -200.0, 1.2));
        assert_eq!(cmd.slot(), SlotId(1));
        assert_eq!(cmd.team(), TeamColor::Yellow);
        assert!(!cmd.is_speed_command());
        assert!(cmd.dribble());
    }

    #[test]
    fn move_to_clamps_each_axis() {
        let field = FieldBounds::default();
        let robot = robot_at(0.0, 0.0, 0.0);
        let cmd = Command::move_to(&robot, Position::new(-1.0e6, 2500.0), &field).unwrap();
        assert_eq!(cmd.pose().position, Position::new(field.x_left, 2500.0));
        let cmd = Command::move_to(&robot, Position::new(10.0, 1.0e6), &field).unwrap();
        assert_eq!(cmd.pose().position, Position::new(10.0, field.y_top));
    }

    #[test]
    fn move_to_rejects_nan() {
        let field = FieldBounds::default();
        let robot = robot_at(0.0, 0.0, 0.0);
        let result = Command::move_to(&robot, Position::new(f64::NAN, 0.0), &field);
        assert!(matches!(result, Err(FleetError::Configuration(_))));
    }

    #[test]
    fn rotate_clamps_current_position() {
        let field = FieldBounds::default();
        // Robot reported slightly outside the field (e.g. vision noise).
        let robot = robot_at(4600.0, 0.0, 0.0);
        let cmd = Command::rotate(&robot, 2.0, &field).unwrap();
        assert_eq!(cmd.pose(), Pose::new(4500.0, 0.0, 2.0));
        assert!(Command::rotate(&robot, f64::INFINITY, &field).is_err());
    }

    #[test]
    fn move_to_and_rotate_does_not_clamp_orientation() {
        let field = FieldBounds::default();
        let robot = robot_at(0.0, 0.0, 0.0);
        let cmd =
            Command::move_to_and_rotate(&robot, Pose::new(5000.0, 0.0, 12.0), &field).unwrap();
        assert_eq!(cmd.pose(), Pose::new(4500.0, 0.0, 12.0));
        assert_eq!(cmd.kind(), CommandKind::MoveToAndRotate);
    }

    #[test]
    fn kick_scales_to_physical_maximum() {
        let robot = robot_at(10.0, 20.0, 0.5);
        let half = Command::kick(&robot, 0.5).unwrap();
        assert!((half.kick_speed() - 0.5 * KICK_MAX_SPEED).abs() < 1e-12);
        assert!(half.kick_enabled());
        assert!(half.is_speed_command());
        assert_eq!(half.pose(), robot.pose);

        let full = Command::kick(&robot, 1.0).unwrap();
        let none = Command::kick(&robot, 0.0).unwrap();
        assert!(none.kick_speed() < half.kick_speed());
        assert!(half.kick_speed() < full.kick_speed());
    }

    #[test]
    fn kick_speed_is_monotonic_over_unit_interval() {
        let robot = robot_at(0.0, 0.0, 0.0);
        let speeds: Vec<f64> = (0..=10)
            .map(|i| Command::kick(&robot, i as f64 / 10.0).unwrap().kick_speed())
            .collect();
        assert!(speeds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn kick_rejects_out_of_range() {
        let robot = robot_at(0.0, 0.0, 0.0);
        for bad in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(Command::kick(&robot, bad), Err(FleetError::Configuration(_))),
                "kick({bad}) must be rejected"
            );
        }
    }

    #[test]
    fn stop_is_zero_pose_speed_command() {
        let robot = robot_at(100.0, 100.0, 1.0);
        let cmd = Command::stop(&robot);
        assert_eq!(cmd.kind(), CommandKind::Stop);
        assert!(!cmd.kick_enabled());
        assert!(cmd.is_stop());
        assert!(cmd.is_speed_command());
        assert_eq!(cmd.pose(), Pose::ZERO);
    }

    #[test]
    fn with_velocity_replaces_pose_only() {
        let field = FieldBounds::default();
        let robot = robot_at(0.0, 0.0, 0.0);
        let cmd = Command::move_to(&robot, Position::new(1.0, 1.0), &field).unwrap();
        let dispatched = cmd.clone().with_velocity(Pose::new(0.2, 0.1, -0.3));
        assert_eq!(dispatched.pose(), Pose::new(0.2, 0.1, -0.3));
        assert_eq!(dispatched.kind(), cmd.kind());
        assert_eq!(dispatched.slot(), cmd.slot());
    }

    #[test]
    fn command_serializes_with_flags() {
        let robot = robot_at(0.0, 0.0, 0.0);
        let json = serde_json::to_string(&Command::stop(&robot)).unwrap();
        assert!(json.contains(r#""kind":"stop""#));
        assert!(json.contains(r#""stop_cmd":true"#));
    }
}
