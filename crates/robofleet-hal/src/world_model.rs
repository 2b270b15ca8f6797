//! [`WorldModel`] – the world-state collaborator the orchestrator reads from.
//!
//! The orchestrator feeds every novel vision frame into
//! [`WorldModel::update`] and reads the field, referee state and both rosters
//! back when it builds a snapshot.  [`TrackedWorld`] is a minimal
//! implementation that keeps the most recently detected pose of every robot.

use robofleet_types::{
    FieldGeometry, Player, Pose, RefereeState, SlotId, TeamColor, VisionFrame,
};

pub trait WorldModel: Send {
    /// Integrate one novel frame.  `time_delta` is the capture-time gap to
    /// the previously integrated frame, in seconds.
    fn update(&mut self, frame: &VisionFrame, time_delta: f64);

    /// Record the newest referee state.
    fn apply_referee(&mut self, referee: RefereeState);

    fn field(&self) -> FieldGeometry;

    fn referee(&self) -> RefereeState;

    /// Roster of `team`, in slot order.
    fn team(&self, team: TeamColor) -> Vec<Player>;
}

/// Keeps the last detected pose for a fixed number of slots per team.
///
/// Robots that have never been detected sit at [`Pose::ZERO`].
#[derive(Debug, Clone)]
pub struct TrackedWorld {
    field: FieldGeometry,
    referee: RefereeState,
    blue: Vec<Player>,
    yellow: Vec<Player>,
    elapsed: f64,
}

impl TrackedWorld {
    pub fn new(field: FieldGeometry, slots_per_team: usize) -> Self {
        let roster = |team| {
            (0..slots_per_team)
                .map(|i| Player::new(SlotId(i), team, Pose::ZERO))
                .collect()
        };
        Self {
            field,
            referee: RefereeState::default(),
            blue: roster(TeamColor::Blue),
            yellow: roster(TeamColor::Yellow),
            elapsed: 0.0,
        }
    }

    /// Sum of every `time_delta` integrated so far.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn roster_mut(&mut self, team: TeamColor) -> &mut Vec<Player> {
        match team {
            TeamColor::Blue => &mut self.blue,
            TeamColor::Yellow => &mut self.yellow,
        }
    }
}

impl WorldModel for TrackedWorld {
    fn update(&mut self, frame: &VisionFrame, time_delta: f64) {
        self.elapsed += time_delta;
        for team in [TeamColor::Blue, TeamColor::Yellow] {
            for detection in frame.robots(team) {
                if !detection.pose.is_finite() {
                    continue;
                }
                // Detections for slots outside the roster are ignored.
                if let Some(player) = self.roster_mut(team).get_mut(detection.slot.index()) {
                    player.pose = detection.pose;
                }
            }
        }
    }

    fn apply_referee(&mut self, referee: RefereeState) {
        self.referee = referee;
    }

    fn field(&self) -> FieldGeometry {
        self.field
    }

    fn referee(&self) -> RefereeState {
        self.referee
    }

    fn team(&self, team: TeamColor) -> Vec<Player> {
        match team {
            TeamColor::Blue => self.blue.clone(),
            TeamColor::Yellow => self.yellow.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_types::{RefereeCommand, RobotDetection};

    fn frame_with(team: TeamColor, slot: usize, pose: Pose) -> VisionFrame {
        let detection = RobotDetection {
            slot: SlotId(slot),
            pose,
        };
        let mut frame = VisionFrame {
            frame_number: 1,
            t_capture: 0.1,
            ..VisionFrame::default()
        };
        match team {
            TeamColor::Blue => frame.robots_blue.push(detection),
            TeamColor::Yellow => frame.robots_yellow.push(detection),
        }
        frame
    }

    #[test]
    fn fresh_world_has_full_rosters_at_origin() {
        let world = TrackedWorld::new(FieldGeometry::default(), 6);
        let blue = world.team(TeamColor::Blue);
        assert_eq!(blue.len(), 6);
        assert!(blue.iter().all(|p| p.pose == Pose::ZERO && p.team == TeamColor::Blue));
        assert_eq!(blue[5].slot, SlotId(5));
    }

    #[test]
    fn update_tracks_detected_pose() {
        let mut world = TrackedWorld::new(FieldGeometry::default(), 6);
        world.update(&frame_with(TeamColor::Yellow, 2, Pose::new(10.0, 20.0, 0.5)), 0.016);
        assert_eq!(world.team(TeamColor::Yellow)[2].pose, Pose::new(10.0, 20.0, 0.5));
        assert_eq!(world.team(TeamColor::Blue)[2].pose, Pose::ZERO);
        assert!((world.elapsed() - 0.016).abs() < 1e-12);
    }

    #[test]
    fn unknown_slots_and_bad_poses_are_ignored() {
        let mut world = TrackedWorld::new(FieldGeometry::default(), 2);
        world.update(&frame_with(TeamColor::Blue, 7, Pose::new(1.0, 1.0, 0.0)), 0.0);
        world.update(&frame_with(TeamColor::Blue, 0, Pose::new(f64::NAN, 1.0, 0.0)), 0.0);
        assert!(world.team(TeamColor::Blue).iter().all(|p| p.pose == Pose::ZERO));
    }

    #[test]
    fn referee_state_is_stored() {
        let mut world = TrackedWorld::new(FieldGeometry::default(), 1);
        let state = RefereeState {
            command: RefereeCommand::NormalStart,
            command_counter: 4,
        };
        world.apply_referee(state);
        assert_eq!(world.referee(), state);
    }
}
