//! Built-in demo strategy: line the team up across its own half.

use std::f64::consts::PI;

use robofleet_runtime::Strategy;
use robofleet_types::{
    Command, DebugAnnotation, Decision, FleetError, GameState, Pose, Position, RefereeCommand,
    TeamColor,
};

/// Robots hold a vertical line at `depth` from the centre line, `spacing`
/// apart, facing the opponent goal.  Any referee halt or stop freezes them.
#[derive(Debug, Clone)]
pub struct Formation {
    depth: f64,
    spacing: f64,
}

impl Default for Formation {
    fn default() -> Self {
        Self {
            depth: 1500.0,
            spacing: 600.0,
        }
    }
}

impl Formation {
    fn slot_target(&self, team: TeamColor, index: usize, count: usize) -> Pose {
        // Blue defends the negative half and attacks towards +x.
        let (side, facing) = match team {
            TeamColor::Blue => (-1.0, 0.0),
            TeamColor::Yellow => (1.0, PI),
        };
        let offset = index as f64 - (count.saturating_sub(1)) as f64 / 2.0;
        Pose::new(side * self.depth, offset * self.spacing, facing)
    }
}

fn must_hold(command: RefereeCommand) -> bool {
    matches!(
        command,
        RefereeCommand::Halt | RefereeCommand::Stop | RefereeCommand::Timeout
    )
}

impl Strategy for Formation {
    fn decide(&mut self, state: &GameState) -> Result<Decision, FleetError> {
        if must_hold(state.referee.command) {
            let commands = state.friends.iter().map(Command::stop).collect();
            return Ok(Decision::new(commands).with_debug(vec![DebugAnnotation::Text {
                message: format!("holding for {:?}", state.referee.command),
            }]));
        }

        let count = state.friends.len();
        let mut commands = Vec::with_capacity(count);
        let mut debug = Vec::with_capacity(count);
        for (index, robot) in state.friends.iter().enumerate() {
            let target = self.slot_target(robot.team, index, count);
            commands.push(Command::move_to_and_rotate(
                robot,
                target,
                &state.field.bounds,
            )?);
            debug.push(DebugAnnotation::Target {
                slot: robot.slot,
                pose: target,
            });
        }
        if let Some(first) = state.friends.first() {
            let x = self.slot_target(first.team, 0, count).position.x;
            let bounds = &state.field.bounds;
            debug.push(DebugAnnotation::Line {
                start: Position::new(x, bounds.y_bottom),
                end: Position::new(x, bounds.y_top),
            });
        }
        Ok(Decision::new(commands).with_debug(debug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_types::{FieldGeometry, Player, RefereeState, SlotId};

    fn state(team: TeamColor, command: RefereeCommand) -> GameState {
        GameState {
            field: FieldGeometry::default(),
            referee: RefereeState {
                command,
                command_counter: 1,
            },
            friends: (0..3)
                .map(|i| Player::new(SlotId(i), team, Pose::ZERO))
                .collect(),
            enemies: Vec::new(),
            timestamp: 1.0,
            debug: None,
        }
    }

    #[test]
    fn halt_stops_everyone() {
        let decision = Formation::default()
            .decide(&state(TeamColor::Blue, RefereeCommand::Halt))
            .unwrap();
        assert_eq!(decision.commands.len(), 3);
        assert!(decision.commands.iter().all(Command::is_stop));
    }

    #[test]
    fn line_is_centred_on_own_half() {
        let decision = Formation::default()
            .decide(&state(TeamColor::Blue, RefereeCommand::ForceStart))
            .unwrap();
        let poses: Vec<Pose> = decision.commands.iter().map(Command::pose).collect();
        assert_eq!(poses[0], Pose::new(-1500.0, -600.0, 0.0));
        assert_eq!(poses[1], Pose::new(-1500.0, 0.0, 0.0));
        assert_eq!(poses[2], Pose::new(-1500.0, 600.0, 0.0));
        // Three targets plus the line.
        assert_eq!(decision.debug.len(), 4);

        let yellow = Formation::default()
            .decide(&state(TeamColor::Yellow, RefereeCommand::NormalStart))
            .unwrap();
        assert!(yellow.commands.iter().all(|c| c.pose().position.x > 0.0));
        assert!(yellow.commands.iter().all(|c| c.pose().orientation == PI));
        assert!(decision.commands.iter().all(|c| c.pose().orientation == 0.0));
    }
}
