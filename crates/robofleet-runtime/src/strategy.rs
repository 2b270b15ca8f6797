//! [`Strategy`] – the decision-making collaborator.
//!
//! A strategy maps one [`GameState`] snapshot to a [`Decision`]: the commands
//! for this cycle and any debug annotations.  It runs on the loop thread, at
//! most once per strategy period.  Any `FnMut(&GameState) -> Result<Decision,
//! FleetError>` closure is a strategy.

use robofleet_types::{Decision, FleetError, GameState};

pub trait Strategy: Send {
    fn decide(&mut self, state: &GameState) -> Result<Decision, FleetError>;
}

impl<F> Strategy for F
where
    F: FnMut(&GameState) -> Result<Decision, FleetError> + Send,
{
    fn decide(&mut self, state: &GameState) -> Result<Decision, FleetError> {
        self(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_types::{Command, FieldGeometry, Player, Pose, RefereeState, SlotId, TeamColor};

    fn empty_state() -> GameState {
        GameState {
            field: FieldGeometry::default(),
            referee: RefereeState::default(),
            friends: vec![Player::new(SlotId(0), TeamColor::Blue, Pose::ZERO)],
            enemies: Vec::new(),
            timestamp: 0.0,
            debug: None,
        }
    }

    #[test]
    fn closures_are_strategies() {
        let mut calls = 0;
        let mut strategy = |state: &GameState| {
            calls += 1;
            Ok::<_, FleetError>(Decision::new(
                state.friends.iter().map(Command::stop).collect(),
            ))
        };
        let decision = Strategy::decide(&mut strategy, &empty_state()).unwrap();
        assert_eq!(decision.commands.len(), 1);
        assert!(decision.commands[0].is_stop());
        drop(strategy);
        assert_eq!(calls, 1);
    }
}
