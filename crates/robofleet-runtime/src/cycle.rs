//! The loop unit: the acquisition → compute → dispatch cycle that runs on
//! its own thread while the orchestrator is `Running`.
//!
//! Each pass:
//!
//! 1. Fetch the newest vision frame (latest wins, nothing is queued).
//! 2. Skip the pass if its sequence number was already processed.
//! 3. Otherwise compute the capture-time delta, apply any new referee state,
//!    and update the world model.
//! 4. If more than one strategy period of world time has passed since the
//!    last decision, snapshot the world and run the strategy.
//! 5. Run each returned command through its slot's controller, in slot
//!    order, and send it.
//! 6. Forward the strategy's debug annotations as one batch.
//!
//! The termination flag is only checked between passes, so a pass is never
//! abandoned half way through its dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use robofleet_hal::{
    CommandSender, Controller, DebugSender, RefereeReceiver, VisionReceiver, WorldModel,
};
use robofleet_types::{Command, Decision, FleetError, GameState, Pose, VisionFrame};
use tracing::{debug, info, trace, warn};

use crate::orchestrator::{OrchestratorConfig, Session};
use crate::strategy::Strategy;

const FIRST_FRAME_NOTICE_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the loop thread owns for one session.
pub(crate) struct LoopUnit<W: WorldModel> {
    pub(crate) session: Arc<Session<W>>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) controllers: Vec<Controller>,
    pub(crate) strategy: Box<dyn Strategy>,
    pub(crate) command_sender: Box<dyn CommandSender>,
    pub(crate) debug_sender: Box<dyn DebugSender>,
    pub(crate) referee: Box<dyn RefereeReceiver>,
    pub(crate) vision: Box<dyn VisionReceiver>,
    pub(crate) last_frame_number: Option<u64>,
    pub(crate) last_capture: Option<f64>,
    /// World time of the last strategy run.
    pub(crate) last_decision: f64,
}

impl<W: WorldModel> LoopUnit<W> {
    /// Run until the termination flag is raised.  Hands the robot link back
    /// so the caller can broadcast the final stop commands.
    pub(crate) fn run(mut self) -> (Box<dyn CommandSender>, Result<(), FleetError>) {
        let outcome = match self.wait_for_first_frame() {
            Ok(true) => {
                info!(team = %self.config.team_color, "first vision frame received; loop running");
                while !self.session.terminate_requested() {
                    self.pass();
                }
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(error = %e, "loop unit giving up before the first frame");
                Err(e)
            }
        };
        debug!("loop unit exiting");
        (self.command_sender, outcome)
    }

    /// Poll until a frame has been observed.  Returns `Ok(false)` when
    /// termination was requested first.
    fn wait_for_first_frame(&mut self) -> Result<bool, FleetError> {
        let started = Instant::now();
        let mut last_notice = started;
        info!("waiting for the first vision frame");
        loop {
            if self.session.terminate_requested() {
                return Ok(false);
            }
            if self.vision.latest_frame().is_some() {
                return Ok(true);
            }
            if let Some(timeout) = self.config.first_frame_timeout
                && started.elapsed() >= timeout
            {
                return Err(FleetError::transport(
                    "vision",
                    format!("no frame received within {} ms", timeout.as_millis()),
                ));
            }
            if last_notice.elapsed() >= FIRST_FRAME_NOTICE_INTERVAL {
                info!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "still waiting for the first vision frame"
                );
                last_notice = Instant::now();
            }
            thread::sleep(self.config.first_frame_poll);
        }
    }

    fn pass(&mut self) {
        let session = Arc::clone(&self.session);
        let stats = &session.stats;
        stats.pass();

        let frame = match self.vision.latest_frame() {
            Some(frame) if Some(frame.frame_number) != self.last_frame_number => frame,
            _ => {
                stats.skipped_frame();
                if !self.config.idle_backoff.is_zero() {
                    thread::sleep(self.config.idle_backoff);
                }
                return;
            }
        };
        stats.novel_frame();

        let Some(state) = self.integrate(&frame) else {
            return;
        };

        stats.strategy_run();
        let decision = match self.decide(&state) {
            Ok(decision) => decision,
            Err(e) => {
                stats.cycle_failure();
                warn!(error = %e, frame = frame.frame_number, "strategy failed; skipping dispatch");
                return;
            }
        };

        let Decision {
            commands,
            debug: annotations,
        } = decision;
        self.dispatch(&state, commands);

        if !annotations.is_empty()
            && let Err(e) = self.debug_sender.send(&annotations)
        {
            self.session.stats.transport_error();
            warn!(error = %e, annotations = annotations.len(), "debug batch not sent");
        }
    }

    /// Feed a novel frame into the world model.  Returns a snapshot when the
    /// strategy is due this pass.
    fn integrate(&mut self, frame: &VisionFrame) -> Option<GameState> {
        let dt = self.capture_delta(frame);
        let team = self.config.team_color;

        let mut guard = self.session.lock_world();
        let Some(cell) = guard.as_mut() else {
            warn!("world model missing while running");
            return None;
        };
        if let Some(referee) = self.referee.latest() {
            debug!(command = ?referee.command, "referee update");
            cell.world.apply_referee(referee);
        }
        cell.world.update(frame, dt);
        cell.timestamp = frame.t_capture;
        self.session.stats.world_update();
        trace!(frame = frame.frame_number, dt, "world model updated");

        let period = self.config.strategy_period.as_secs_f64();
        if cell.timestamp - self.last_decision > period {
            self.last_decision = cell.timestamp;
            Some(cell.snapshot(team))
        } else {
            None
        }
    }

    fn capture_delta(&mut self, frame: &VisionFrame) -> f64 {
        let dt = self
            .last_capture
            .map_or(0.0, |previous| frame.t_capture - previous);
        self.last_frame_number = Some(frame.frame_number);
        self.last_capture = Some(frame.t_capture);
        dt
    }

    fn decide(&mut self, state: &GameState) -> Result<Decision, FleetError> {
        let strategy = &mut self.strategy;
        match panic::catch_unwind(AssertUnwindSafe(|| strategy.decide(state))) {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(e)) => Err(FleetError::CycleFailure {
                stage: "strategy".to_string(),
                details: e.to_string(),
            }),
            Err(payload) => Err(FleetError::CycleFailure {
                stage: "strategy".to_string(),
                details: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    /// Route every command through its slot's controller and send it.
    /// A failure on one slot never touches another slot's controller.
    /// Stop commands need neither a known pose nor a controller.
    pub(crate) fn dispatch(&mut self, state: &GameState, mut commands: Vec<Command>) {
        commands.sort_by_key(|c| c.slot());
        let team = self.config.team_color;
        for command in commands {
            let slot = command.slot();
            if command.team() != team {
                self.session.stats.cycle_failure();
                warn!(%slot, team = %command.team(), "command addressed to the other team; dropped");
                continue;
            }
            let current = state.friend(slot).map(|p| p.pose);
            if current.is_none() && !command.is_stop() {
                self.session.stats.cycle_failure();
                warn!(%slot, "no known pose for slot; command dropped");
                continue;
            }

            let velocity = match self.controllers.get_mut(slot.index()) {
                Some(controller) => {
                    let pose = current.unwrap_or(Pose::ZERO);
                    match panic::catch_unwind(AssertUnwindSafe(|| controller.update(&command, pose))) {
                        Ok(velocity) => velocity,
                        Err(payload) => {
                            controller.reset();
                            self.session.stats.cycle_failure();
                            warn!(
                                %slot,
                                reason = %panic_message(payload.as_ref()),
                                "controller failed; slot state reset"
                            );
                            continue;
                        }
                    }
                }
                None if command.is_stop() => Pose::ZERO,
                None => {
                    self.session.stats.cycle_failure();
                    warn!(%slot, slots = self.controllers.len(), "no controller for slot; command dropped");
                    continue;
                }
            };

            let outgoing = command.with_velocity(velocity);
            match self.command_sender.send(&outgoing) {
                Ok(()) => self.session.stats.dispatched(),
                Err(e) => {
                    self.session.stats.transport_error();
                    warn!(%slot, error = %e, "robot command not sent");
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_hal::{
        ControllerConfig, SimConfig, SimField, TrackedWorld, TransportFactory, TransportKind,
    };
    use robofleet_types::{FieldGeometry, Player, Position, RefereeState, SlotId, TeamColor};

    const EPS: f64 = 1e-9;

    fn loop_unit(field: &SimField, slots: usize) -> LoopUnit<TrackedWorld> {
        let transports = field.transports();
        let config = OrchestratorConfig {
            robot_slots: slots,
            controller: ControllerConfig::raw(),
            install_signal_handler: false,
            ..OrchestratorConfig::default()
        };
        LoopUnit {
            session: Arc::new(Session::new(TeamColor::Blue)),
            controllers: (0..slots)
                .map(|_| Controller::new(config.controller.clone()).unwrap())
                .collect(),
            config,
            strategy: Box::new(|_: &GameState| Ok::<_, FleetError>(Decision::default())),
            command_sender: transports.command_sender(TransportKind::Network).unwrap(),
            debug_sender: transports.debug_sender().unwrap(),
            referee: transports.referee_receiver().unwrap(),
            vision: transports.vision_receiver().unwrap(),
            last_frame_number: None,
            last_capture: None,
            last_decision: 0.0,
        }
    }

    fn state_with(slots: &[usize]) -> GameState {
        GameState {
            field: FieldGeometry::default(),
            referee: RefereeState::default(),
            friends: slots
                .iter()
                .map(|&i| Player::new(SlotId(i), TeamColor::Blue, Pose::ZERO))
                .collect(),
            enemies: Vec::new(),
            timestamp: 1.0,
            debug: None,
        }
    }

    fn move_slot(state: &GameState, slot: usize, x: f64) -> Command {
        let robot = state.friend(SlotId(slot)).unwrap();
        Command::move_to(robot, Position::new(x, 0.0), &state.field.bounds).unwrap()
    }

    #[test]
    fn stop_on_one_slot_leaves_other_slots_integral_alone() {
        let field = SimField::new(SimConfig::default());
        let mut unit = loop_unit(&field, 2);
        let state = state_with(&[0, 1]);
        let ki = unit.config.controller.ki;

        // Error of 100 on both slots: Ki·e = 1.0 per cycle, below the clamp.
        for _ in 0..3 {
            let commands = vec![move_slot(&state, 1, 100.0), move_slot(&state, 0, 100.0)];
            unit.dispatch(&state, commands);
        }
        assert!((unit.controllers[1].integral().x - 3.0 * ki * 100.0).abs() < EPS);

        let robot1 = state.friend(SlotId(1)).unwrap();
        unit.dispatch(&state, vec![Command::stop(robot1), move_slot(&state, 0, 100.0)]);

        assert!((unit.controllers[0].integral().x - 4.0 * ki * 100.0).abs() < EPS);
        assert_eq!(unit.controllers[0].last_error(), Position::new(100.0, 0.0));
        assert_eq!(unit.controllers[1].integral(), Position::ORIGIN);
        assert_eq!(unit.controllers[1].last_error(), Position::ORIGIN);

        let sent = field.sent_commands();
        assert_eq!(sent.len(), 8);
        assert_eq!(sent[6].slot(), SlotId(0));
        assert!(sent[7].is_stop() && sent[7].slot() == SlotId(1));
        assert_eq!(unit.session.stats.snapshot().dispatched, 8);
    }

    #[test]
    fn stop_without_known_pose_or_controller_is_still_sent() {
        let field = SimField::new(SimConfig::default());
        let mut unit = loop_unit(&field, 2);
        // Only slot 0 is tracked.
        let state = state_with(&[0]);
        let orphan = Player::new(SlotId(1), TeamColor::Blue, Pose::ZERO);
        let move_orphan =
            Command::move_to(&orphan, Position::new(10.0, 0.0), &state.field.bounds).unwrap();

        unit.dispatch(
            &state,
            vec![
                Command::stop_slot(SlotId(5), TeamColor::Blue),
                move_orphan,
                Command::stop_slot(SlotId(1), TeamColor::Blue),
            ],
        );

        let sent = field.sent_commands();
        let slots: Vec<SlotId> = sent.iter().map(Command::slot).collect();
        assert_eq!(slots, vec![SlotId(1), SlotId(5)]);
        assert!(sent.iter().all(|c| c.is_stop() && c.pose() == Pose::ZERO));

        let stats = unit.session.stats.snapshot();
        assert_eq!(stats.dispatched, 2);
        assert_eq!(stats.cycle_failures, 1);
    }

    #[test]
    fn commands_for_the_other_team_are_dropped() {
        let field = SimField::new(SimConfig::default());
        let mut unit = loop_unit(&field, 2);
        let state = state_with(&[0, 1]);

        unit.dispatch(&state, vec![Command::stop_slot(SlotId(0), TeamColor::Yellow)]);

        assert!(field.sent_commands().is_empty());
        assert_eq!(unit.session.stats.snapshot().cycle_failures, 1);
    }

    #[test]
    fn panic_message_extracts_str_and_string() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = panic::catch_unwind(|| panic!("{}", String::from("formatted"))).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted");
    }
}
