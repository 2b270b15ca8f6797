//! In-process kinematic field simulation for running the full loop headless.
//!
//! [`SimField`] owns the pose of every robot on both teams.  Velocity
//! commands sent through its [`CommandSender`] are integrated on every
//! [`SimField::step`], which also publishes a fresh [`VisionFrame`] with the
//! next sequence number and capture time.  [`SimTransports`] hands out one
//! endpoint per channel, all backed by the same field, and records everything
//! the orchestrator sends so tests can inspect it.
//!
//! # Example
//!
//! ```rust
//! use robofleet_hal::sim::{SimConfig, SimField};
//! use robofleet_hal::transport::{TransportFactory, TransportKind};
//! use robofleet_types::{Command, Player, Pose, SlotId, TeamColor};
//!
//! let field = SimField::new(SimConfig::default());
//! let transports = field.transports();
//!
//! let mut vision = transports.vision_receiver().unwrap();
//! assert!(vision.latest_frame().is_none());
//!
//! field.step();
//! assert_eq!(vision.latest_frame().unwrap().frame_number, 1);
//!
//! let mut link = transports.command_sender(TransportKind::Network).unwrap();
//! let robot = Player::new(SlotId(0), TeamColor::Blue, Pose::ZERO);
//! link.send(&Command::stop(&robot)).unwrap();
//! assert_eq!(field.sent_commands().len(), 1);
//! ```

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use robofleet_types::{
    Command, DebugAnnotation, DebugInput, FleetError, Pose, Position, RefereeState,
    RobotDetection, SlotId, TeamColor, VisionFrame,
};

use crate::transport::{
    CommandSender, DebugReceiver, DebugSender, ROBOT_COMMAND_CHANNEL, RefereeReceiver,
    TransportFactory, TransportKind, VisionReceiver,
};

/// Tunables of the simulated field.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Capture-time gap between consecutive frames, in seconds.
    pub frame_period: f64,
    /// Field-plane speed (units per second) of a unit velocity command.
    pub speed_scale: f64,
    pub slots_per_team: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_period: 1.0 / 60.0,
            speed_scale: 3000.0,
            slots_per_team: 6,
        }
    }
}

#[derive(Debug)]
struct TeamSim {
    poses: Vec<Pose>,
    velocities: Vec<Pose>,
}

impl TeamSim {
    fn new(slots: usize) -> Self {
        Self {
            poses: vec![Pose::ZERO; slots],
            velocities: vec![Pose::ZERO; slots],
        }
    }

    fn detections(&self) -> Vec<RobotDetection> {
        self.poses
            .iter()
            .enumerate()
            .map(|(i, pose)| RobotDetection {
                slot: SlotId(i),
                pose: *pose,
            })
            .collect()
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    blue: TeamSim,
    yellow: TeamSim,
    frame_number: u64,
    clock: f64,
    latest: Option<VisionFrame>,
    sent: Vec<Command>,
    debug_batches: Vec<Vec<DebugAnnotation>>,
    debug_inbox: VecDeque<DebugInput>,
    referee: Option<RefereeState>,
    fail_commands: bool,
    requested_kinds: Vec<TransportKind>,
}

impl SimState {
    fn team_mut(&mut self, team: TeamColor) -> &mut TeamSim {
        match team {
            TeamColor::Blue => &mut self.blue,
            TeamColor::Yellow => &mut self.yellow,
        }
    }
}

/// Shared handle to one simulated field.  Clones refer to the same field.
#[derive(Debug, Clone)]
pub struct SimField {
    state: Arc<Mutex<SimState>>,
}

impl SimField {
    pub fn new(config: SimConfig) -> Self {
        let slots = config.slots_per_team;
        Self {
            state: Arc::new(Mutex::new(SimState {
                config,
                blue: TeamSim::new(slots),
                yellow: TeamSim::new(slots),
                frame_number: 0,
                clock: 0.0,
                latest: None,
                sent: Vec::new(),
                debug_batches: Vec::new(),
                debug_inbox: VecDeque::new(),
                referee: None,
                fail_commands: false,
                requested_kinds: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock()
    }

    /// A [`TransportFactory`] whose endpoints all act on this field.
    pub fn transports(&self) -> SimTransports {
        SimTransports {
            field: self.clone(),
        }
    }

    /// Teleport a robot.  Ignored for slots outside the roster.
    pub fn place(&self, team: TeamColor, slot: SlotId, pose: Pose) {
        if let Some(p) = self.lock().team_mut(team).poses.get_mut(slot.index()) {
            *p = pose;
        }
    }

    pub fn pose(&self, team: TeamColor, slot: SlotId) -> Option<Pose> {
        self.lock().team_mut(team).poses.get(slot.index()).copied()
    }

    /// Advance simulated time by one frame period, integrate the current
    /// velocity commands, and publish the resulting frame.  Returns the new
    /// frame number.
    pub fn step(&self) -> u64 {
        let mut state = self.lock();
        let dt = state.config.frame_period;
        let scale = state.config.speed_scale;
        for team in [TeamColor::Blue, TeamColor::Yellow] {
            let sim = state.team_mut(team);
            for (pose, velocity) in sim.poses.iter_mut().zip(&sim.velocities) {
                let field_velocity = velocity.position.rotated(pose.orientation);
                pose.position = pose.position
                    + Position::new(field_velocity.x * scale * dt, field_velocity.y * scale * dt);
                pose.orientation = wrap_angle(pose.orientation + velocity.orientation * dt);
            }
        }
        state.frame_number += 1;
        state.clock += dt;
        let frame = VisionFrame {
            frame_number: state.frame_number,
            t_capture: state.clock,
            robots_blue: state.blue.detections(),
            robots_yellow: state.yellow.detections(),
            balls: Vec::new(),
        };
        state.latest = Some(frame);
        state.frame_number
    }

    /// Replace the latest frame with `frame` verbatim, bypassing the
    /// kinematics.  Useful to replay stale or crafted frames.
    pub fn publish_frame(&self, frame: VisionFrame) {
        let mut state = self.lock();
        state.frame_number = state.frame_number.max(frame.frame_number);
        state.clock = state.clock.max(frame.t_capture);
        state.latest = Some(frame);
    }

    /// Every command received so far, in arrival order.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.lock().sent.clone()
    }

    pub fn clear_sent_commands(&self) {
        self.lock().sent.clear();
    }

    pub fn debug_batches(&self) -> Vec<Vec<DebugAnnotation>> {
        self.lock().debug_batches.clone()
    }

    /// Queue input for the next [`DebugReceiver::receive`].
    pub fn push_debug_input(&self, input: DebugInput) {
        self.lock().debug_inbox.push_back(input);
    }

    pub fn set_referee(&self, referee: RefereeState) {
        self.lock().referee = Some(referee);
    }

    /// Make every subsequent command send fail with a transport error.
    pub fn set_command_failure(&self, fail: bool) {
        self.lock().fail_commands = fail;
    }

    /// Transport kinds requested through [`TransportFactory::command_sender`].
    pub fn requested_kinds(&self) -> Vec<TransportKind> {
        self.lock().requested_kinds.clone()
    }
}

fn wrap_angle(angle: f64) -> f64 {
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

struct SimCommandSender {
    field: SimField,
}

impl CommandSender for SimCommandSender {
    fn send(&mut self, command: &Command) -> Result<(), FleetError> {
        let mut state = self.field.lock();
        if state.fail_commands {
            return Err(FleetError::transport(
                ROBOT_COMMAND_CHANNEL,
                "simulated link failure",
            ));
        }
        if let Some(v) = state
            .team_mut(command.team())
            .velocities
            .get_mut(command.slot().index())
        {
            *v = command.pose();
        }
        state.sent.push(command.clone());
        Ok(())
    }
}

struct SimDebugSender {
    field: SimField,
}

impl DebugSender for SimDebugSender {
    fn send(&mut self, batch: &[DebugAnnotation]) -> Result<(), FleetError> {
        self.field.lock().debug_batches.push(batch.to_vec());
        Ok(())
    }
}

struct SimDebugReceiver {
    field: SimField,
}

impl DebugReceiver for SimDebugReceiver {
    fn receive(&mut self) -> Option<DebugInput> {
        self.field.lock().debug_inbox.pop_front()
    }
}

struct SimRefereeReceiver {
    field: SimField,
}

impl RefereeReceiver for SimRefereeReceiver {
    fn latest(&mut self) -> Option<RefereeState> {
        self.field.lock().referee.take()
    }
}

struct SimVisionReceiver {
    field: SimField,
}

impl VisionReceiver for SimVisionReceiver {
    fn latest_frame(&mut self) -> Option<VisionFrame> {
        self.field.lock().latest.clone()
    }
}

/// [`TransportFactory`] backed by a [`SimField`].  Both transport kinds
/// reach the same simulated robots.
#[derive(Debug, Clone)]
pub struct SimTransports {
    field: SimField,
}

impl SimTransports {
    pub fn field(&self) -> &SimField {
        &self.field
    }
}

impl TransportFactory for SimTransports {
    fn command_sender(&self, kind: TransportKind) -> Result<Box<dyn CommandSender>, FleetError> {
        self.field.lock().requested_kinds.push(kind);
        Ok(Box::new(SimCommandSender {
            field: self.field.clone(),
        }))
    }

    fn debug_sender(&self) -> Result<Box<dyn DebugSender>, FleetError> {
        Ok(Box::new(SimDebugSender {
            field: self.field.clone(),
        }))
    }

    fn debug_receiver(&self) -> Result<Box<dyn DebugReceiver>, FleetError> {
        Ok(Box::new(SimDebugReceiver {
            field: self.field.clone(),
        }))
    }

    fn referee_receiver(&self) -> Result<Box<dyn RefereeReceiver>, FleetError> {
        Ok(Box::new(SimRefereeReceiver {
            field: self.field.clone(),
        }))
    }

    fn vision_receiver(&self) -> Result<Box<dyn VisionReceiver>, FleetError> {
        Ok(Box::new(SimVisionReceiver {
            field: self.field.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robofleet_types::{Player, RefereeCommand};

    const EPS: f64 = 1e-9;

    fn unit_config() -> SimConfig {
        SimConfig {
            frame_period: 0.5,
            speed_scale: 1.0,
            slots_per_team: 2,
        }
    }

    #[test]
    fn step_publishes_increasing_frames() {
        let field = SimField::new(unit_config());
        let mut vision = field.transports().vision_receiver().unwrap();
        assert!(vision.latest_frame().is_none());

        assert_eq!(field.step(), 1);
        assert_eq!(field.step(), 2);
        let frame = vision.latest_frame().unwrap();
        assert_eq!(frame.frame_number, 2);
        assert!((frame.t_capture - 1.0).abs() < EPS);
        assert_eq!(frame.robots_blue.len(), 2);
        // Latest-wins: polling again returns the same frame.
        assert_eq!(vision.latest_frame().unwrap().frame_number, 2);
    }

    #[test]
    fn velocity_commands_are_integrated_in_body_frame() {
        let field = SimField::new(unit_config());
        let robot = Player::new(SlotId(1), TeamColor::Yellow, Pose::ZERO);
        // Facing +y.
        field.place(TeamColor::Yellow, SlotId(1), Pose::new(0.0, 0.0, PI / 2.0));

        let mut link = field.transports().command_sender(TransportKind::Serial).unwrap();
        let forward = Command::stop(&robot).with_velocity(Pose::new(2.0, 0.0, 0.0));
        link.send(&forward).unwrap();
        field.step();

        let pose = field.pose(TeamColor::Yellow, SlotId(1)).unwrap();
        // Body +x is field +y; 2 units/s for 0.5 s.
        assert!(pose.position.x.abs() < EPS);
        assert!((pose.position.y - 1.0).abs() < EPS);
        assert_eq!(field.requested_kinds(), vec![TransportKind::Serial]);
    }

    #[test]
    fn command_failure_is_reported_and_not_recorded() {
        let field = SimField::new(unit_config());
        let robot = Player::new(SlotId(0), TeamColor::Blue, Pose::ZERO);
        let mut link = field.transports().command_sender(TransportKind::Network).unwrap();

        field.set_command_failure(true);
        assert!(matches!(
            link.send(&Command::stop(&robot)),
            Err(FleetError::Transport { .. })
        ));
        assert!(field.sent_commands().is_empty());

        field.set_command_failure(false);
        link.send(&Command::stop(&robot)).unwrap();
        assert_eq!(field.sent_commands().len(), 1);
    }

    #[test]
    fn referee_and_debug_inputs_are_consumed_once() {
        let field = SimField::new(unit_config());
        let transports = field.transports();
        let mut referee = transports.referee_receiver().unwrap();
        let mut debug_rx = transports.debug_receiver().unwrap();

        field.set_referee(RefereeState {
            command: RefereeCommand::ForceStart,
            command_counter: 1,
        });
        field.push_debug_input(DebugInput {
            topic: "ui".to_string(),
            body: "select 3".to_string(),
        });

        assert_eq!(referee.latest().unwrap().command, RefereeCommand::ForceStart);
        assert!(referee.latest().is_none());
        assert_eq!(debug_rx.receive().unwrap().body, "select 3");
        assert!(debug_rx.receive().is_none());
    }

    #[test]
    fn publish_frame_overrides_latest() {
        let field = SimField::new(unit_config());
        let mut vision = field.transports().vision_receiver().unwrap();
        field.publish_frame(VisionFrame {
            frame_number: 40,
            t_capture: 2.0,
            ..VisionFrame::default()
        });
        assert_eq!(vision.latest_frame().unwrap().frame_number, 40);
        // Kinematic steps continue after the injected frame.
        assert_eq!(field.step(), 41);
    }

    #[test]
    fn wrap_angle_stays_in_half_open_range() {
        assert!((wrap_angle(3.0 * PI / 2.0) - (-PI / 2.0)).abs() < EPS);
        assert!((wrap_angle(-PI) - PI).abs() < EPS);
        assert_eq!(wrap_angle(0.3), 0.3);
        assert_eq!(wrap_angle(-2.5), -2.5);
    }

    #[test]
    fn stationary_robot_pose_is_reported_exactly() {
        let field = SimField::new(unit_config());
        let placed = Pose::new(100.0, 200.0, 0.3);
        field.place(TeamColor::Blue, SlotId(0), placed);
        field.step();

        let frame = field.transports().vision_receiver().unwrap().latest_frame().unwrap();
        assert_eq!(frame.robots_blue[0].pose, placed);
    }
}
