//! [`Orchestrator`] – the real-time loop owner.
//!
//! The orchestrator is a small state machine:
//!
//! ```text
//!   Idle ──start──▶ Starting ──▶ Running ──stop──▶ Stopping ──▶ Idle
//!                      │                                          ▲
//!                      └──────────── wiring failed ───────────────┘
//! ```
//!
//! `start` wires one endpoint per channel through the [`TransportFactory`],
//! builds the world model with the caller's initializer, and launches the
//! loop unit on a dedicated thread.  `stop` raises the
//! termination flag, joins that thread, clears the flag, and then sends one
//! Stop command to every robot of the active team so nothing keeps driving
//! on its last velocity.
//!
//! All session state lives in one [`Orchestrator`] value, so several
//! independent sessions can coexist in one process.
//!
//! # Example
//!
//! ```rust,no_run
//! use robofleet_hal::{SimConfig, SimField, TrackedWorld, TransportKind};
//! use robofleet_runtime::{Orchestrator, OrchestratorConfig};
//! use robofleet_types::{Decision, FleetError, GameState};
//!
//! let field = SimField::new(SimConfig::default());
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), field.transports())?;
//!
//! orchestrator.start(
//!     |_: &GameState| Ok::<_, FleetError>(Decision::default()),
//!     |_| Ok(TrackedWorld::new(Default::default(), 6)),
//!     true,
//!     TransportKind::Network,
//! )?;
//! field.step();
//! orchestrator.stop()?;
//! # Ok::<(), FleetError>(())
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use robofleet_hal::{
    CommandSender, Controller, ControllerConfig, DebugReceiver, TransportFactory, TransportKind,
    WorldModel,
};
use robofleet_types::{Command, FleetError, GameState, TeamColor};
use tracing::{debug, info, warn};

use crate::cycle::{LoopUnit, panic_message};
use crate::stats::{CycleStats, StatsCounters};
use crate::strategy::Strategy;

const LOOP_THREAD_NAME: &str = "robofleet-loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Orchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Team whose robots this orchestrator drives.
    pub team_color: TeamColor,
    /// Number of controllable slots; one controller is built per slot.
    pub robot_slots: usize,
    pub controller: ControllerConfig,
    /// World time that must pass between two strategy runs.
    pub strategy_period: Duration,
    /// Sleep between polls while waiting for the first vision frame.
    pub first_frame_poll: Duration,
    /// Give up waiting for the first frame after this long.  `None` waits
    /// until stopped.
    pub first_frame_timeout: Option<Duration>,
    /// Sleep after a pass that found no new frame.
    pub idle_backoff: Duration,
    /// Route SIGINT/SIGTERM into [`Orchestrator::stop`].
    pub install_signal_handler: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            team_color: TeamColor::Blue,
            robot_slots: 6,
            controller: ControllerConfig::default(),
            strategy_period: Duration::from_millis(180),
            first_frame_poll: Duration::from_millis(10),
            first_frame_timeout: None,
            idle_backoff: Duration::from_millis(1),
            install_signal_handler: true,
        }
    }
}

impl OrchestratorConfig {
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] for zero slots, a zero poll
    /// interval, or an invalid controller configuration.
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.robot_slots == 0 {
            return Err(FleetError::Configuration(
                "robot_slots must be at least 1".to_string(),
            ));
        }
        if self.first_frame_poll.is_zero() {
            return Err(FleetError::Configuration(
                "first_frame_poll must be non-zero".to_string(),
            ));
        }
        self.controller.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// The world model plus what a snapshot needs besides it.
pub(crate) struct WorldCell<W> {
    pub(crate) world: W,
    debug_rx: Box<dyn DebugReceiver>,
    /// Capture time of the newest integrated frame.
    pub(crate) timestamp: f64,
}

impl<W: WorldModel> WorldCell<W> {
    /// Build a snapshot for `team`, draining any pending debug input.
    pub(crate) fn snapshot(&mut self, team: TeamColor) -> GameState {
        GameState {
            field: self.world.field(),
            referee: self.world.referee(),
            friends: self.world.team(team),
            enemies: self.world.team(team.opponent()),
            timestamp: self.timestamp,
            debug: self.debug_rx.receive(),
        }
    }
}

type LoopResult = Result<(Box<dyn CommandSender>, Result<(), FleetError>), String>;

/// State shared between the caller, the loop thread and the interrupt
/// handler.
pub(crate) struct Session<W> {
    team: TeamColor,
    terminate: AtomicBool,
    phase: Mutex<Phase>,
    phase_changed: Condvar,
    loop_unit: Mutex<Option<JoinHandle<LoopResult>>>,
    exited: Mutex<bool>,
    exited_changed: Condvar,
    outcome: Mutex<Option<Result<(), FleetError>>>,
    /// Result of the most recent Stop broadcast, whoever ran it.
    last_stop: Mutex<Option<Result<(), FleetError>>>,
    world: Mutex<Option<WorldCell<W>>>,
    handler_installed: AtomicBool,
    pub(crate) stats: StatsCounters,
}

impl<W: WorldModel> Session<W> {
    pub(crate) fn new(team: TeamColor) -> Self {
        Self {
            team,
            terminate: AtomicBool::new(false),
            phase: Mutex::new(Phase::Idle),
            phase_changed: Condvar::new(),
            loop_unit: Mutex::new(None),
            exited: Mutex::new(false),
            exited_changed: Condvar::new(),
            outcome: Mutex::new(None),
            last_stop: Mutex::new(None),
            world: Mutex::new(None),
            handler_installed: AtomicBool::new(false),
            stats: StatsCounters::default(),
        }
    }

    pub(crate) fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    pub(crate) fn lock_world(&self) -> MutexGuard<'_, Option<WorldCell<W>>> {
        self.world.lock()
    }

    fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn set_phase(&self, next: Phase) {
        let mut phase = self.phase.lock();
        if *phase != next {
            info!(from = %*phase, to = %next, "phase transition");
        }
        *phase = next;
        self.phase_changed.notify_all();
    }

    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exited_changed.notify_all();
    }

    fn wait_for_exit(&self) {
        let mut exited = self.exited.lock();
        while !*exited {
            self.exited_changed.wait(&mut exited);
        }
    }

    /// The full stop sequence.  Safe to call from any thread other than the
    /// loop thread, any number of times.
    fn shutdown(&self) -> Result<(), FleetError> {
        {
            let mut phase = self.phase.lock();
            loop {
                let current = *phase;
                match current {
                    Phase::Idle => return Ok(()),
                    Phase::Running => break,
                    Phase::Starting | Phase::Stopping => self.phase_changed.wait(&mut phase),
                }
            }
            *phase = Phase::Stopping;
            self.phase_changed.notify_all();
        }
        info!(team = %self.team, "stopping loop unit");

        self.terminate.store(true, Ordering::SeqCst);
        let handle = self.loop_unit.lock().take();
        let joined = handle.map(|h| {
            h.join()
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())))
        });
        self.terminate.store(false, Ordering::SeqCst);

        let sender = match joined {
            Some(Ok((sender, outcome))) => {
                if let Err(e) = &outcome {
                    warn!(error = %e, "loop unit ended with an error");
                }
                *self.outcome.lock() = Some(outcome);
                Some(sender)
            }
            Some(Err(reason)) => {
                warn!(%reason, "loop unit panicked");
                *self.outcome.lock() = Some(Err(FleetError::CycleFailure {
                    stage: "loop".to_string(),
                    details: reason,
                }));
                None
            }
            None => None,
        };

        let result = self.broadcast_stop(sender);
        *self.last_stop.lock() = Some(result.clone());
        self.set_phase(Phase::Idle);
        match &result {
            Ok(()) => info!(team = %self.team, "orchestrator stopped"),
            Err(e) => warn!(error = %e, "orchestrator stopped; robots may still be moving"),
        }
        result
    }

    /// Send one Stop per robot of the active team.
    fn broadcast_stop(&self, sender: Option<Box<dyn CommandSender>>) -> Result<(), FleetError> {
        let Some(mut sender) = sender else {
            return Err(FleetError::ShutdownFailure(
                "robot command link was lost with the loop unit".to_string(),
            ));
        };
        let roster = match self.world.lock().as_ref() {
            Some(cell) => cell.world.team(self.team),
            None => {
                return Err(FleetError::ShutdownFailure(
                    "no world model to resolve the active team".to_string(),
                ));
            }
        };

        let failures: Vec<String> = roster
            .iter()
            .filter_map(|player| {
                sender
                    .send(&Command::stop(player))
                    .err()
                    .map(|e| format!("{}: {e}", player.slot))
            })
            .collect();

        if failures.is_empty() {
            debug!(robots = roster.len(), "stop broadcast sent");
            Ok(())
        } else {
            Err(FleetError::ShutdownFailure(format!(
                "{} of {} stop commands failed ({})",
                failures.len(),
                roster.len(),
                failures.join("; ")
            )))
        }
    }
}

/// Object-safe view of a session, so [`StopHandle`] does not carry the
/// world-model type.
trait SessionControl: Send + Sync {
    fn shutdown(&self) -> Result<(), FleetError>;
    fn phase(&self) -> Phase;
}

impl<W: WorldModel> SessionControl for Session<W> {
    fn shutdown(&self) -> Result<(), FleetError> {
        Session::shutdown(self)
    }

    fn phase(&self) -> Phase {
        Session::phase(self)
    }
}

/// Clonable handle that runs the stop sequence of one orchestrator from any
/// thread.  Mainly useful while a synchronous [`Orchestrator::start`] blocks
/// the owning thread.
#[derive(Clone)]
pub struct StopHandle {
    session: Arc<dyn SessionControl>,
}

impl StopHandle {
    /// Same as [`Orchestrator::stop`].
    pub fn stop(&self) -> Result<(), FleetError> {
        self.session.shutdown()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("phase", &self.phase())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Owns one control session: the loop thread, its termination flag, the
/// world model and the per-slot controllers.
pub struct Orchestrator<W: WorldModel + 'static> {
    config: OrchestratorConfig,
    transports: Arc<dyn TransportFactory>,
    session: Arc<Session<W>>,
}

impl<W: WorldModel + 'static> Orchestrator<W> {
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if `config` is invalid.
    pub fn new(
        config: OrchestratorConfig,
        transports: impl TransportFactory + 'static,
    ) -> Result<Self, FleetError> {
        config.validate()?;
        Ok(Self {
            session: Arc::new(Session::new(config.team_color)),
            config,
            transports: Arc::new(transports),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn stats(&self) -> CycleStats {
        self.session.stats.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            session: self.session.clone(),
        }
    }

    /// Wire a new session and launch the loop unit.
    ///
    /// A running session is stopped first.  With `asynchronous == false`
    /// the call blocks until the loop unit exits (interrupt signal or a
    /// [`StopHandle`]) and the stop sequence has completed.
    ///
    /// # Errors
    ///
    /// - [`FleetError::Initialization`] if a transport endpoint or the world
    ///   model cannot be created.  The orchestrator stays `Idle`.
    /// - In synchronous mode, whatever ended the loop unit, or the
    ///   [`FleetError::ShutdownFailure`] of the final stop broadcast.
    pub fn start<S, I>(
        &self,
        strategy: S,
        initializer: I,
        asynchronous: bool,
        kind: TransportKind,
    ) -> Result<(), FleetError>
    where
        S: Strategy + 'static,
        I: FnOnce(TeamColor) -> Result<W, FleetError>,
    {
        self.enter_starting()?;
        info!(team = %self.config.team_color, transport = %kind, asynchronous, "starting orchestrator");

        let unit = match self.wire(Box::new(strategy), initializer, kind) {
            Ok(unit) => unit,
            Err(e) => {
                warn!(error = %e, "start aborted");
                *self.session.world.lock() = None;
                self.session.set_phase(Phase::Idle);
                return Err(e);
            }
        };

        self.install_signal_handler();
        *self.session.exited.lock() = false;
        *self.session.outcome.lock() = None;
        *self.session.last_stop.lock() = None;

        let session = Arc::clone(&self.session);
        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| unit.run()))
                    .map_err(|payload| panic_message(payload.as_ref()));
                session.mark_exited();
                result
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.session.world.lock() = None;
                self.session.set_phase(Phase::Idle);
                return Err(FleetError::Initialization(format!(
                    "cannot spawn loop thread: {e}"
                )));
            }
        };
        *self.session.loop_unit.lock() = Some(handle);
        self.session.set_phase(Phase::Running);
        info!(team = %self.config.team_color, slots = self.config.robot_slots, "orchestrator running");

        if asynchronous {
            return Ok(());
        }

        self.session.wait_for_exit();
        // The stop sequence may already have run on the interrupt handler or
        // a StopHandle; its broadcast result is reported here either way.
        let stopped = self.session.shutdown();
        let halted = self.session.last_stop.lock().take().unwrap_or(stopped);
        match self.session.outcome.lock().take() {
            Some(Err(e)) => Err(e),
            _ => halted,
        }
    }

    /// Terminate the loop unit and halt every robot of the active team.
    ///
    /// A no-op when already `Idle`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ShutdownFailure`] when the Stop broadcast could
    /// not be completed.  The loop unit has exited and the orchestrator is
    /// `Idle` either way.
    pub fn stop(&self) -> Result<(), FleetError> {
        self.session.shutdown()
    }

    /// Snapshot of the world as the strategy would see it now.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Initialization`] if no session has ever been
    /// started.
    pub fn get_game_state(&self) -> Result<GameState, FleetError> {
        let mut world = self.session.lock_world();
        let cell = world.as_mut().ok_or_else(|| {
            FleetError::Initialization("no world model; start the orchestrator first".to_string())
        })?;
        Ok(cell.snapshot(self.config.team_color))
    }

    fn enter_starting(&self) -> Result<(), FleetError> {
        let mut phase = self.session.phase.lock();
        loop {
            let current = *phase;
            match current {
                Phase::Idle => {
                    *phase = Phase::Starting;
                    self.session.phase_changed.notify_all();
                    return Ok(());
                }
                Phase::Starting => {
                    return Err(FleetError::Initialization(
                        "another start is already in progress".to_string(),
                    ));
                }
                Phase::Running => {
                    drop(phase);
                    info!("restart requested; stopping the running session first");
                    if let Err(e) = self.session.shutdown() {
                        warn!(error = %e, "stop before restart incomplete");
                    }
                    phase = self.session.phase.lock();
                }
                Phase::Stopping => self.session.phase_changed.wait(&mut phase),
            }
        }
    }

    fn wire<I>(
        &self,
        strategy: Box<dyn Strategy>,
        initializer: I,
        kind: TransportKind,
    ) -> Result<LoopUnit<W>, FleetError>
    where
        I: FnOnce(TeamColor) -> Result<W, FleetError>,
    {
        let endpoint = |name: &str, e: FleetError| {
            FleetError::Initialization(format!("{name} endpoint: {e}"))
        };
        let command_sender = self
            .transports
            .command_sender(kind)
            .map_err(|e| endpoint("robot command", e))?;
        let debug_sender = self
            .transports
            .debug_sender()
            .map_err(|e| endpoint("debug", e))?;
        let debug_rx = self
            .transports
            .debug_receiver()
            .map_err(|e| endpoint("debug input", e))?;
        let referee = self
            .transports
            .referee_receiver()
            .map_err(|e| endpoint("referee", e))?;
        let vision = self
            .transports
            .vision_receiver()
            .map_err(|e| endpoint("vision", e))?;

        let world = initializer(self.config.team_color)
            .map_err(|e| FleetError::Initialization(format!("world model: {e}")))?;

        let controllers = (0..self.config.robot_slots)
            .map(|_| Controller::new(self.config.controller.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        *self.session.world.lock() = Some(WorldCell {
            world,
            debug_rx,
            timestamp: 0.0,
        });

        Ok(LoopUnit {
            session: Arc::clone(&self.session),
            config: self.config.clone(),
            controllers,
            strategy,
            command_sender,
            debug_sender,
            referee,
            vision,
            last_frame_number: None,
            last_capture: None,
            last_decision: 0.0,
        })
    }

    /// Installs the interrupt handler once per orchestrator.  The handler
    /// holds a weak reference so it never keeps a dropped session alive.
    fn install_signal_handler(&self) {
        if !self.config.install_signal_handler
            || self.session.handler_installed.swap(true, Ordering::SeqCst)
        {
            return;
        }
        let session: Weak<Session<W>> = Arc::downgrade(&self.session);
        let installed = ctrlc::set_handler(move || {
            let Some(session) = session.upgrade() else {
                return;
            };
            info!("interrupt received");
            if let Err(e) = session.shutdown() {
                warn!(error = %e, "stop after interrupt incomplete");
            }
        });
        if let Err(e) = installed {
            warn!(error = %e, "interrupt handler not installed");
        }
    }
}

impl<W: WorldModel + 'static> Drop for Orchestrator<W> {
    fn drop(&mut self) {
        if self.session.phase() != Phase::Idle
            && let Err(e) = self.session.shutdown()
        {
            warn!(error = %e, "stop on drop incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_cadence() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.strategy_period, Duration::from_millis(180));
        assert_eq!(config.first_frame_poll, Duration::from_millis(10));
        assert_eq!(config.first_frame_timeout, None);
        assert_eq!(config.robot_slots, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_slots_and_zero_poll() {
        let config = OrchestratorConfig {
            robot_slots: 0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(FleetError::Configuration(_))));

        let config = OrchestratorConfig {
            first_frame_poll: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(FleetError::Configuration(_))));
    }

    #[test]
    fn phase_displays_lowercase() {
        assert_eq!(Phase::Stopping.to_string(), "stopping");
        assert_eq!(Phase::default(), Phase::Idle);
    }
}
