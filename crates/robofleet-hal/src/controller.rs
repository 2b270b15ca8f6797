//! Per-robot closed-loop position controller.
//!
//! One [`Controller`] exists per robot slot.  Each dispatch cycle it receives
//! the slot's [`Command`] together with the robot's last known [`Pose`] and
//! returns a velocity [`Pose`]: linear velocity in the robot's body frame and
//! an angular rate.
//!
//! ```text
//! e      = target − current                 (field frame, per axis)
//! acc    = clamp(acc + Ki·e, ±max_integral)
//! u      = Kp·e + acc + Kd·(e − e_prev)
//! body   = rotate(u, −orientation)
//! body   = clamp(body, ±saturation)         (if configured)
//! theta  = Ktheta·(0 − orientation)
//! out    = mean(body, last K−1 outputs)     (if configured)
//! ```
//!
//! The heading term always steers towards a zero field-frame orientation; the
//! commanded orientation is not tracked.
//!
//! Two named configurations are provided:
//! [`ControllerConfig::saturated_filtered`] and [`ControllerConfig::raw`].
//!
//! # Example
//!
//! ```rust
//! use robofleet_hal::controller::{Controller, ControllerConfig};
//! use robofleet_types::{Command, FieldBounds, Player, Pose, Position, SlotId, TeamColor};
//!
//! let robot = Player::new(SlotId(0), TeamColor::Blue, Pose::ZERO);
//! let cmd = Command::move_to(&robot, Position::new(1000.0, 0.0), &FieldBounds::default()).unwrap();
//!
//! let mut controller = Controller::new(ControllerConfig::saturated_filtered()).unwrap();
//! let velocity = controller.update(&cmd, robot.pose);
//! assert!(velocity.position.x > 0.0);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use robofleet_types::{Command, FleetError, Pose, Position};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// What a stop command clears besides producing a zero output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReset {
    /// Integral accumulator and last error.
    Feedback,
    /// Integral accumulator, last error and the output smoothing history.
    FeedbackAndHistory,
}

/// Tuning surface of a [`Controller`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub ktheta: f64,
    /// Per-axis bound of the integral accumulator.
    pub max_integral: f64,
    /// Per-axis bound of the body-frame output.  `None` disables saturation.
    pub saturation: Option<f64>,
    /// Number of samples averaged by the output filter (including the new
    /// one).  `None` disables smoothing.
    pub filter_window: Option<usize>,
    pub stop_reset: StopReset,
}

impl ControllerConfig {
    /// Saturated and filtered policy: bounded body-frame output averaged over
    /// the last three samples; a stop clears every piece of state.
    pub fn saturated_filtered() -> Self {
        Self {
            kp: 0.049677,
            ki: 0.068426,
            kd: 0.0,
            ktheta: 0.9,
            max_integral: 5.0,
            saturation: Some(std::f64::consts::FRAC_1_SQRT_2),
            filter_window: Some(3),
            stop_reset: StopReset::FeedbackAndHistory,
        }
    }

    /// Raw policy: unsaturated, unfiltered output with softer gains; a stop
    /// only clears the feedback terms.
    pub fn raw() -> Self {
        Self {
            kp: 0.025,
            ki: 0.01,
            kd: 0.0,
            ktheta: 0.6,
            max_integral: 5.0,
            saturation: None,
            filter_window: None,
            stop_reset: StopReset::Feedback,
        }
    }

    /// Check that every gain is finite and every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] describing the first offending
    /// field.
    pub fn validate(&self) -> Result<(), FleetError> {
        let gains = [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("ktheta", self.ktheta),
        ];
        for (name, value) in gains {
            if !value.is_finite() {
                return Err(FleetError::Configuration(format!(
                    "controller gain {name} must be finite, got {value}"
                )));
            }
        }
        if !(self.max_integral.is_finite() && self.max_integral >= 0.0) {
            return Err(FleetError::Configuration(format!(
                "max_integral must be a non-negative number, got {}",
                self.max_integral
            )));
        }
        if let Some(bound) = self.saturation
            && !(bound.is_finite() && bound > 0.0)
        {
            return Err(FleetError::Configuration(format!(
                "saturation bound must be positive, got {bound}"
            )));
        }
        if self.filter_window == Some(0) {
            return Err(FleetError::Configuration(
                "filter window must hold at least one sample".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::saturated_filtered()
    }
}

/// Name of one of the built-in controller configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPolicy {
    #[default]
    SaturatedFiltered,
    Raw,
}

impl ControllerPolicy {
    pub fn config(self) -> ControllerConfig {
        match self {
            ControllerPolicy::SaturatedFiltered => ControllerConfig::saturated_filtered(),
            ControllerPolicy::Raw => ControllerConfig::raw(),
        }
    }
}

impl fmt::Display for ControllerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerPolicy::SaturatedFiltered => write!(f, "saturated_filtered"),
            ControllerPolicy::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for ControllerPolicy {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "saturated_filtered" | "saturated+filtered" => Ok(ControllerPolicy::SaturatedFiltered),
            "raw" => Ok(ControllerPolicy::Raw),
            other => Err(FleetError::Configuration(format!(
                "unknown controller policy '{other}'"
            ))),
        }
    }
}

/// Stateful position controller for a single robot slot.
#[derive(Debug, Clone)]
pub struct Controller {
    config: ControllerConfig,
    accumulator: Position,
    last_error: Position,
    /// Most recent filtered outputs, newest at the back.  Holds at most
    /// `filter_window − 1` samples.
    history: VecDeque<Position>,
}

impl Controller {
    /// Build a controller with zeroed state.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if `config` fails
    /// [`ControllerConfig::validate`].
    pub fn new(config: ControllerConfig) -> Result<Self, FleetError> {
        config.validate()?;
        let capacity = config.filter_window.map_or(0, |k| k - 1);
        Ok(Self {
            config,
            accumulator: Position::ORIGIN,
            last_error: Position::ORIGIN,
            history: VecDeque::with_capacity(capacity),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current integral accumulator (field frame).
    pub fn integral(&self) -> Position {
        self.accumulator
    }

    pub fn last_error(&self) -> Position {
        self.last_error
    }

    /// Number of stored smoothing samples.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Compute this cycle's velocity command.
    ///
    /// `current` is the robot's last known pose in the field frame.  The
    /// heading term always steers toward orientation zero; the commanded
    /// orientation is not tracked.
    pub fn update(&mut self, command: &Command, current: Pose) -> Pose {
        if command.is_stop() {
            self.reset_for_stop();
            return Pose::ZERO;
        }

        let error = command.pose().position - current.position;

        let up = Position::new(self.config.kp * error.x, self.config.kp * error.y);

        let limit = self.config.max_integral;
        self.accumulator = Position::new(
            (self.accumulator.x + self.config.ki * error.x).clamp(-limit, limit),
            (self.accumulator.y + self.config.ki * error.y).clamp(-limit, limit),
        );

        let ud = Position::new(
            self.config.kd * (error.x - self.last_error.x),
            self.config.kd * (error.y - self.last_error.y),
        );
        self.last_error = error;

        let field_cmd = up + self.accumulator + ud;
        let mut body_cmd = field_cmd.rotated(-current.orientation);

        if let Some(bound) = self.config.saturation {
            body_cmd = Position::new(body_cmd.x.clamp(-bound, bound), body_cmd.y.clamp(-bound, bound));
        }

        let theta = self.config.ktheta * (0.0 - current.orientation);

        if let Some(window) = self.config.filter_window {
            body_cmd = self.smooth(body_cmd, window);
        }

        trace!(
            slot = %command.slot(),
            ex = error.x,
            ey = error.y,
            ix = self.accumulator.x,
            iy = self.accumulator.y,
            vx = body_cmd.x,
            vy = body_cmd.y,
            theta,
            "controller output"
        );

        Pose::from_parts(body_cmd, theta)
    }

    /// Clear every piece of cross-cycle state.
    pub fn reset(&mut self) {
        self.accumulator = Position::ORIGIN;
        self.last_error = Position::ORIGIN;
        self.history.clear();
    }

    fn reset_for_stop(&mut self) {
        self.accumulator = Position::ORIGIN;
        self.last_error = Position::ORIGIN;
        if self.config.stop_reset == StopReset::FeedbackAndHistory {
            self.history.clear();
        }
    }

    // Missing samples count as zero, so the output ramps up over the first
    // `window` cycles.
    fn smooth(&mut self, sample: Position, window: usize) -> Position {
        let sum = self
            .history
            .iter()
            .fold(sample, |acc, &previous| acc + previous);
        let k = window as f64;
        let filtered = Position::new(sum.x / k, sum.y / k);

        if window > 1 {
            if self.history.len() == window - 1 {
                self.history.pop_front();
            }
            self.history.push_back(filtered);
        }
        filtered
    }
}
