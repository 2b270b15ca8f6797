//! Planar geometry in the field frame.
//!
//! Positions are expressed in field-plane units (millimetres for the default
//! rectangle) and orientations in radians, counter-clockwise from the +x axis.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::error::FleetError;

/// A 2D coordinate on the field plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// `true` when both coordinates are finite (neither NaN nor infinite).
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Rotate this vector by `angle` radians about the origin.
    pub fn rotated(&self, angle: f64) -> Position {
        let (sin, cos) = angle.sin_cos();
        Position {
            x: self.x * cos - self.y * sin,
            y: self.y * cos + self.x * sin,
        }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Position plus orientation.
///
/// The same type doubles as a velocity command once a controller has run:
/// `position` then holds the body-frame linear velocity and `orientation` the
/// angular rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: f64,
}

impl Pose {
    pub const ZERO: Pose = Pose {
        position: Position::ORIGIN,
        orientation: 0.0,
    };

    pub const fn new(x: f64, y: f64, orientation: f64) -> Self {
        Self {
            position: Position::new(x, y),
            orientation,
        }
    }

    pub const fn from_parts(position: Position, orientation: f64) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

/// Axis-aligned playing-field rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub x_left: f64,
    pub x_right: f64,
    pub y_bottom: f64,
    pub y_top: f64,
}

impl Default for FieldBounds {
    /// Division-B field: 9 m × 6 m centred on the origin, in millimetres.
    fn default() -> Self {
        Self {
            x_left: -4500.0,
            x_right: 4500.0,
            y_bottom: -3000.0,
            y_top: 3000.0,
        }
    }
}

impl FieldBounds {
    /// Build a rectangle, rejecting empty or non-finite extents.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] when an edge is not finite or
    /// when `x_left >= x_right` / `y_bottom >= y_top`.
    pub fn new(x_left: f64, x_right: f64, y_bottom: f64, y_top: f64) -> Result<Self, FleetError> {
        let all_finite = [x_left, x_right, y_bottom, y_top]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(FleetError::non_finite("field bounds"));
        }
        if x_left >= x_right || y_bottom >= y_top {
            return Err(FleetError::Configuration(format!(
                "empty field rectangle x=[{x_left}, {x_right}] y=[{y_bottom}, {y_top}]"
            )));
        }
        Ok(Self {
            x_left,
            x_right,
            y_bottom,
            y_top,
        })
    }

    /// Clamp `position` into the rectangle, each axis independently.
    pub fn clamp(&self, position: Position) -> Position {
        Position {
            x: position.x.clamp(self.x_left, self.x_right),
            y: position.y.clamp(self.y_bottom, self.y_top),
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        (self.x_left..=self.x_right).contains(&position.x)
            && (self.y_bottom..=self.y_top).contains(&position.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn clamp_leaves_inside_positions_untouched() {
        let field = FieldBounds::default();
        let p = Position::new(120.0, -2999.0);
        assert_eq!(field.clamp(p), p);
        assert!(field.contains(p));
    }

    #[test]
    fn clamp_is_axis_independent() {
        let field = FieldBounds::default();
        // Only x is outside.
        let p = field.clamp(Position::new(9000.0, 10.0));
        assert_eq!(p, Position::new(4500.0, 10.0));
        // Only y is outside.
        let p = field.clamp(Position::new(-10.0, -7000.0));
        assert_eq!(p, Position::new(-10.0, -3000.0));
        // Both outside.
        let p = field.clamp(Position::new(-5000.0, 3001.0));
        assert_eq!(p, Position::new(-4500.0, 3000.0));
    }

    #[test]
    fn new_rejects_empty_rectangle() {
        assert!(FieldBounds::new(1.0, -1.0, -1.0, 1.0).is_err());
        assert!(FieldBounds::new(-1.0, 1.0, 2.0, 2.0).is_err());
        assert!(FieldBounds::new(f64::NAN, 1.0, -1.0, 1.0).is_err());
        assert!(FieldBounds::new(-1.0, 1.0, -1.0, 1.0).is_ok());
    }

    #[test]
    fn rotation_by_quarter_turn() {
        let v = Position::new(1.0, 0.0).rotated(std::f64::consts::FRAC_PI_2);
        assert!(v.x.abs() < EPS);
        assert!((v.y - 1.0).abs() < EPS);
    }

    #[test]
    fn pose_zero_is_origin() {
        assert_eq!(Pose::ZERO, Pose::default());
        assert!(!Pose::new(0.0, f64::INFINITY, 0.0).is_finite());
    }
}
