//! Common types used throughout mpc_tracking

use nalgebra::{Vector2, Vector6};

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

/// Vehicle state in the frame the reference polynomial is expressed in.
///
/// `cte` is the cross-track error (reference minus vehicle, `f(x) - y`) and
/// `epsi` the heading error relative to the reference tangent. Both are
/// supplied by the caller together with the pose so that the controller never
/// has to touch frame conversions itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub x: f64,
    pub y: f64,
    pub psi: f64,
    pub v: f64,
    pub cte: f64,
    pub epsi: f64,
}

impl VehicleState {
    pub fn new(x: f64, y: f64, psi: f64, v: f64, cte: f64, epsi: f64) -> Self {
        Self { x, y, psi, v, cte, epsi }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, psi: 0.0, v: 0.0, cte: 0.0, epsi: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_array(&self) -> [f64; 6] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    pub fn from_array(a: &[f64; 6]) -> Self {
        Self { x: a[0], y: a[1], psi: a[2], v: a[3], cte: a[4], epsi: a[5] }
    }

    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(self.x, self.y, self.psi, self.v, self.cte, self.epsi)
    }

    /// All components finite (rejects NaN and infinities)
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

impl From<Vector6<f64>> for VehicleState {
    fn from(v: Vector6<f64>) -> Self {
        Self { x: v[0], y: v[1], psi: v[2], v: v[3], cte: v[4], epsi: v[5] }
    }
}

/// Actuator command pair: steering angle [rad] and acceleration [m/s^2],
/// negative acceleration meaning braking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuation {
    pub steer: f64,
    pub accel: f64,
}

impl Actuation {
    pub fn new(steer: f64, accel: f64) -> Self {
        Self { steer, accel }
    }

    /// Neutral command: wheels straight, no throttle or brake
    pub fn zero() -> Self {
        Self { steer: 0.0, accel: 0.0 }
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.steer, self.accel]
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.steer, self.accel)
    }
}

impl From<Vector2<f64>> for Actuation {
    fn from(v: Vector2<f64>) -> Self {
        Self { steer: v[0], accel: v[1] }
    }
}
