// Cost and constraint assembly over the horizon decision vector.
//
// The decision vector stacks the N horizon states ahead of the N-1 actuation
// pairs. The tracking cost is quadratic in it, so the Hessian is constant for
// a given configuration; only the gradient and the linearized dynamics rows
// change between outer iterations. Constraint rows are expressed relative to
// the current iterate: equality rows (initial-state pin and dynamics) carry
// the model residual on the right-hand side, inequality rows carry the
// remaining slack to the actuator limits, which keeps every accepted step
// inside the hard bounds.

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};

use super::config::MpcConfig;
use crate::model::BicycleModel;

pub const STATE_DIM: usize = 6;
pub const INPUT_DIM: usize = 2;

// Safety-net box bound on state variables; wide enough to never bind on a
// sane horizon while keeping the subproblem bounded
const STATE_BOUND: f64 = 1.0e6;

/// Index layout of the decision vector across the horizon
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub horizon: usize,
}

impl Layout {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn num_state_vars(&self) -> usize {
        STATE_DIM * self.horizon
    }

    pub fn num_input_vars(&self) -> usize {
        INPUT_DIM * (self.horizon - 1)
    }

    pub fn num_vars(&self) -> usize {
        self.num_state_vars() + self.num_input_vars()
    }

    /// Index of state component `j` at horizon step `t`
    pub fn state(&self, t: usize, j: usize) -> usize {
        debug_assert!(t < self.horizon && j < STATE_DIM);
        t * STATE_DIM + j
    }

    /// Index of actuation component `j` at horizon step `t`
    pub fn input(&self, t: usize, j: usize) -> usize {
        debug_assert!(t < self.horizon - 1 && j < INPUT_DIM);
        self.num_state_vars() + t * INPUT_DIM + j
    }

    /// Initial-state pin plus one dynamics block per transition
    pub fn num_eq(&self) -> usize {
        STATE_DIM * self.horizon
    }

    /// Upper and lower bound rows for every decision variable
    pub fn num_ineq(&self) -> usize {
        2 * self.num_vars()
    }
}

/// One solve's worth of problem data
pub struct Problem<'a> {
    config: &'a MpcConfig,
    pub layout: Layout,
    hessian: DMatrix<f64>,
    lin_cost: DVector<f64>,
}

impl<'a> Problem<'a> {
    pub fn new(config: &'a MpcConfig) -> Self {
        let layout = Layout::new(config.horizon);
        let (hessian, lin_cost) = Self::build_cost(config, &layout);
        Self { config, layout, hessian, lin_cost }
    }

    /// Constant cost Hessian (upper triangle is what the solver consumes)
    pub fn hessian(&self) -> &DMatrix<f64> {
        &self.hessian
    }

    /// Cost gradient at the iterate
    pub fn gradient(&self, z: &DVector<f64>) -> DVector<f64> {
        &self.hessian * z + &self.lin_cost
    }

    /// Cost value at the iterate, evaluated term by term
    pub fn objective(&self, z: &DVector<f64>) -> f64 {
        let n = self.layout.horizon;
        let w = &self.config.weights;
        let mut cost = 0.0;
        for t in 0..n {
            let cte = z[self.layout.state(t, 4)];
            let epsi = z[self.layout.state(t, 5)];
            let dv = z[self.layout.state(t, 3)] - self.config.target_speed;
            cost += w.cte * cte * cte + w.epsi * epsi * epsi + w.speed * dv * dv;
        }
        for t in 0..n - 1 {
            let steer = z[self.layout.input(t, 0)];
            let accel = z[self.layout.input(t, 1)];
            cost += w.steer * steer * steer + w.accel * accel * accel;
        }
        for (t0, t1) in (0..n - 1).tuple_windows::<(usize, usize)>() {
            let dsteer = z[self.layout.input(t1, 0)] - z[self.layout.input(t0, 0)];
            let daccel = z[self.layout.input(t1, 1)] - z[self.layout.input(t0, 1)];
            cost += w.steer_rate * dsteer * dsteer + w.accel_rate * daccel * daccel;
        }
        cost
    }

    fn build_cost(config: &MpcConfig, layout: &Layout) -> (DMatrix<f64>, DVector<f64>) {
        let n = layout.horizon;
        let w = &config.weights;
        let mut hessian = DMatrix::zeros(layout.num_vars(), layout.num_vars());
        let mut lin_cost = DVector::zeros(layout.num_vars());

        for t in 0..n {
            let iv = layout.state(t, 3);
            let icte = layout.state(t, 4);
            let iepsi = layout.state(t, 5);
            hessian[(iv, iv)] += 2.0 * w.speed;
            hessian[(icte, icte)] += 2.0 * w.cte;
            hessian[(iepsi, iepsi)] += 2.0 * w.epsi;
            lin_cost[iv] = -2.0 * w.speed * config.target_speed;
        }

        for t in 0..n - 1 {
            let isteer = layout.input(t, 0);
            let iaccel = layout.input(t, 1);
            hessian[(isteer, isteer)] += 2.0 * w.steer;
            hessian[(iaccel, iaccel)] += 2.0 * w.accel;
        }

        // (u_{t+1} - u_t)^2 couples consecutive actuations
        for (t0, t1) in (0..n - 1).tuple_windows::<(usize, usize)>() {
            for &(j, w_rate) in [(0, w.steer_rate), (1, w.accel_rate)].iter() {
                let i0 = layout.input(t0, j);
                let i1 = layout.input(t1, j);
                hessian[(i0, i0)] += 2.0 * w_rate;
                hessian[(i1, i1)] += 2.0 * w_rate;
                hessian[(i0, i1)] -= 2.0 * w_rate;
                hessian[(i1, i0)] -= 2.0 * w_rate;
            }
        }

        (hessian, lin_cost)
    }

    /// Equality rows: pin state 0 to the measured (projected) state and tie
    /// every following state to the linearized model prediction. Right-hand
    /// sides are the residuals at the iterate, so a converged iterate
    /// produces an all-zero vector.
    pub fn equality_rows(
        &self,
        model: &BicycleModel,
        x0: &[f64; 6],
        coeffs: &[f64],
        z: &DVector<f64>,
    ) -> (DMatrix<f64>, DVector<f64>) {
        let layout = &self.layout;
        let n = layout.horizon;
        let mut a = DMatrix::zeros(layout.num_eq(), layout.num_vars());
        let mut b = DVector::zeros(layout.num_eq());

        for i in 0..STATE_DIM {
            a[(i, layout.state(0, i))] = 1.0;
            b[i] = x0[i] - z[layout.state(0, i)];
        }

        for t in 0..n - 1 {
            let xt = self.state_at(z, t);
            let ut = self.input_at(z, t);
            let (ja, jb) = model.linearize(&xt, &ut, coeffs, self.config.dt);
            let pred = model.step_f64(&xt, &ut, coeffs, self.config.dt);
            let row0 = STATE_DIM * (t + 1);
            for i in 0..STATE_DIM {
                a[(row0 + i, layout.state(t + 1, i))] = 1.0;
                for j in 0..STATE_DIM {
                    a[(row0 + i, layout.state(t, j))] = -ja[(i, j)];
                }
                for j in 0..INPUT_DIM {
                    a[(row0 + i, layout.input(t, j))] = -jb[(i, j)];
                }
                b[row0 + i] = pred[i] - z[layout.state(t + 1, i)];
            }
        }

        (a, b)
    }

    /// Inequality rows in `A dz <= b` form: actuator box bounds relative to
    /// the iterate, plus wide safety-net bounds on the state variables.
    pub fn inequality_rows(&self, z: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
        let layout = &self.layout;
        let n = layout.horizon;
        let mut a = DMatrix::zeros(layout.num_ineq(), layout.num_vars());
        let mut b = DVector::zeros(layout.num_ineq());
        let mut row = 0;

        let input_bounds = [
            (-self.config.max_steer, self.config.max_steer),
            (self.config.accel_min, self.config.accel_max),
        ];
        for t in 0..n - 1 {
            for j in 0..INPUT_DIM {
                let idx = layout.input(t, j);
                let (lo, hi) = input_bounds[j];
                a[(row, idx)] = 1.0;
                b[row] = hi - z[idx];
                row += 1;
                a[(row, idx)] = -1.0;
                b[row] = z[idx] - lo;
                row += 1;
            }
        }

        for idx in 0..layout.num_state_vars() {
            a[(row, idx)] = 1.0;
            b[row] = STATE_BOUND - z[idx];
            row += 1;
            a[(row, idx)] = -1.0;
            b[row] = z[idx] + STATE_BOUND;
            row += 1;
        }
        debug_assert_eq!(row, layout.num_ineq());

        (a, b)
    }

    /// Worst dynamics violation across the horizon at the iterate
    pub fn dynamics_residual(
        &self,
        model: &BicycleModel,
        coeffs: &[f64],
        z: &DVector<f64>,
    ) -> f64 {
        let layout = &self.layout;
        let mut worst = 0.0_f64;
        for t in 0..layout.horizon - 1 {
            let xt = self.state_at(z, t);
            let ut = self.input_at(z, t);
            let pred = model.step_f64(&xt, &ut, coeffs, self.config.dt);
            for i in 0..STATE_DIM {
                worst = worst.max((z[layout.state(t + 1, i)] - pred[i]).abs());
            }
        }
        worst
    }

    pub fn state_at(&self, z: &DVector<f64>, t: usize) -> [f64; 6] {
        let mut s = [0.0; STATE_DIM];
        for i in 0..STATE_DIM {
            s[i] = z[self.layout.state(t, i)];
        }
        s
    }

    pub fn input_at(&self, z: &DVector<f64>, t: usize) -> [f64; 2] {
        [z[self.layout.input(t, 0)], z[self.layout.input(t, 1)]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.horizon = 4;
        config
    }

    #[test]
    fn test_layout_indices() {
        let layout = Layout::new(4);
        assert_eq!(layout.num_vars(), 6 * 4 + 2 * 3);
        assert_eq!(layout.state(0, 0), 0);
        assert_eq!(layout.state(2, 5), 17);
        assert_eq!(layout.input(0, 0), 24);
        assert_eq!(layout.input(2, 1), 29);
        assert_eq!(layout.num_eq(), 24);
        assert_eq!(layout.num_ineq(), 2 * 30);
    }

    #[test]
    fn test_hessian_is_symmetric() {
        let config = small_config();
        let problem = Problem::new(&config);
        let h = problem.hessian();
        for i in 0..h.nrows() {
            for j in 0..h.ncols() {
                assert!((h[(i, j)] - h[(j, i)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_gradient_matches_objective_finite_difference() {
        let config = small_config();
        let problem = Problem::new(&config);
        let nv = problem.layout.num_vars();
        // arbitrary but deterministic iterate
        let z = DVector::from_fn(nv, |i, _| 0.1 * (i as f64) - 0.7);
        let grad = problem.gradient(&z);

        let h = 1e-6;
        for k in 0..nv {
            let mut zp = z.clone();
            let mut zm = z.clone();
            zp[k] += h;
            zm[k] -= h;
            let fd = (problem.objective(&zp) - problem.objective(&zm)) / (2.0 * h);
            assert!(
                (grad[k] - fd).abs() < 1e-4,
                "grad[{}] = {} vs fd {}",
                k,
                grad[k],
                fd
            );
        }
    }

    #[test]
    fn test_equality_residual_zero_on_consistent_rollout() {
        let config = small_config();
        let problem = Problem::new(&config);
        let model = BicycleModel::new(config.lf);
        let coeffs = [0.3, 0.05];
        let x0 = [0.0, 0.0, 0.0, 8.0, 0.3, -0.05];

        // roll the model forward with zero actuation to get a consistent iterate
        let mut z = DVector::zeros(problem.layout.num_vars());
        let mut s = x0;
        for i in 0..STATE_DIM {
            z[problem.layout.state(0, i)] = s[i];
        }
        for t in 1..config.horizon {
            s = model.step_f64(&s, &[0.0, 0.0], &coeffs, config.dt);
            for i in 0..STATE_DIM {
                z[problem.layout.state(t, i)] = s[i];
            }
        }

        let (_, b) = problem.equality_rows(&model, &x0, &coeffs, &z);
        assert!(b.amax() < 1e-12);
        assert!(problem.dynamics_residual(&model, &coeffs, &z) < 1e-12);
    }

    #[test]
    fn test_inequality_bounds_relative_to_iterate() {
        let config = small_config();
        let problem = Problem::new(&config);
        let mut z = DVector::zeros(problem.layout.num_vars());
        let isteer = problem.layout.input(1, 0);
        z[isteer] = 0.1;

        let (a, b) = problem.inequality_rows(&z);
        // locate the upper/lower rows of that steering variable
        let mut found = 0;
        for row in 0..a.nrows() {
            if a[(row, isteer)] == 1.0 {
                assert!((b[row] - (config.max_steer - 0.1)).abs() < 1e-12);
                found += 1;
            } else if a[(row, isteer)] == -1.0 {
                assert!((b[row] - (0.1 + config.max_steer)).abs() < 1e-12);
                found += 1;
            }
        }
        assert_eq!(found, 2);
    }
}
