// Nonlinear program solver adapter.
//
// The horizon problem has a quadratic cost and nonlinear dynamics equalities,
// so it is driven to a local optimum by sequential quadratic programming:
// linearize the dynamics at the iterate, hand the resulting convex subproblem
// to the Clarabel interior-point solver (zero cone for the equalities,
// nonnegative cone for the bounds), apply the full step, repeat. The starting
// iterate is a dynamics-consistent rollout under neutral actuation, never the
// previous cycle's solution, so every cycle re-solves the horizon from fresh
// telemetry.

use clarabel::algebra::CscMatrix;
use clarabel::solver::SupportedConeT::{NonnegativeConeT, ZeroConeT};
use clarabel::solver::{DefaultSettings, DefaultSolver, IPSolver, SolverStatus};
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::time::{Duration, Instant};

use super::config::MpcConfig;
use super::problem::{Problem, STATE_DIM};
use crate::common::{MpcError, MpcResult};
use crate::model::BicycleModel;

// Outer-loop convergence tolerances on the step norm and the worst
// constraint violation
const STEP_TOL: f64 = 1e-5;
const FEAS_TOL: f64 = 1e-6;

/// Drives the horizon program to a locally optimal, feasible point.
///
/// This is the only module that talks to the underlying optimizer; swapping
/// the numerical backend stays contained here.
pub struct SqpSolver<'a> {
    config: &'a MpcConfig,
    model: BicycleModel,
}

impl<'a> SqpSolver<'a> {
    pub fn new(config: &'a MpcConfig, model: BicycleModel) -> Self {
        Self { config, model }
    }

    /// Solve for the full decision vector given the initial state and the
    /// reference coefficients.
    pub fn solve(&self, x0: &[f64; 6], coeffs: &[f64]) -> MpcResult<DVector<f64>> {
        let problem = Problem::new(self.config);
        let deadline = Instant::now() + Duration::from_secs_f64(self.config.solve_budget);
        let mut z = self.initial_rollout(x0, coeffs, &problem);

        for iter in 0..self.config.max_sqp_iters {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MpcError::NonConvergence(format!(
                    "time budget exhausted after {} iterations",
                    iter
                )));
            }

            let grad = problem.gradient(&z);
            let (a_eq, b_eq) = problem.equality_rows(&self.model, x0, coeffs, &z);
            let (a_in, b_in) = problem.inequality_rows(&z);

            let num_eq = a_eq.nrows();
            let num_ineq = a_in.nrows();
            let mut a = DMatrix::zeros(num_eq + num_ineq, problem.layout.num_vars());
            a.rows_mut(0, num_eq).copy_from(&a_eq);
            a.rows_mut(num_eq, num_ineq).copy_from(&a_in);
            let mut b = DVector::zeros(num_eq + num_ineq);
            b.rows_mut(0, num_eq).copy_from(&b_eq);
            b.rows_mut(num_eq, num_ineq).copy_from(&b_in);

            let p_csc = dense_to_csc_upper(problem.hessian());
            let a_csc = dense_to_csc(&a);
            let cones = [ZeroConeT(num_eq), NonnegativeConeT(num_ineq)];

            let mut settings = DefaultSettings::default();
            settings.verbose = false;
            settings.max_iter = self.config.qp_max_iter;
            settings.time_limit = remaining.as_secs_f64();

            let mut qp = DefaultSolver::new(
                &p_csc,
                grad.as_slice(),
                &a_csc,
                b.as_slice(),
                &cones,
                settings,
            );
            qp.solve();

            match qp.solution.status {
                SolverStatus::Solved | SolverStatus::AlmostSolved => {}
                status => {
                    return Err(MpcError::NonConvergence(format!(
                        "subproblem ended with status {:?} at iteration {}",
                        status, iter
                    )));
                }
            }

            let dz = DVector::from_column_slice(&qp.solution.x);
            z += &dz;

            let step_norm = dz.norm();
            let feasibility = self.feasibility(&problem, x0, coeffs, &z);
            debug!(
                "sqp iteration {}: step {:.3e}, feasibility {:.3e}, cost {:.4}",
                iter,
                step_norm,
                feasibility,
                problem.objective(&z)
            );

            if step_norm < STEP_TOL && feasibility < FEAS_TOL {
                return Ok(z);
            }
        }

        Err(MpcError::NonConvergence(format!(
            "no feasible optimum within {} iterations",
            self.config.max_sqp_iters
        )))
    }

    // Dynamics-consistent starting trajectory under neutral actuation
    fn initial_rollout(&self, x0: &[f64; 6], coeffs: &[f64], problem: &Problem) -> DVector<f64> {
        let layout = &problem.layout;
        let mut z = DVector::zeros(layout.num_vars());
        let mut s = *x0;
        for i in 0..STATE_DIM {
            z[layout.state(0, i)] = s[i];
        }
        for t in 1..layout.horizon {
            s = self.model.step_f64(&s, &[0.0, 0.0], coeffs, self.config.dt);
            for i in 0..STATE_DIM {
                z[layout.state(t, i)] = s[i];
            }
        }
        z
    }

    // Worst violation over the initial-state pin and the dynamics rows
    fn feasibility(
        &self,
        problem: &Problem,
        x0: &[f64; 6],
        coeffs: &[f64],
        z: &DVector<f64>,
    ) -> f64 {
        let mut worst = problem.dynamics_residual(&self.model, coeffs, z);
        for i in 0..STATE_DIM {
            worst = worst.max((z[problem.layout.state(0, i)] - x0[i]).abs());
        }
        worst
    }
}

fn dense_to_csc(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for j in 0..ncols {
        for i in 0..nrows {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

// Clarabel consumes the upper triangle of the symmetric cost matrix
fn dense_to_csc_upper(m: &DMatrix<f64>) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for j in 0..ncols {
        for i in 0..=j {
            let v = m[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
