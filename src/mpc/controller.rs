// Horizon controller: the public solve entry point.
//
// Receding-horizon contract: the full horizon is optimized every cycle, only
// the first actuation is returned, everything else is discarded. When the
// optimizer fails to converge the controller holds the last successfully
// computed command (neutral on a cold start) instead of passing along a
// partially computed one; the degradation is visible to the caller through
// the `fallback` flag and a warning on the log.

use log::{debug, warn};

use super::config::MpcConfig;
use super::problem::Layout;
use super::solver::SqpSolver;
use crate::common::{Actuation, MpcError, MpcResult, Point2D, VehicleState};
use crate::model::{normalize_angle, BicycleModel};

/// Result of one horizon solve
#[derive(Debug, Clone)]
pub struct MpcSolution {
    /// First actuation of the optimized sequence, within actuator bounds
    pub actuation: Actuation,
    /// Predicted (x, y) per horizon step, starting at the solve's initial
    /// state; point 1 is exactly one model step under `actuation`
    pub trajectory: Vec<Point2D>,
    /// True when the optimizer failed and the held command was returned
    pub fallback: bool,
}

/// Long-lived receding-horizon tracking controller.
///
/// Holds only configuration and the last successfully computed actuation
/// (needed for latency projection and the fallback policy); all trajectory
/// and decision-vector data lives within a single [`MpcController::solve`]
/// call. Concurrent use requires independent instances.
pub struct MpcController {
    config: MpcConfig,
    model: BicycleModel,
    last_actuation: Actuation,
}

impl MpcController {
    pub fn new(config: MpcConfig) -> MpcResult<Self> {
        config.validate()?;
        let model = BicycleModel::new(config.lf);
        Ok(Self {
            config,
            model,
            last_actuation: Actuation::zero(),
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    /// Command returned by the most recent successful solve
    pub fn last_actuation(&self) -> Actuation {
        self.last_actuation
    }

    /// Optimize the horizon for the given state and reference polynomial and
    /// return the first actuation plus the predicted trajectory.
    ///
    /// `coeffs` are ordered low to high and expressed in the same frame as
    /// the state. Fails fast with [`MpcError::InvalidInput`] on malformed
    /// input; optimizer failures are absorbed into the fallback policy
    /// described above and never surface as an error.
    pub fn solve(&mut self, state: &VehicleState, coeffs: &[f64]) -> MpcResult<MpcSolution> {
        if !state.is_finite() {
            return Err(MpcError::InvalidInput(
                "state contains a non-finite component".to_string(),
            ));
        }
        if coeffs.is_empty() {
            return Err(MpcError::InvalidInput(
                "reference coefficients are empty".to_string(),
            ));
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(MpcError::InvalidInput(
                "reference coefficients contain a non-finite value".to_string(),
            ));
        }

        let x0 = self.initial_state(state, coeffs);
        let solver = SqpSolver::new(&self.config, self.model);

        match solver.solve(&x0, coeffs) {
            Ok(z) => {
                let layout = Layout::new(self.config.horizon);
                // the subproblem keeps the sequence hard-feasible; the clamp
                // only shaves interior-point epsilon off the bounds
                let actuations: Vec<[f64; 2]> = (0..self.config.horizon - 1)
                    .map(|t| {
                        let raw_steer = z[layout.input(t, 0)];
                        let raw_accel = z[layout.input(t, 1)];
                        let clipped = [
                            raw_steer.clamp(-self.config.max_steer, self.config.max_steer),
                            raw_accel.clamp(self.config.accel_min, self.config.accel_max),
                        ];
                        if (raw_steer - clipped[0]).abs() > 1e-6
                            || (raw_accel - clipped[1]).abs() > 1e-6
                        {
                            debug!(
                                "actuation {} clipped to bounds: ({:.4}, {:.4}) -> ({:.4}, {:.4})",
                                t, raw_steer, raw_accel, clipped[0], clipped[1]
                            );
                        }
                        clipped
                    })
                    .collect();
                let actuation = Actuation::new(actuations[0][0], actuations[0][1]);
                let trajectory = self.rollout(&x0, coeffs, &actuations);

                self.last_actuation = actuation;
                Ok(MpcSolution {
                    actuation,
                    trajectory,
                    fallback: false,
                })
            }
            Err(MpcError::NonConvergence(msg)) => {
                warn!("horizon solve failed ({}); holding previous actuation", msg);
                let held = self.last_actuation;
                let actuations = vec![held.to_array(); self.config.horizon - 1];
                let trajectory = self.rollout(&x0, coeffs, &actuations);
                Ok(MpcSolution {
                    actuation: held,
                    trajectory,
                    fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// The state the vehicle will be in when the new command takes effect:
    /// heading normalized, then pushed forward by the configured latency
    /// under the previous command.
    fn initial_state(&self, state: &VehicleState, coeffs: &[f64]) -> [f64; 6] {
        let mut s = state.to_array();
        s[2] = normalize_angle(s[2]);
        s[5] = normalize_angle(s[5]);
        if self.config.latency > 0.0 {
            s = self
                .model
                .step_f64(&s, &self.last_actuation.to_array(), coeffs, self.config.latency);
        }
        s
    }

    // Predicted positions from rolling the model under an actuation sequence
    fn rollout(&self, x0: &[f64; 6], coeffs: &[f64], actuations: &[[f64; 2]]) -> Vec<Point2D> {
        let mut trajectory = Vec::with_capacity(actuations.len() + 1);
        let mut s = *x0;
        trajectory.push(Point2D::new(s[0], s[1]));
        for u in actuations {
            s = self.model.step_f64(&s, u, coeffs, self.config.dt);
            trajectory.push(Point2D::new(s[0], s[1]));
        }
        trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // unoptimized test builds are slow, give the solver room
    fn test_config() -> MpcConfig {
        let mut config = MpcConfig::default();
        config.solve_budget = 5.0;
        config
    }

    fn controller() -> MpcController {
        MpcController::new(test_config()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = test_config();
        config.horizon = 0;
        assert!(matches!(
            MpcController::new(config),
            Err(MpcError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_state() {
        let mut ctrl = controller();
        let mut state = VehicleState::origin();
        state.v = f64::NAN;
        assert!(matches!(
            ctrl.solve(&state, &[0.0, 0.0]),
            Err(MpcError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_empty_coefficients() {
        let mut ctrl = controller();
        let state = VehicleState::origin();
        assert!(matches!(
            ctrl.solve(&state, &[]),
            Err(MpcError::InvalidInput(_))
        ));
        assert!(matches!(
            ctrl.solve(&state, &[0.0, f64::INFINITY]),
            Err(MpcError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_on_target_needs_no_correction() {
        // already on the reference at cruise speed: no spurious actuation
        let mut ctrl = controller();
        let v = ctrl.config().target_speed;
        let state = VehicleState::new(0.0, 0.0, 0.0, v, 0.0, 0.0);
        let solution = ctrl.solve(&state, &[0.0, 0.0]).unwrap();
        assert!(!solution.fallback);
        assert!(solution.actuation.steer.abs() < 1e-6);
        assert!(solution.actuation.accel.abs() < 1e-6);
    }

    #[test]
    fn test_accelerates_toward_cruise_speed() {
        let mut ctrl = controller();
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0);
        let solution = ctrl.solve(&state, &[0.0, 0.0]).unwrap();
        assert!(!solution.fallback);
        assert!(solution.actuation.steer.abs() < 1e-4);
        assert!(solution.actuation.accel > 0.1);
    }

    #[test]
    fn test_steers_toward_offset_reference() {
        // reference path one unit to the left (cte = f(0) - y = 1): under the
        // model's sign convention the correction steers positive, toward it
        let mut ctrl = controller();
        let v = ctrl.config().target_speed;
        let state = VehicleState::new(0.0, 0.0, 0.0, v, 1.0, 0.0);
        let solution = ctrl.solve(&state, &[1.0, 0.0]).unwrap();
        assert!(!solution.fallback);
        assert!(solution.actuation.steer > 0.0);
        assert!(solution.actuation.steer <= ctrl.config().max_steer + 1e-9);
    }

    #[test]
    fn test_trajectory_starts_at_state_and_follows_model() {
        let mut ctrl = controller();
        let state = VehicleState::new(0.0, 0.0, 0.0, 12.0, 0.4, -0.02);
        let coeffs = [0.4, 0.01];
        let solution = ctrl.solve(&state, &coeffs).unwrap();
        assert_eq!(solution.trajectory.len(), ctrl.config().horizon);
        assert!((solution.trajectory[0].x - state.x).abs() < 1e-12);
        assert!((solution.trajectory[0].y - state.y).abs() < 1e-12);

        // point 1 is exactly one model step under the returned actuation
        let model = BicycleModel::new(ctrl.config().lf);
        let next = model.step_f64(
            &state.to_array(),
            &solution.actuation.to_array(),
            &coeffs,
            ctrl.config().dt,
        );
        assert_eq!(solution.trajectory[1].x, next[0]);
        assert_eq!(solution.trajectory[1].y, next[1]);
    }

    #[test]
    fn test_repeated_solves_agree() {
        // no latency: the pipeline is a pure function of its inputs
        let state = VehicleState::new(0.0, 0.0, 0.05, 12.0, 0.6, -0.03);
        let coeffs = [0.6, 0.02, 0.001];
        let mut ctrl = controller();
        let first = ctrl.solve(&state, &coeffs).unwrap();
        let second = ctrl.solve(&state, &coeffs).unwrap();
        assert!((first.actuation.steer - second.actuation.steer).abs() < 1e-8);
        assert!((first.actuation.accel - second.actuation.accel).abs() < 1e-8);
    }

    #[test]
    fn test_sharp_curve_never_exceeds_bounds() {
        // curvature beyond what the steering range can follow at speed
        let mut ctrl = controller();
        let state = VehicleState::new(0.0, 0.0, 0.0, 20.0, 0.0, 0.0);
        let solution = ctrl.solve(&state, &[0.0, 0.0, 0.3]).unwrap();
        let config = ctrl.config();
        assert!(solution.actuation.steer.abs() <= config.max_steer + 1e-9);
        assert!(solution.actuation.accel >= config.accel_min - 1e-9);
        assert!(solution.actuation.accel <= config.accel_max + 1e-9);
    }

    #[test]
    fn test_actuation_bounds_hold_for_random_states() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut ctrl = controller();
        for _ in 0..10 {
            let state = VehicleState::new(
                0.0,
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-0.4..0.4),
                rng.gen_range(0.0..20.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(-0.4..0.4),
            );
            let coeffs = [rng.gen_range(-1.0..1.0), rng.gen_range(-0.2..0.2)];
            let solution = ctrl.solve(&state, &coeffs).unwrap();
            let config = ctrl.config();
            assert!(solution.actuation.steer.abs() <= config.max_steer + 1e-9);
            assert!(solution.actuation.accel >= config.accel_min - 1e-9);
            assert!(solution.actuation.accel <= config.accel_max + 1e-9);
        }
    }

    #[test]
    fn test_latency_projection_matches_hand_computed_step() {
        let mut config = test_config();
        config.latency = 0.1;
        let mut ctrl = MpcController::new(config).unwrap();
        ctrl.last_actuation = Actuation::new(0.05, 0.5);

        let state = VehicleState::new(1.0, 2.0, 0.1, 10.0, 0.3, 0.02);
        let coeffs = [0.3, 0.0];
        let projected = ctrl.initial_state(&state, &coeffs);

        let model = BicycleModel::new(ctrl.config().lf);
        let expected = model.step_f64(&state.to_array(), &[0.05, 0.5], &coeffs, 0.1);
        for i in 0..6 {
            assert!((projected[i] - expected[i]).abs() < 1e-12);
        }

        // more assumed latency moves the projected state further along the
        // current heading
        let mut far_config = test_config();
        far_config.latency = 0.3;
        let mut far_ctrl = MpcController::new(far_config).unwrap();
        far_ctrl.last_actuation = Actuation::new(0.05, 0.5);
        let far = far_ctrl.initial_state(&state, &coeffs);
        assert!(far[0] > projected[0]);
    }

    #[test]
    fn test_fallback_holds_last_actuation() {
        let mut config = test_config();
        config.solve_budget = 1e-9;
        let mut ctrl = MpcController::new(config).unwrap();
        ctrl.last_actuation = Actuation::new(0.1, 0.4);

        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.5, 0.0);
        let solution = ctrl.solve(&state, &[0.5, 0.0]).unwrap();
        assert!(solution.fallback);
        assert_eq!(solution.actuation, Actuation::new(0.1, 0.4));
        assert_eq!(solution.trajectory.len(), ctrl.config().horizon);
    }

    #[test]
    fn test_cold_start_fallback_is_neutral() {
        let mut config = test_config();
        config.solve_budget = 1e-9;
        let mut ctrl = MpcController::new(config).unwrap();
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.5, 0.0);
        let solution = ctrl.solve(&state, &[0.5, 0.0]).unwrap();
        assert!(solution.fallback);
        assert_eq!(solution.actuation, Actuation::zero());
    }
}
