//! Controller configuration, fixed at construction time

use crate::common::{MpcError, MpcResult};

/// Weights of the horizon cost terms.
///
/// This is the primary tuning surface: the tracking terms (`cte`, `epsi`)
/// against the comfort terms (`steer_rate`, `accel_rate`) decide how
/// aggressively the vehicle hunts the reference.
#[derive(Debug, Clone, Copy)]
pub struct CostWeights {
    /// Cross-track error squared
    pub cte: f64,
    /// Heading error squared
    pub epsi: f64,
    /// Speed error against the cruise target, squared
    pub speed: f64,
    /// Steering effort squared
    pub steer: f64,
    /// Acceleration effort squared
    pub accel: f64,
    /// Steering change between consecutive steps, squared
    pub steer_rate: f64,
    /// Acceleration change between consecutive steps, squared
    pub accel_rate: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steer: 10.0,
            accel: 10.0,
            steer_rate: 600.0,
            accel_rate: 10.0,
        }
    }
}

impl CostWeights {
    fn all(&self) -> [f64; 7] {
        [
            self.cte,
            self.epsi,
            self.speed,
            self.steer,
            self.accel,
            self.steer_rate,
            self.accel_rate,
        ]
    }
}

/// Configuration of the horizon controller.
///
/// Validated once by [`MpcConfig::validate`] when the controller is built so
/// that an inconsistent setup can never surface in the middle of a solve.
#[derive(Debug, Clone)]
pub struct MpcConfig {
    /// Number of horizon steps N (N states, N-1 actuations)
    pub horizon: usize,
    /// Horizon timestep [s]
    pub dt: f64,
    /// Distance from the center of mass to the front axle [m]
    pub lf: f64,
    /// Steering limit [rad], bound is symmetric
    pub max_steer: f64,
    /// Strongest braking command [m/s^2], negative
    pub accel_min: f64,
    /// Strongest throttle command [m/s^2]
    pub accel_max: f64,
    /// Cruise speed the speed cost pulls toward [m/s]
    pub target_speed: f64,
    /// Cost term weights
    pub weights: CostWeights,
    /// Assumed delay between command and actuation [s]; 0 disables the
    /// latency projection
    pub latency: f64,
    /// Wall-clock budget for one solve [s]; must fit the control cycle
    pub solve_budget: f64,
    /// Outer linearize-and-solve iteration cap
    pub max_sqp_iters: usize,
    /// Iteration cap handed to the interior-point solver per subproblem
    pub qp_max_iter: u32,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon: 10,
            dt: 0.1,
            lf: 2.67,
            max_steer: 25.0_f64.to_radians(),
            accel_min: -1.0,
            accel_max: 1.0,
            target_speed: 15.0,
            weights: CostWeights::default(),
            latency: 0.0,
            solve_budget: 0.08,
            max_sqp_iters: 8,
            qp_max_iter: 200,
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> MpcResult<()> {
        if self.horizon < 2 {
            return Err(MpcError::Configuration(format!(
                "horizon must be at least 2, got {}",
                self.horizon
            )));
        }
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(MpcError::Configuration(format!(
                "timestep must be positive, got {}",
                self.dt
            )));
        }
        if !(self.lf > 0.0 && self.lf.is_finite()) {
            return Err(MpcError::Configuration(format!(
                "vehicle length must be positive, got {}",
                self.lf
            )));
        }
        if !(self.max_steer > 0.0 && self.max_steer.is_finite()) {
            return Err(MpcError::Configuration(format!(
                "steering limit must be positive, got {}",
                self.max_steer
            )));
        }
        if !(self.accel_min < self.accel_max)
            || !self.accel_min.is_finite()
            || !self.accel_max.is_finite()
        {
            return Err(MpcError::Configuration(format!(
                "acceleration bounds are inverted: [{}, {}]",
                self.accel_min, self.accel_max
            )));
        }
        if !self.target_speed.is_finite() {
            return Err(MpcError::Configuration(
                "target speed must be finite".to_string(),
            ));
        }
        if self.weights.all().iter().any(|w| !(*w >= 0.0) || !w.is_finite()) {
            return Err(MpcError::Configuration(
                "cost weights must be non-negative and finite".to_string(),
            ));
        }
        if !(self.latency >= 0.0 && self.latency.is_finite()) {
            return Err(MpcError::Configuration(format!(
                "latency must be non-negative, got {}",
                self.latency
            )));
        }
        if !(self.solve_budget > 0.0 && self.solve_budget.is_finite()) {
            return Err(MpcError::Configuration(format!(
                "solve budget must be positive, got {}",
                self.solve_budget
            )));
        }
        if self.max_sqp_iters == 0 || self.qp_max_iter == 0 {
            return Err(MpcError::Configuration(
                "iteration caps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MpcConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_short_horizon() {
        let mut config = MpcConfig::default();
        config.horizon = 1;
        assert!(matches!(
            config.validate(),
            Err(MpcError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_nonpositive_timestep() {
        let mut config = MpcConfig::default();
        config.dt = 0.0;
        assert!(config.validate().is_err());
        config.dt = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_accel_bounds() {
        let mut config = MpcConfig::default();
        config.accel_min = 2.0;
        config.accel_max = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut config = MpcConfig::default();
        config.weights.cte = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_latency() {
        let mut config = MpcConfig::default();
        config.latency = -0.05;
        assert!(config.validate().is_err());
    }
}
