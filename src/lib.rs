//! mpc_tracking - Model predictive trajectory tracking for a ground vehicle
//!
//! This crate implements a receding-horizon controller: every control cycle it
//! solves a short-horizon constrained optimization over a kinematic bicycle
//! model, returns the first actuation of the optimal sequence and discards the
//! rest. The reference path is supplied by the caller as polynomial
//! coefficients in the vehicle frame; telemetry handling, polynomial fitting
//! and frame conversions are left to the surrounding system.

// Core modules
pub mod common;

// Vehicle model and reference-path evaluation
pub mod model;

// Horizon optimization
pub mod mpc;

// Re-export common types for convenience
pub use common::{Actuation, Point2D, VehicleState};
pub use common::{MpcError, MpcResult};
pub use model::BicycleModel;
pub use mpc::{CostWeights, MpcConfig, MpcController, MpcSolution};
