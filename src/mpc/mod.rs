//! Receding-horizon optimization
//!
//! `problem` assembles the cost and constraints over the decision vector,
//! `solver` drives them to a local optimum, `controller` owns the public
//! entry point and the fallback policy.

pub mod config;
pub mod problem;
pub mod solver;
pub mod controller;

pub use config::{CostWeights, MpcConfig};
pub use controller::{MpcController, MpcSolution};
pub use problem::Layout;
pub use solver::SqpSolver;
