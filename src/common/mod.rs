//! Common types and error definitions for mpc_tracking
//!
//! This module provides the foundational building blocks shared by the
//! vehicle model and the horizon optimizer.

pub mod types;
pub mod error;

pub use types::*;
pub use error::*;
