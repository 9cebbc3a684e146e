//! Error types for mpc_tracking

use std::fmt;

/// Main error type for the tracking controller
#[derive(Debug)]
pub enum MpcError {
    /// Malformed caller input (non-finite state, empty coefficients)
    InvalidInput(String),
    /// The optimizer failed to reach a feasible optimum within its budget
    NonConvergence(String),
    /// Inconsistent configuration, rejected at construction time
    Configuration(String),
}

impl fmt::Display for MpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpcError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            MpcError::NonConvergence(msg) => write!(f, "Solver did not converge: {}", msg),
            MpcError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for MpcError {}

/// Result type alias for controller operations
pub type MpcResult<T> = Result<T, MpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MpcError::InvalidInput("state contains NaN".to_string());
        assert_eq!(format!("{}", err), "Invalid input: state contains NaN");
        let err = MpcError::NonConvergence("iteration budget exhausted".to_string());
        assert!(format!("{}", err).contains("did not converge"));
    }
}
