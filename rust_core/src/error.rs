//! Error types for revgrad_core.

use std::fmt;
use thiserror::Error;

/// Precondition a numeric argument failed to satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    NotNan,
    Finite,
    Positive,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::NotNan => f.write_str("not nan"),
            Requirement::Finite => f.write_str("finite"),
            Requirement::Positive => f.write_str("positive"),
        }
    }
}

/// Domain errors raised before any summand is computed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// One element of an argument violated a precondition.
    #[error("{function}: {label} is {value}, but must be {requirement}")]
    InvalidArgument {
        function: &'static str,
        label: String,
        value: f64,
        requirement: Requirement,
    },

    /// Two sequence arguments have different nonzero lengths.
    #[error(
        "{function}: size of {label} ({size}) must match size of {expected_label} ({expected})"
    )]
    InconsistentSizes {
        function: &'static str,
        label: &'static str,
        size: usize,
        expected_label: &'static str,
        expected: usize,
    },

    /// Coefficients for which the 3F2 hypergeometric series does not converge.
    #[error(
        "{function}: hypergeometric function 3F2 does not meet convergence conditions \
         with a1: {a1}, a2: {a2}, a3: {a3}, b1: {b1}, b2: {b2}, z: {z}"
    )]
    HypergeometricDivergence {
        function: &'static str,
        a1: f64,
        a2: f64,
        a3: f64,
        b1: f64,
        b2: f64,
        z: f64,
    },
}

impl DomainError {
    /// Name of the function that raised the error.
    pub fn function(&self) -> &'static str {
        match self {
            DomainError::InvalidArgument { function, .. }
            | DomainError::InconsistentSizes { function, .. }
            | DomainError::HypergeometricDivergence { function, .. } => function,
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_message() {
        let err = DomainError::InvalidArgument {
            function: "normal_log",
            label: "Scale parameter[2]".to_string(),
            value: -1.0,
            requirement: Requirement::Positive,
        };
        assert_eq!(
            err.to_string(),
            "normal_log: Scale parameter[2] is -1, but must be positive"
        );
        assert_eq!(err.function(), "normal_log");
    }

    #[test]
    fn test_inconsistent_sizes_message() {
        let err = DomainError::InconsistentSizes {
            function: "normal_cdf",
            label: "Location parameter",
            size: 2,
            expected_label: "Random variable",
            expected: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Location parameter (2)"), "{msg}");
        assert!(msg.contains("Random variable (3)"), "{msg}");
    }
}
