//! Unified error handling for the correlation engine.
//!
//! The algorithmic stages never raise: missing reading fields and
//! unparseable location strings are expected real-world conditions
//! handled in-band. Errors exist only for caller misconfiguration,
//! which is rejected at the API boundary before any processing starts.

use std::fmt;

/// Unified error type for correlation engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelatorError {
    /// A time window or gap parameter must be strictly positive
    InvalidWindow {
        parameter: &'static str,
        value: i64,
    },
    /// A minimum-occurrence threshold must be at least 1
    InvalidMinOccurrences { value: usize },
    /// A numeric threshold is outside its valid range
    InvalidThreshold {
        parameter: &'static str,
        message: String,
    },
    /// A ring-road circumference must be strictly positive
    InvalidCircumference { road: String, value: f64 },
}

impl fmt::Display for CorrelatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelatorError::InvalidWindow { parameter, value } => {
                write!(f, "'{}' must be positive, got {}", parameter, value)
            }
            CorrelatorError::InvalidMinOccurrences { value } => {
                write!(f, "'min_occurrences' must be at least 1, got {}", value)
            }
            CorrelatorError::InvalidThreshold { parameter, message } => {
                write!(f, "'{}' is invalid: {}", parameter, message)
            }
            CorrelatorError::InvalidCircumference { road, value } => {
                write!(
                    f,
                    "ring road '{}' has non-positive circumference {} km",
                    road, value
                )
            }
        }
    }
}

impl std::error::Error for CorrelatorError {}

/// Result type alias for correlation engine operations.
pub type Result<T> = std::result::Result<T, CorrelatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CorrelatorError::InvalidWindow {
            parameter: "window_minutes",
            value: 0,
        };
        assert!(err.to_string().contains("window_minutes"));
        assert!(err.to_string().contains('0'));

        let err = CorrelatorError::InvalidMinOccurrences { value: 0 };
        assert!(err.to_string().contains("min_occurrences"));
    }
}
