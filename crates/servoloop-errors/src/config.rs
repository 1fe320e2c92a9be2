//! Configuration error types.
//!
//! Configuration checks are limited to values that would make the control
//! arithmetic meaningless (zero resolutions, zero periods, inverted limits).

use crate::common::ErrorSeverity;

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Value must be strictly positive
    #[error("{field} must be non-zero")]
    Zero {
        /// Field name
        field: &'static str,
    },

    /// Value out of range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name
        field: &'static str,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Lower limit above upper limit
    #[error("{lower} must not exceed {upper}")]
    InvertedLimits {
        /// Lower limit field name
        lower: &'static str,
        /// Upper limit field name
        upper: &'static str,
    },

    /// Configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    Io(String),
}

impl ConfigError {
    /// Create a zero-value error.
    pub fn zero(field: &'static str) -> Self {
        ConfigError::Zero { field }
    }

    /// Create an out-of-range error.
    pub fn out_of_range<T: ToString>(field: &'static str, value: T, min: T, max: T) -> Self {
        ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Create an inverted-limits error.
    pub fn inverted(lower: &'static str, upper: &'static str) -> Self {
        ConfigError::InvertedLimits { lower, upper }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }
}

/// Return `Err(ConfigError::Zero)` if `value` equals zero.
///
/// # Errors
///
/// Returns [`ConfigError::Zero`] naming `field`.
pub fn ensure_non_zero<T: PartialEq + Default>(
    field: &'static str,
    value: T,
) -> Result<(), ConfigError> {
    if value == T::default() {
        return Err(ConfigError::zero(field));
    }
    Ok(())
}
