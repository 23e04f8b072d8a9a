//! Error types for gammacount-core.

use thiserror::Error;

/// Result type alias for gammacount operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for gammacount operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A physical or numerical input is outside its valid domain.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The nonlinear least-squares solver gave up.
    #[error("fit did not converge after {iterations} iterations: {reason}")]
    FitDidNotConverge { iterations: usize, reason: String },

    /// No efficiency curve is registered for a detector position.
    #[error("no efficiency model registered for detector distance {0} cm")]
    MissingEfficiency(f64),
}

impl Error {
    /// Builds an [`Error::InvalidParameter`].
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Returns `Ok(())` when `condition` holds, otherwise an
    /// [`Error::InvalidParameter`] for `name`.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when `condition` is false.
    pub fn ensure(
        condition: bool,
        name: &'static str,
        reason: impl Into<String>,
    ) -> Result<()> {
        if condition {
            Ok(())
        } else {
            Err(Self::invalid(name, reason))
        }
    }

    /// True for validation failures.
    #[must_use]
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, Self::InvalidParameter { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure() {
        assert!(Error::ensure(true, "x", "unused").is_ok());
        let err = Error::ensure(false, "half_life", "must be positive").unwrap_err();
        assert!(err.is_invalid_parameter());
        assert_eq!(
            err.to_string(),
            "invalid parameter `half_life`: must be positive"
        );
    }

    #[test]
    fn test_only_validation_is_invalid_parameter() {
        let unconverged = Error::FitDidNotConverge {
            iterations: 3,
            reason: "stalled".to_string(),
        };
        assert!(!unconverged.is_invalid_parameter());
        let missing = Error::MissingEfficiency(12.5);
        assert!(!missing.is_invalid_parameter());
        assert_eq!(
            missing.to_string(),
            "no efficiency model registered for detector distance 12.5 cm"
        );
    }
}
