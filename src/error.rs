//! Error types for the ANOVA engine.
//!
//! Every failure the engine can report is a variant of [`AnovaError`]. Errors are
//! raised where they are detected and propagate unchanged; nothing in the engine
//! retries or repairs input.

use thiserror::Error;

/// The main error type for ANOVA analyses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnovaError {
    /// Malformed input: empty group, non-crossed two-way cells, too few levels,
    /// duplicate levels or non-finite observations.
    #[error("invalid design: {message}")]
    InvalidDesign {
        /// Description of what is wrong with the input.
        message: String,
    },

    /// The design leaves no residual degrees of freedom to estimate error variance.
    #[error(
        "insufficient degrees of freedom: {observations} observations in {cells} cells \
         leave {residual_df} residual df"
    )]
    InsufficientDegreesOfFreedom {
        /// Total number of observations (N).
        observations: usize,
        /// Number of groups or cells.
        cells: usize,
        /// Residual degrees of freedom, `N - cells`.
        residual_df: i64,
    },

    /// `SS_total` does not match the sum of its parts.
    #[error(
        "sum of squares decomposition is inconsistent: total {total} but parts sum to \
         {parts} (relative error {relative_error:e})"
    )]
    DecompositionInvariant {
        /// Directly computed total sum of squares.
        total: f64,
        /// Sum of the effect and error components.
        parts: f64,
        /// `|total - parts| / max(total, parts)`.
        relative_error: f64,
    },

    /// Significance level outside the open interval (0, 1).
    #[error("significance level {0} must lie strictly between 0 and 1")]
    InvalidAlpha(f64),

    /// A reference distribution could not be constructed.
    #[error("distribution error: {message}")]
    Distribution {
        /// Description from the distribution constructor.
        message: String,
    },

    /// The p-value verdict and the critical-value verdict disagree.
    #[error(
        "p-value and critical value disagree for {effect}: F = {f_ratio}, \
         critical = {critical_value}, p = {p_value}"
    )]
    SignificanceMismatch {
        /// Label of the effect under test.
        effect: String,
        /// Observed F-ratio.
        f_ratio: f64,
        /// Critical F value at alpha.
        critical_value: f64,
        /// Upper-tail p-value.
        p_value: f64,
    },
}

/// A specialized `Result` type for ANOVA operations.
pub type Result<T, E = AnovaError> = std::result::Result<T, E>;

impl AnovaError {
    /// Create a new `InvalidDesign` error.
    #[must_use]
    pub fn invalid_design(message: impl Into<String>) -> Self {
        Self::InvalidDesign {
            message: message.into(),
        }
    }

    /// Create a new `Distribution` error.
    #[must_use]
    pub fn distribution(message: impl Into<String>) -> Self {
        Self::Distribution {
            message: message.into(),
        }
    }

    /// Whether the error means the data cannot be analysed this way, as opposed
    /// to an internal defect of the engine.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDesign { .. }
                | Self::InsufficientDegreesOfFreedom { .. }
                | Self::InvalidAlpha(_)
        )
    }
}

/// Reject significance levels outside (0, 1).
pub(crate) fn validate_alpha(alpha: f64) -> Result<()> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(AnovaError::InvalidAlpha(alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnovaError::invalid_design("group 'G2' is empty");
        assert!(err.to_string().contains("invalid design"));
        assert!(err.to_string().contains("G2"));

        let err = AnovaError::InsufficientDegreesOfFreedom {
            observations: 4,
            cells: 4,
            residual_df: 0,
        };
        assert!(err.to_string().contains("4 observations"));
        assert!(err.to_string().contains("0 residual df"));
    }

    #[test]
    fn test_input_errors_are_distinguished() {
        assert!(AnovaError::invalid_design("x").is_input_error());
        assert!(AnovaError::InvalidAlpha(1.5).is_input_error());
        assert!(
            !AnovaError::DecompositionInvariant {
                total: 1.0,
                parts: 2.0,
                relative_error: 0.5,
            }
            .is_input_error()
        );
    }

    #[test]
    fn test_validate_alpha() {
        assert!(validate_alpha(0.05).is_ok());
        assert_eq!(validate_alpha(0.0), Err(AnovaError::InvalidAlpha(0.0)));
        assert_eq!(validate_alpha(1.0), Err(AnovaError::InvalidAlpha(1.0)));
        assert!(validate_alpha(f64::NAN).is_err());
    }
}
