use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Failures of the numeric core. I/O layers wrap these in `anyhow`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("invalid quote: {0}")]
    InvalidQuote(String),

    #[error("invalid decimal odds {0}: must be greater than 1")]
    InvalidOdds(f64),

    #[error("invalid probability {value} for {what}")]
    InvalidProbability { what: &'static str, value: f64 },

    #[error("invalid bout {bout_id}: {reason}")]
    InvalidBout { bout_id: String, reason: String },

    #[error("invalid matchup: {0}")]
    InvalidMatchup(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid calibration map for {division}: {reason}")]
    InvalidCalibration { division: String, reason: String },

    #[error("rating vector has {got} components, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub(crate) fn check_probability(what: &'static str, value: f64) -> CoreResult<f64> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::InvalidProbability { what, value })
    }
}

/// Like `check_probability`, but 0 and 1 are rejected too.
pub(crate) fn check_open_probability(what: &'static str, value: f64) -> CoreResult<f64> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(CoreError::InvalidProbability { what, value })
    }
}
