use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationSet;
use crate::config::BlendConfig;
use crate::error::{CoreError, CoreResult, check_open_probability, check_probability};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendedProbability {
    pub probability: f64,
    pub interval: (f64, f64),
    /// Mixed value before the calibration map.
    pub mixed: f64,
    /// `false` when the division had no calibration map.
    pub calibrated: bool,
}

pub struct ProbabilityBlender<'a> {
    cfg: &'a BlendConfig,
    calibrations: &'a CalibrationSet,
}

impl<'a> ProbabilityBlender<'a> {
    pub fn new(cfg: &'a BlendConfig, calibrations: &'a CalibrationSet) -> Self {
        Self { cfg, calibrations }
    }

    /// `rating_uncertainty` is the matchup's rating uncertainty relative to a
    /// fresh competitor (1.0 = no bouts yet).
    pub fn blend(
        &self,
        rating_prob: f64,
        model_prob: f64,
        division: &str,
        rating_uncertainty: f64,
    ) -> CoreResult<BlendedProbability> {
        check_probability("rating probability", rating_prob)?;
        check_open_probability("model probability", model_prob)?;
        if !(rating_uncertainty.is_finite() && rating_uncertainty >= 0.0) {
            return Err(CoreError::InvalidProbability {
                what: "rating uncertainty",
                value: rating_uncertainty,
            });
        }

        let w = self.cfg.rating_weight;
        let mixed = w * rating_prob + (1.0 - w) * model_prob;
        let (probability, calibrated) = match self.calibrations.get(division) {
            Some(map) => (map.apply(mixed), true),
            None => (mixed, false),
        };

        let half_width = (self.cfg.base_half_width
            + self.cfg.disagreement_scale * (rating_prob - model_prob).abs()
            + self.cfg.uncertainty_scale * rating_uncertainty)
            .min(self.cfg.max_half_width);
        let interval = (
            (probability - half_width).clamp(0.0, 1.0),
            (probability + half_width).clamp(0.0, 1.0),
        );

        Ok(BlendedProbability {
            probability,
            interval,
            mixed,
            calibrated,
        })
    }
}
