use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::age_curve::AgeCurveModel;
use crate::blend::{BlendedProbability, ProbabilityBlender};
use crate::calibration::CalibrationSet;
use crate::config::CoreConfig;
use crate::elo::{RatingUpdateEngine, expectation, expected_margin};
use crate::error::{CoreError, CoreResult};
use crate::odds::{NormalizedOdds, OddsQuote, american_to_decimal, normalize};
use crate::rating_store::RatingStore;
use crate::selection::{Recommendation, select};

/// An upcoming bout to price. Quote sides are keyed by competitor id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupInput {
    pub competitor_a: String,
    pub competitor_b: String,
    pub division: String,
    /// External model's `P(A wins)`.
    pub model_prob: f64,
    pub quote: OddsQuote,
    pub as_of: NaiveDate,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchupFlags {
    pub uncalibrated: bool,
    pub odds_degraded: bool,
    pub arbitrage: bool,
    pub unseen_competitor: bool,
    pub stale_quote: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideRecommendation {
    pub competitor_id: String,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchupResult {
    pub rating_prob: f64,
    pub expected_margin: f64,
    pub blended: BlendedProbability,
    pub odds: NormalizedOdds,
    /// De-vigged `P(A wins)`.
    pub market_prob: f64,
    pub recommendation: Option<SideRecommendation>,
    pub flags: MatchupFlags,
}

/// Ratings, blend, de-vig and selection for one bout, read-only against the
/// store. Both sides are priced; the higher-EV recommendation wins.
pub fn evaluate_matchup(
    input: &MatchupInput,
    store: &RatingStore,
    cfg: &CoreConfig,
    age_curves: &AgeCurveModel,
    calibrations: &CalibrationSet,
) -> CoreResult<MatchupResult> {
    if input.competitor_a.is_empty()
        || input.competitor_b.is_empty()
        || input.competitor_a == input.competitor_b
    {
        return Err(CoreError::InvalidMatchup(format!(
            "matchup needs two distinct competitors, got {:?} vs {:?}",
            input.competitor_a, input.competitor_b
        )));
    }

    let engine = RatingUpdateEngine::new(&cfg.rating, age_curves)?;
    let a = engine.preview(store, &input.competitor_a, &input.division, input.as_of);
    let b = engine.preview(store, &input.competitor_b, &input.division, input.as_of);
    let rating_prob = expectation(&a, &b, &cfg.rating);
    let margin = expected_margin(&a, &b, &cfg.rating);

    let rating_uncertainty = (a.weighted_uncertainty(&cfg.rating.weights)
        + b.weighted_uncertainty(&cfg.rating.weights))
        / (2.0 * cfg.rating.default_uncertainty);

    let blender = ProbabilityBlender::new(&cfg.blend, calibrations);
    let blended = blender.blend(rating_prob, input.model_prob, &input.division, rating_uncertainty)?;

    let odds = normalize(&input.quote, &cfg.normalizer)?;
    let market_a = side_probability(&odds, &input.competitor_a)?;
    let market_b = side_probability(&odds, &input.competitor_b)?;
    let decimal_a = side_decimal(&input.quote, &input.competitor_a)?;
    let decimal_b = side_decimal(&input.quote, &input.competitor_b)?;

    let p_a = blended.probability;
    let pick_a = select(p_a, market_a, decimal_a, &cfg.selection)?;
    let pick_b = select(1.0 - p_a, market_b, decimal_b, &cfg.selection)?;
    let recommendation = match (pick_a, pick_b) {
        (Some(ra), Some(rb)) if rb.expected_value > ra.expected_value => {
            Some(side(&input.competitor_b, rb))
        }
        (Some(ra), _) => Some(side(&input.competitor_a, ra)),
        (None, Some(rb)) => Some(side(&input.competitor_b, rb)),
        (None, None) => None,
    };

    let stale_quote = match input.now {
        Some(now) => input
            .quote
            .is_stale(now, Duration::minutes(cfg.normalizer.stale_after_minutes)),
        None => false,
    };
    let flags = MatchupFlags {
        uncalibrated: !blended.calibrated,
        odds_degraded: odds.degraded,
        arbitrage: odds.arbitrage,
        unseen_competitor: !store.contains(&input.competitor_a)
            || !store.contains(&input.competitor_b),
        stale_quote,
    };
    debug!(
        a = %input.competitor_a,
        b = %input.competitor_b,
        rating_prob,
        blended = p_a,
        market_a,
        ?flags,
        "matchup evaluated"
    );

    Ok(MatchupResult {
        rating_prob,
        expected_margin: margin,
        blended,
        odds,
        market_prob: market_a,
        recommendation,
        flags,
    })
}

fn side(competitor_id: &str, recommendation: Recommendation) -> SideRecommendation {
    SideRecommendation {
        competitor_id: competitor_id.to_string(),
        recommendation,
    }
}

fn side_probability(odds: &NormalizedOdds, competitor_id: &str) -> CoreResult<f64> {
    odds.fair_probability(competitor_id)
        .ok_or_else(|| CoreError::InvalidQuote(format!("no price for {competitor_id}")))
}

fn side_decimal(quote: &OddsQuote, competitor_id: &str) -> CoreResult<f64> {
    let american = quote
        .price(competitor_id)
        .ok_or_else(|| CoreError::InvalidQuote(format!("no price for {competitor_id}")))?;
    american_to_decimal(american)
}
