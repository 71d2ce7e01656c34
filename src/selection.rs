use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SelectionConfig;
use crate::error::{CoreError, CoreResult, check_probability};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub probability: f64,
    pub market_probability: f64,
    pub decimal_odds: f64,
    pub expected_value: f64,
    /// `probability - market_probability`
    pub edge: f64,
    /// Full Kelly, clipped to [0, 1].
    pub kelly_fraction: f64,
    pub stake_fraction: f64,
}

/// One side of a matchup offered for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub bout_id: String,
    pub competitor_id: String,
    pub probability: f64,
    pub market_probability: f64,
    pub decimal_odds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecommendation {
    pub bout_id: String,
    pub competitor_id: String,
    pub recommendation: Recommendation,
}

/// Profit per unit stake: `p(d - 1) - (1 - p)`.
pub fn expected_value(p: f64, decimal_odds: f64) -> f64 {
    p * (decimal_odds - 1.0) - (1.0 - p)
}

pub fn kelly_fraction(p: f64, decimal_odds: f64) -> CoreResult<f64> {
    check_odds(decimal_odds)?;
    Ok((expected_value(p, decimal_odds) / (decimal_odds - 1.0)).clamp(0.0, 1.0))
}

/// `Ok(None)` means priced but not worth a stake; degenerate odds are an error
/// so the two cases never look alike.
pub fn select(
    p: f64,
    market_p: f64,
    decimal_odds: f64,
    cfg: &SelectionConfig,
) -> CoreResult<Option<Recommendation>> {
    check_probability("calibrated probability", p)?;
    check_probability("market probability", market_p)?;
    check_odds(decimal_odds)?;

    let ev = expected_value(p, decimal_odds);
    if ev <= cfg.min_ev_threshold {
        return Ok(None);
    }
    let kelly = kelly_fraction(p, decimal_odds)?;
    let stake = (kelly * cfg.risk_multiplier).min(cfg.max_stake_fraction);

    Ok(Some(Recommendation {
        probability: p,
        market_probability: market_p,
        decimal_odds,
        expected_value: ev,
        edge: p - market_p,
        kelly_fraction: kelly,
        stake_fraction: stake,
    }))
}

/// Eligible candidates sorted by EV, best first. Candidates with invalid
/// inputs are dropped.
pub fn rank_recommendations(
    candidates: &[Candidate],
    cfg: &SelectionConfig,
) -> Vec<RankedRecommendation> {
    let mut ranked: Vec<RankedRecommendation> = candidates
        .par_iter()
        .filter_map(|c| {
            let rec = select(c.probability, c.market_probability, c.decimal_odds, cfg).ok()??;
            Some(RankedRecommendation {
                bout_id: c.bout_id.clone(),
                competitor_id: c.competitor_id.clone(),
                recommendation: rec,
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.recommendation
            .expected_value
            .total_cmp(&a.recommendation.expected_value)
            .then_with(|| a.bout_id.cmp(&b.bout_id))
            .then_with(|| a.competitor_id.cmp(&b.competitor_id))
    });
    ranked
}

fn check_odds(decimal_odds: f64) -> CoreResult<()> {
    if decimal_odds.is_finite() && decimal_odds > 1.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidOdds(decimal_odds))
    }
}

#[cfg(test)]
mod tests {
    use super::{Candidate, expected_value, kelly_fraction, rank_recommendations, select};
    use crate::config::SelectionConfig;
    use crate::error::CoreError;

    fn full_kelly() -> SelectionConfig {
        SelectionConfig {
            risk_multiplier: 1.0,
            max_stake_fraction: 1.0,
            min_ev_threshold: 0.0,
        }
    }

    #[test]
    fn worked_example_matches_closed_form() {
        let rec = select(0.62, 0.5, 1.91, &full_kelly())
            .expect("valid")
            .expect("positive ev");
        assert!((rec.expected_value - 0.1842).abs() < 1e-9);
        assert!((rec.kelly_fraction - 0.1842 / 0.91).abs() < 1e-9);
        assert!((rec.stake_fraction - 0.2024).abs() < 1e-4);
        assert!((rec.edge - 0.12).abs() < 1e-12);
    }

    #[test]
    fn stake_is_scaled_then_capped() {
        let cfg = SelectionConfig {
            risk_multiplier: 0.5,
            max_stake_fraction: 0.05,
            min_ev_threshold: 0.0,
        };
        let rec = select(0.62, 0.5, 1.91, &cfg).expect("valid").expect("positive ev");
        assert!((rec.stake_fraction - 0.05).abs() < 1e-12);

        let loose = SelectionConfig {
            max_stake_fraction: 0.5,
            ..cfg
        };
        let rec = select(0.62, 0.5, 1.91, &loose).expect("valid").expect("positive ev");
        assert!((rec.stake_fraction - 0.5 * 0.1842 / 0.91).abs() < 1e-9);
    }

    #[test]
    fn ev_at_threshold_is_not_recommended() {
        let ev = expected_value(0.55, 2.05);
        let cfg = SelectionConfig {
            min_ev_threshold: ev,
            ..full_kelly()
        };
        assert!(select(0.55, 0.5, 2.05, &cfg).expect("valid").is_none());
        let just_below = SelectionConfig {
            min_ev_threshold: ev - 1e-9,
            ..full_kelly()
        };
        assert!(select(0.55, 0.5, 2.05, &just_below).expect("valid").is_some());
    }

    #[test]
    fn degenerate_odds_are_an_error() {
        assert_eq!(
            select(0.6, 0.5, 1.0, &full_kelly()),
            Err(CoreError::InvalidOdds(1.0))
        );
        assert!(select(0.6, 0.5, 0.5, &full_kelly()).is_err());
        assert!(kelly_fraction(0.6, f64::NAN).is_err());
    }

    #[test]
    fn kelly_is_monotonic_in_probability() {
        let low = kelly_fraction(0.55, 2.0).expect("valid");
        let high = kelly_fraction(0.65, 2.0).expect("valid");
        assert!(high >= low);
        assert_eq!(kelly_fraction(0.2, 2.0).expect("valid"), 0.0);
    }

    #[test]
    fn stake_never_exceeds_cap() {
        let cfg = SelectionConfig {
            risk_multiplier: 1.0,
            max_stake_fraction: 0.07,
            min_ev_threshold: -1.0,
        };
        for pi in 1..100 {
            for d in [1.05, 1.5, 1.91, 2.5, 4.0, 11.0] {
                let p = pi as f64 / 100.0;
                if let Some(rec) = select(p, 0.5, d, &cfg).expect("valid") {
                    assert!(rec.stake_fraction >= 0.0);
                    assert!(rec.stake_fraction <= 0.07);
                }
            }
        }
    }

    #[test]
    fn ranking_filters_and_orders_by_ev() {
        let cfg = SelectionConfig {
            min_ev_threshold: 0.01,
            ..SelectionConfig::default()
        };
        let mk = |id: &str, p: f64, d: f64| Candidate {
            bout_id: id.to_string(),
            competitor_id: format!("{id}-a"),
            probability: p,
            market_probability: 1.0 / d,
            decimal_odds: d,
        };
        let ranked = rank_recommendations(
            &[mk("a", 0.6, 2.5), mk("b", 0.4, 2.5), mk("c", 0.7, 2.5), mk("d", 0.9, 1.0)],
            &cfg,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.bout_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(ranked.iter().all(|r| r.recommendation.expected_value > 0.01));
    }
}
