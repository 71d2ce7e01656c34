use chrono::NaiveDate;
use tracing::debug;

use crate::age_curve::AgeCurveModel;
use crate::bout::BoutOutcome;
use crate::config::RatingConfig;
use crate::error::{CoreError, CoreResult};
use crate::rating_store::{CompetitorRating, RatingStore};

const LOGISTIC_SCALE: f64 = 400.0;

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub a: CompetitorRating,
    pub b: CompetitorRating,
    /// `P(A wins)` before the update.
    pub expected_a: f64,
    pub k_effective: f64,
    pub age_fallback: bool,
    pub decayed_a: bool,
    pub decayed_b: bool,
}

impl UpdateReport {
    pub fn into_pair(self) -> (CompetitorRating, CompetitorRating) {
        (self.a, self.b)
    }
}

pub fn logistic_expectation(delta: f64) -> f64 {
    1.0 / (1.0 + (-delta / LOGISTIC_SCALE).exp())
}

/// `sum_k w_k (a_k - b_k)`
pub fn weighted_delta(a: &CompetitorRating, b: &CompetitorRating, weights: &[f64]) -> f64 {
    a.ratings
        .iter()
        .zip(&b.ratings)
        .zip(weights)
        .map(|((ra, rb), w)| w * (ra - rb))
        .sum()
}

pub fn expectation(a: &CompetitorRating, b: &CompetitorRating, cfg: &RatingConfig) -> f64 {
    logistic_expectation(weighted_delta(a, b, &cfg.weights))
}

/// Projected finishing margin on a +/-5 scale.
pub fn expected_margin(a: &CompetitorRating, b: &CompetitorRating, cfg: &RatingConfig) -> f64 {
    (expectation(a, b, cfg) - 0.5) * 10.0
}

pub struct RatingUpdateEngine<'a> {
    cfg: &'a RatingConfig,
    age_curves: &'a AgeCurveModel,
}

impl<'a> RatingUpdateEngine<'a> {
    /// Rejects configs whose weights and components disagree.
    pub fn new(cfg: &'a RatingConfig, age_curves: &'a AgeCurveModel) -> CoreResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg, age_curves })
    }

    pub fn config(&self) -> &RatingConfig {
        self.cfg
    }

    /// `K0 * (1 + phi(age_a) - phi(age_b))`, plus whether the division had no anchor.
    pub fn k_effective(&self, division: &str, age_a: f64, age_b: f64) -> (f64, bool) {
        let ea = self.age_curves.effect(division, age_a);
        let eb = self.age_curves.effect(division, age_b);
        (
            self.cfg.k_base * (1.0 + ea.value - eb.value),
            ea.fallback || eb.fallback,
        )
    }

    /// Applies one bout. Nothing in the store changes when the bout is rejected.
    pub fn apply(
        &self,
        store: &mut RatingStore,
        outcome: &BoutOutcome,
        age_a: f64,
        age_b: f64,
    ) -> CoreResult<UpdateReport> {
        if store.dimension() != self.cfg.dimension() {
            return Err(CoreError::DimensionMismatch {
                expected: self.cfg.dimension(),
                got: store.dimension(),
            });
        }
        outcome.validate()?;
        for (label, age) in [("age_a", age_a), ("age_b", age_b)] {
            if !(age.is_finite() && age > 0.0) {
                return Err(outcome.reject(format!("{label} {age} is not a valid age")));
            }
        }

        let mut a = store.get_or_default(&outcome.competitor_a);
        let mut b = store.get_or_default(&outcome.competitor_b);
        for side in [&a, &b] {
            if side.last_updated.is_some_and(|last| last > outcome.date) {
                return Err(outcome.reject(format!(
                    "{} was last updated after {}",
                    side.competitor_id, outcome.date
                )));
            }
        }

        let decayed_a = self.decay(&mut a, &outcome.division, outcome.date);
        let decayed_b = self.decay(&mut b, &outcome.division, outcome.date);

        let expected_a = expectation(&a, &b, self.cfg);
        let (k_eff, age_fallback) = self.k_effective(&outcome.division, age_a, age_b);
        if age_fallback {
            debug!(
                division = %outcome.division,
                bout = %outcome.bout_id,
                "no age anchor for division, using flat curve"
            );
        }

        let r = outcome.result;
        let diff_a = r - expected_a;
        let diff_b = (1.0 - r) - (1.0 - expected_a);
        for (k, w) in self.cfg.weights.iter().enumerate() {
            a.ratings[k] += k_eff * diff_a * w;
            b.ratings[k] += k_eff * diff_b * w;
        }
        for side in [&mut a, &mut b] {
            for u in &mut side.uncertainties {
                *u = (*u * self.cfg.uncertainty_shrink).max(self.cfg.uncertainty_floor);
            }
            side.last_updated = Some(outcome.date);
        }

        *store.entry_or_init(&outcome.competitor_a) = a.clone();
        *store.entry_or_init(&outcome.competitor_b) = b.clone();

        Ok(UpdateReport {
            a,
            b,
            expected_a,
            k_effective: k_eff,
            age_fallback,
            decayed_a,
            decayed_b,
        })
    }

    /// What `competitor_id` would look like on `as_of`, decay included. Does not
    /// touch the store.
    pub fn preview(
        &self,
        store: &RatingStore,
        competitor_id: &str,
        division: &str,
        as_of: NaiveDate,
    ) -> CompetitorRating {
        let mut rating = store.get_or_default(competitor_id);
        self.decay(&mut rating, division, as_of);
        rating
    }

    fn decay(&self, rating: &mut CompetitorRating, division: &str, date: NaiveDate) -> bool {
        let Some(last) = rating.last_updated else {
            return false;
        };
        let gap_days = (date - last).num_days();
        if gap_days <= self.cfg.inactivity_window_days {
            return false;
        }
        let factor = 0.5_f64.powf(gap_days as f64 / self.cfg.half_life_for(division));
        let mean = self.cfg.default_rating;
        for r in &mut rating.ratings {
            *r = mean + (*r - mean) * factor;
        }
        for u in &mut rating.uncertainties {
            *u = (*u / factor).min(self.cfg.uncertainty_ceiling);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{RatingUpdateEngine, expectation, expected_margin, logistic_expectation};
    use crate::age_curve::AgeCurveModel;
    use crate::bout::BoutOutcome;
    use crate::config::RatingConfig;
    use crate::error::CoreError;
    use crate::rating_store::RatingStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn bout(id: &str, a: &str, b: &str, result: f64, on: NaiveDate) -> BoutOutcome {
        BoutOutcome {
            bout_id: id.to_string(),
            competitor_a: a.to_string(),
            competitor_b: b.to_string(),
            division: "LW".to_string(),
            date: on,
            result,
        }
    }

    #[test]
    fn equal_vectors_expect_even_odds() {
        let cfg = RatingConfig::default();
        let store = RatingStore::new(&cfg);
        let a = store.get_or_default("a");
        let b = store.get_or_default("b");
        assert_eq!(expectation(&a, &b, &cfg), 0.5);
        assert_eq!(expected_margin(&a, &b, &cfg), 0.0);
    }

    #[test]
    fn logistic_is_monotonic_in_delta() {
        let mut prev = 0.0;
        for step in -40..=40 {
            let p = logistic_expectation(step as f64 * 25.0);
            assert!(p >= prev);
            prev = p;
        }
    }

    #[test]
    fn winner_gains_and_loser_drops_in_every_weighted_component() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::with_default_anchors();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        let report = engine
            .apply(&mut store, &bout("b1", "a", "b", 1.0, date(2024, 1, 1)), 29.0, 29.0)
            .expect("valid bout");
        for k in 0..cfg.dimension() {
            assert!(report.a.ratings[k] > 1500.0);
            assert!(report.b.ratings[k] < 1500.0);
        }
        assert!((report.k_effective - 24.0).abs() < 1e-12);
        assert!(!report.age_fallback);
    }

    #[test]
    fn update_follows_closed_form() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::default();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        let report = engine
            .apply(&mut store, &bout("b1", "a", "b", 1.0, date(2024, 1, 1)), 30.0, 30.0)
            .expect("valid bout");
        // Even expectation: each component moves by K * 0.5 * w_k.
        for (k, w) in cfg.weights.iter().enumerate() {
            assert!((report.a.ratings[k] - (1500.0 + 12.0 * w)).abs() < 1e-9);
            assert!((report.b.ratings[k] - (1500.0 - 12.0 * w)).abs() < 1e-9);
        }
        assert!(report.age_fallback);
    }

    #[test]
    fn draw_between_equals_changes_nothing() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::with_default_anchors();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        let report = engine
            .apply(&mut store, &bout("b1", "a", "b", 0.5, date(2024, 1, 1)), 27.0, 34.0)
            .expect("valid bout");
        for k in 0..cfg.dimension() {
            assert!((report.a.ratings[k] - 1500.0).abs() < 1e-9);
            assert!((report.b.ratings[k] - 1500.0).abs() < 1e-9);
        }
    }

    #[test]
    fn uncertainty_shrinks_to_floor() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::default();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        let mut prev = cfg.default_uncertainty;
        for i in 0..200 {
            let on = date(2020, 1, 1) + chrono::Duration::days(i);
            let r = engine
                .apply(&mut store, &bout(&format!("b{i}"), "a", "b", 1.0, on), 30.0, 30.0)
                .expect("valid bout");
            let u = r.a.uncertainties[0];
            assert!(u <= prev);
            assert!(u >= cfg.uncertainty_floor);
            prev = u;
        }
        assert!((prev - cfg.uncertainty_floor).abs() < 1e-12);
    }

    #[test]
    fn long_layoff_decays_toward_mean_and_inflates_uncertainty() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::default();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        engine
            .apply(&mut store, &bout("b1", "a", "b", 1.0, date(2020, 1, 1)), 30.0, 30.0)
            .expect("valid bout");
        let before = store.get("a").cloned().expect("a rated");

        let later = engine.preview(&store, "a", "LW", date(2021, 1, 1));
        let gap = (date(2021, 1, 1) - date(2020, 1, 1)).num_days() as f64;
        let factor = 0.5_f64.powf(gap / 365.0);
        let expected = 1500.0 + (before.ratings[0] - 1500.0) * factor;
        assert!((later.ratings[0] - expected).abs() < 1e-9);
        assert!(later.uncertainties[0] > before.uncertainties[0]);
        assert!(later.uncertainties[0] <= cfg.uncertainty_ceiling);

        let soon = engine.preview(&store, "a", "LW", date(2020, 3, 1));
        assert_eq!(soon.ratings, before.ratings);
    }

    #[test]
    fn rejected_bouts_leave_store_untouched() {
        let cfg = RatingConfig::default();
        let ages = AgeCurveModel::default();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&cfg);
        assert!(
            engine
                .apply(&mut store, &bout("b1", "a", "a", 1.0, date(2024, 1, 1)), 30.0, 30.0)
                .is_err()
        );
        assert!(
            engine
                .apply(&mut store, &bout("b2", "a", "b", 1.0, date(2024, 1, 1)), f64::NAN, 30.0)
                .is_err()
        );
        assert!(store.is_empty());

        engine
            .apply(&mut store, &bout("b3", "a", "b", 1.0, date(2024, 6, 1)), 30.0, 30.0)
            .expect("valid bout");
        let snapshot = store.get("a").cloned();
        assert!(
            engine
                .apply(&mut store, &bout("b4", "a", "c", 0.0, date(2024, 2, 1)), 30.0, 30.0)
                .is_err()
        );
        assert_eq!(store.get("a").cloned(), snapshot);
        assert!(!store.contains("c"));
    }

    #[test]
    fn mismatched_weights_are_rejected_up_front() {
        let ages = AgeCurveModel::default();
        let mut extra = RatingConfig::default();
        extra.weights.push(0.5);
        assert!(matches!(
            RatingUpdateEngine::new(&extra, &ages),
            Err(CoreError::InvalidConfig(_))
        ));

        let mut short = RatingConfig::default();
        short.weights.pop();
        assert!(RatingUpdateEngine::new(&short, &ages).is_err());
    }

    #[test]
    fn store_with_other_layout_is_rejected() {
        let cfg = RatingConfig::default();
        let narrow = RatingConfig {
            components: vec!["striking".to_string(), "grappling".to_string()],
            weights: vec![1.0, 1.0],
            ..RatingConfig::default()
        };
        let ages = AgeCurveModel::default();
        let engine = RatingUpdateEngine::new(&cfg, &ages).expect("valid config");
        let mut store = RatingStore::new(&narrow);
        let err = engine
            .apply(&mut store, &bout("b1", "a", "b", 1.0, date(2024, 1, 1)), 30.0, 30.0)
            .expect_err("dimension mismatch");
        assert_eq!(
            err,
            CoreError::DimensionMismatch {
                expected: cfg.dimension(),
                got: 2,
            }
        );
        assert!(store.is_empty());
    }
}
