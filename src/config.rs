use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const DEFAULT_COMPONENTS: &[(&str, f64)] = &[
    ("striking", 1.0),
    ("grappling", 0.9),
    ("wrestling", 0.95),
    ("submissions", 0.85),
    ("cardio", 0.9),
    ("durability", 0.8),
    ("fight_iq", 0.75),
    ("aggression", 0.7),
];

/// Rating dimensionality, weights and update-rate knobs. Shared by reference
/// between the update engine and the blender.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub components: Vec<String>,
    pub weights: Vec<f64>,
    pub k_base: f64,
    pub default_rating: f64,
    pub default_uncertainty: f64,
    pub uncertainty_floor: f64,
    pub uncertainty_ceiling: f64,
    pub uncertainty_shrink: f64,
    pub inactivity_window_days: i64,
    pub decay_half_life_days: f64,
    pub division_half_life_overrides: BTreeMap<String, f64>,
}

impl Default for RatingConfig {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert("HW".to_string(), 450.0);
        overrides.insert("LHW".to_string(), 420.0);
        Self {
            components: DEFAULT_COMPONENTS
                .iter()
                .map(|(name, _)| name.to_string())
                .collect(),
            weights: DEFAULT_COMPONENTS.iter().map(|(_, w)| *w).collect(),
            k_base: 24.0,
            default_rating: 1500.0,
            default_uncertainty: 250.0,
            uncertainty_floor: 50.0,
            uncertainty_ceiling: 350.0,
            uncertainty_shrink: 0.98,
            inactivity_window_days: 180,
            decay_half_life_days: 365.0,
            division_half_life_overrides: overrides,
        }
    }
}

impl RatingConfig {
    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    pub fn half_life_for(&self, division: &str) -> f64 {
        self.division_half_life_overrides
            .get(division)
            .copied()
            .unwrap_or(self.decay_half_life_days)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.components.is_empty() {
            return Err(invalid("at least one rating component is required"));
        }
        if self.components.len() != self.weights.len() {
            return Err(invalid(format!(
                "{} components but {} weights",
                self.components.len(),
                self.weights.len()
            )));
        }
        let mut seen = HashSet::new();
        for name in &self.components {
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!("duplicate component {name}")));
            }
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("component weights must be finite and non-negative"));
        }
        if !(self.k_base.is_finite() && self.k_base > 0.0) {
            return Err(invalid("k_base must be positive"));
        }
        if !self.default_rating.is_finite() {
            return Err(invalid("default_rating must be finite"));
        }
        if !(self.uncertainty_floor.is_finite() && self.uncertainty_floor >= 0.0) {
            return Err(invalid("uncertainty_floor must be non-negative"));
        }
        if !(self.uncertainty_floor <= self.default_uncertainty
            && self.default_uncertainty <= self.uncertainty_ceiling
            && self.uncertainty_ceiling.is_finite())
        {
            return Err(invalid(
                "uncertainty must satisfy floor <= default <= ceiling",
            ));
        }
        if !(self.uncertainty_shrink > 0.0 && self.uncertainty_shrink <= 1.0) {
            return Err(invalid("uncertainty_shrink must be in (0, 1]"));
        }
        if self.inactivity_window_days < 0 {
            return Err(invalid("inactivity_window_days must be non-negative"));
        }
        let half_lives = std::iter::once(&self.decay_half_life_days)
            .chain(self.division_half_life_overrides.values());
        for hl in half_lives {
            if !(hl.is_finite() && *hl > 0.0) {
                return Err(invalid("decay half-lives must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Weight on the rating-implied probability; the model gets `1 - rating_weight`.
    pub rating_weight: f64,
    pub base_half_width: f64,
    pub disagreement_scale: f64,
    pub uncertainty_scale: f64,
    pub max_half_width: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            rating_weight: 0.5,
            base_half_width: 0.05,
            disagreement_scale: 0.5,
            uncertainty_scale: 0.05,
            max_half_width: 0.5,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.rating_weight) {
            return Err(invalid("rating_weight must be in [0, 1]"));
        }
        let scales = [
            self.base_half_width,
            self.disagreement_scale,
            self.uncertainty_scale,
            self.max_half_width,
        ];
        if scales.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(invalid("interval scales must be finite and non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Fraction of full Kelly to stake.
    pub risk_multiplier: f64,
    pub max_stake_fraction: f64,
    /// Recommendations need EV strictly above this.
    pub min_ev_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            risk_multiplier: 0.25,
            max_stake_fraction: 0.1,
            min_ev_threshold: 0.02,
        }
    }
}

impl SelectionConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.risk_multiplier > 0.0 && self.risk_multiplier <= 1.0) {
            return Err(invalid("risk_multiplier must be in (0, 1]"));
        }
        if !(self.max_stake_fraction > 0.0 && self.max_stake_fraction <= 1.0) {
            return Err(invalid("max_stake_fraction must be in (0, 1]"));
        }
        if !self.min_ev_threshold.is_finite() {
            return Err(invalid("min_ev_threshold must be finite"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub tolerance: f64,
    pub max_iterations: u32,
    pub z_max: f64,
    pub stale_after_minutes: i64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 100,
            z_max: 0.25,
            stale_after_minutes: 30,
        }
    }
}

impl NormalizerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(invalid("tolerance must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1"));
        }
        if !(self.z_max > 0.0 && self.z_max < 1.0) {
            return Err(invalid("z_max must be in (0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub rating: RatingConfig,
    pub blend: BlendConfig,
    pub selection: SelectionConfig,
    pub normalizer: NormalizerConfig,
}

impl CoreConfig {
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read core config {}", path.display()))?;
        let cfg: CoreConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse core config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overrides scalar knobs from `FIGHT_EDGE_*` variables. Unparseable values are ignored.
    pub fn apply_env(mut self) -> Self {
        let r = &mut self.rating;
        r.k_base = env_f64("FIGHT_EDGE_K_BASE", r.k_base).clamp(1.0, 200.0);
        r.decay_half_life_days =
            env_f64("FIGHT_EDGE_HALF_LIFE_DAYS", r.decay_half_life_days).clamp(30.0, 3650.0);
        r.inactivity_window_days = env_i64("FIGHT_EDGE_INACTIVITY_DAYS", r.inactivity_window_days)
            .clamp(0, 3650);

        let b = &mut self.blend;
        b.rating_weight = env_f64("FIGHT_EDGE_RATING_WEIGHT", b.rating_weight).clamp(0.0, 1.0);

        let s = &mut self.selection;
        s.min_ev_threshold = env_f64("FIGHT_EDGE_MIN_EV", s.min_ev_threshold).clamp(-1.0, 1.0);
        s.max_stake_fraction =
            env_f64("FIGHT_EDGE_MAX_STAKE", s.max_stake_fraction).clamp(0.001, 1.0);
        s.risk_multiplier =
            env_f64("FIGHT_EDGE_RISK_MULTIPLIER", s.risk_multiplier).clamp(0.01, 1.0);

        let n = &mut self.normalizer;
        n.stale_after_minutes =
            env_i64("FIGHT_EDGE_STALE_AFTER_MIN", n.stale_after_minutes).clamp(1, 24 * 60);
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.rating.validate()?;
        self.blend.validate()?;
        self.selection.validate()?;
        self.normalizer.validate()
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidConfig(msg.into())
}
