use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::NormalizerConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedSide {
    pub side: String,
    pub american: f64,
}

/// Two or more sides of one market, priced in American odds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub sides: Vec<QuotedSide>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

impl OddsQuote {
    pub fn two_way(side_a: &str, american_a: f64, side_b: &str, american_b: f64) -> Self {
        Self {
            sides: vec![
                QuotedSide {
                    side: side_a.to_string(),
                    american: american_a,
                },
                QuotedSide {
                    side: side_b.to_string(),
                    american: american_b,
                },
            ],
            captured_at: None,
        }
    }

    pub fn captured(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    pub fn price(&self, side: &str) -> Option<f64> {
        self.sides.iter().find(|s| s.side == side).map(|s| s.american)
    }

    /// Quotes without a capture time are never stale.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.captured_at.is_some_and(|at| now - at > max_age)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMethod {
    Shin,
    Multiplicative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideProbability {
    pub side: String,
    pub raw: f64,
    pub fair: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOdds {
    pub sides: Vec<SideProbability>,
    /// `sum(raw) - 1`
    pub overround: f64,
    /// Shin insider-share parameter; zero on the multiplicative path.
    pub z: f64,
    pub method: NormalizationMethod,
    pub degraded: bool,
    /// Raw probabilities summed below one.
    pub arbitrage: bool,
    pub iterations: u32,
}

impl NormalizedOdds {
    pub fn fair_probability(&self, side: &str) -> Option<f64> {
        self.sides.iter().find(|s| s.side == side).map(|s| s.fair)
    }
}

pub fn american_to_implied(american: f64) -> CoreResult<f64> {
    check_american(american)?;
    Ok(if american > 0.0 {
        100.0 / (american + 100.0)
    } else {
        american.abs() / (american.abs() + 100.0)
    })
}

pub fn american_to_decimal(american: f64) -> CoreResult<f64> {
    check_american(american)?;
    Ok(if american > 0.0 {
        1.0 + american / 100.0
    } else {
        1.0 + 100.0 / american.abs()
    })
}

pub fn decimal_to_american(decimal: f64) -> CoreResult<f64> {
    if !(decimal.is_finite() && decimal > 1.0) {
        return Err(CoreError::InvalidOdds(decimal));
    }
    Ok(if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    })
}

pub fn decimal_to_implied(decimal: f64) -> CoreResult<f64> {
    if !(decimal.is_finite() && decimal > 1.0) {
        return Err(CoreError::InvalidOdds(decimal));
    }
    Ok(1.0 / decimal)
}

pub fn implied_to_american(prob: f64) -> CoreResult<f64> {
    if !(prob > 0.0 && prob < 1.0) {
        return Err(CoreError::InvalidProbability {
            what: "implied probability",
            value: prob,
        });
    }
    Ok(if prob >= 0.5 {
        -prob / (1.0 - prob) * 100.0
    } else {
        (1.0 - prob) / prob * 100.0
    })
}

/// `q_i / sum(q)`
pub fn multiplicative_normalize(raw: &[f64]) -> CoreResult<Vec<f64>> {
    let total: f64 = raw.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(CoreError::InvalidQuote(
            "raw probabilities do not sum to a positive value".to_string(),
        ));
    }
    Ok(raw.iter().map(|q| q / total).collect())
}

/// Removes the bookmaker margin with Shin's method. Falls back to
/// multiplicative normalization (flagged `degraded`) when the root is not
/// bracketed on `[0, z_max]` or bisection runs out of iterations.
pub fn normalize(quote: &OddsQuote, cfg: &NormalizerConfig) -> CoreResult<NormalizedOdds> {
    if quote.sides.len() < 2 {
        return Err(CoreError::InvalidQuote(format!(
            "need at least two sides, got {}",
            quote.sides.len()
        )));
    }
    let mut seen = HashSet::new();
    for s in &quote.sides {
        if !seen.insert(s.side.as_str()) {
            return Err(CoreError::InvalidQuote(format!("duplicate side {}", s.side)));
        }
    }
    let raw = quote
        .sides
        .iter()
        .map(|s| {
            american_to_implied(s.american)
                .map_err(|_| CoreError::InvalidQuote(format!("bad price {} for {}", s.american, s.side)))
        })
        .collect::<CoreResult<Vec<f64>>>()?;
    if raw.iter().all(|q| *q <= 0.0) {
        return Err(CoreError::InvalidQuote(
            "all raw probabilities are non-positive".to_string(),
        ));
    }

    let overround = raw.iter().sum::<f64>() - 1.0;
    let arbitrage = overround < 0.0;
    if arbitrage {
        warn!(overround, "quote sums below one, treating as arbitrage");
    }

    let (fair, z, method, degraded, iterations) = match solve_shin_z(&raw, cfg) {
        Some((z, iterations)) => (shin_probabilities(&raw, z), z, NormalizationMethod::Shin, false, iterations),
        None => {
            if !arbitrage {
                warn!(overround, "shin solve did not converge, using multiplicative");
            }
            (
                multiplicative_normalize(&raw)?,
                0.0,
                NormalizationMethod::Multiplicative,
                true,
                cfg.max_iterations,
            )
        }
    };

    let sides = quote
        .sides
        .iter()
        .zip(raw.iter().zip(fair))
        .map(|(s, (q, p))| SideProbability {
            side: s.side.clone(),
            raw: *q,
            fair: p,
        })
        .collect();

    Ok(NormalizedOdds {
        sides,
        overround,
        z,
        method,
        degraded,
        arbitrage,
        iterations,
    })
}

pub fn normalize_many(
    quotes: &[OddsQuote],
    cfg: &NormalizerConfig,
) -> Vec<CoreResult<NormalizedOdds>> {
    quotes.par_iter().map(|q| normalize(q, cfg)).collect()
}

// g(z) = sum sqrt(z^2 + 4(1-z) q_i^2) - (n-2) z - 2; the fair probabilities sum
// to one exactly at a root. Positive at z = 0 whenever the book has margin.
fn shin_residual(raw: &[f64], z: f64) -> f64 {
    let n = raw.len() as f64;
    raw.iter()
        .map(|q| (z * z + 4.0 * (1.0 - z) * q * q).sqrt())
        .sum::<f64>()
        - (n - 2.0) * z
        - 2.0
}

fn solve_shin_z(raw: &[f64], cfg: &NormalizerConfig) -> Option<(f64, u32)> {
    let mut lo = 0.0_f64;
    let mut hi = cfg.z_max;
    let g_lo = shin_residual(raw, lo);
    if g_lo.abs() <= cfg.tolerance {
        return Some((0.0, 0));
    }
    let g_hi = shin_residual(raw, hi);
    if g_lo.signum() == g_hi.signum() {
        return None;
    }

    for iteration in 1..=cfg.max_iterations {
        let mid = 0.5 * (lo + hi);
        let g_mid = shin_residual(raw, mid);
        if g_mid.abs() <= cfg.tolerance || 0.5 * (hi - lo) <= cfg.tolerance {
            return Some((mid, iteration));
        }
        if g_mid.signum() == g_lo.signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    None
}

fn shin_probabilities(raw: &[f64], z: f64) -> Vec<f64> {
    let p: Vec<f64> = raw
        .iter()
        .map(|q| ((z * z + 4.0 * (1.0 - z) * q * q).sqrt() - z) / (2.0 * (1.0 - z)))
        .collect();
    // Residual of the solve tolerance.
    let total: f64 = p.iter().sum();
    p.iter().map(|x| x / total).collect()
}

fn check_american(american: f64) -> CoreResult<()> {
    if american.is_finite() && american != 0.0 {
        Ok(())
    } else {
        Err(CoreError::InvalidOdds(american))
    }
}
