use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bout::{BoutOutcome, BoutRecord, DRAW, LOSS, WIN};
use crate::error::CoreResult;
use crate::odds::{OddsQuote, implied_to_american};

/// Heavy favourites are priced no shorter than this implied probability.
const MAX_IMPLIED: f64 = 0.99;
const DIVISIONS: [&str; 8] = ["HW", "LHW", "MW", "WW", "LW", "FW", "BW", "FLW"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryParams {
    pub competitors: usize,
    pub bouts: usize,
    /// Number of divisions used, taken from the heaviest down.
    pub divisions: usize,
    pub seed: u64,
    pub start: NaiveDate,
    /// Bookmaker overround added to each two-way quote.
    pub margin: f64,
    pub draw_rate: f64,
}

impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            competitors: 200,
            bouts: 2_000,
            divisions: 4,
            seed: 7,
            start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            margin: 0.045,
            draw_rate: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticBout {
    pub record: BoutRecord,
    pub quote: OddsQuote,
    /// Noisy stand-in for an external model's `P(A wins)`.
    pub model_prob: f64,
    /// Probability the result was actually drawn from.
    pub true_prob: f64,
}

struct Competitor {
    id: String,
    division: usize,
    skill: f64,
    age_at_start: f64,
}

/// Deterministic synthetic history for a given seed, in chronological order.
pub fn generate(params: &HistoryParams) -> CoreResult<Vec<SyntheticBout>> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let divisions = params.divisions.clamp(1, DIVISIONS.len());
    let roster: Vec<Competitor> = (0..params.competitors.max(2))
        .map(|i| Competitor {
            id: format!("c{i:05}"),
            division: i % divisions,
            skill: gaussian(&mut rng) * 120.0,
            age_at_start: rng.gen_range(21.0..35.0),
        })
        .collect();
    let by_division: Vec<Vec<usize>> = (0..divisions)
        .map(|d| (0..roster.len()).filter(|i| roster[*i].division == d).collect())
        .collect();
    let eligible: Vec<usize> = (0..divisions).filter(|d| by_division[*d].len() >= 2).collect();
    if eligible.is_empty() {
        return Ok(Vec::new());
    }

    let mut date = params.start;
    let mut out = Vec::with_capacity(params.bouts);
    for n in 0..params.bouts {
        date += Duration::days(rng.gen_range(0..=3));
        let div = eligible[rng.gen_range(0..eligible.len())];
        let pool = &by_division[div];
        let ia = pool[rng.gen_range(0..pool.len())];
        let mut ib = pool[rng.gen_range(0..pool.len())];
        while ib == ia {
            ib = pool[rng.gen_range(0..pool.len())];
        }
        let (a, b) = (&roster[ia], &roster[ib]);

        let years = (date - params.start).num_days() as f64 / 365.25;
        let age_a = a.age_at_start + years;
        let age_b = b.age_at_start + years;
        let true_prob = 1.0 / (1.0 + (-(a.skill - b.skill) / 150.0).exp());

        let roll: f64 = rng.gen_range(0.0..1.0);
        let result = if roll < params.draw_rate {
            DRAW
        } else if rng.gen_range(0.0..1.0) < true_prob {
            WIN
        } else {
            LOSS
        };

        let book_a = (true_prob + gaussian(&mut rng) * 0.04).clamp(0.05, 0.95);
        let scale = 1.0 + params.margin.max(0.0);
        let quote = OddsQuote::two_way(
            &a.id,
            implied_to_american((book_a * scale).min(MAX_IMPLIED))?,
            &b.id,
            implied_to_american(((1.0 - book_a) * scale).min(MAX_IMPLIED))?,
        );
        let model_prob = (true_prob + gaussian(&mut rng) * 0.06).clamp(0.02, 0.98);

        out.push(SyntheticBout {
            record: BoutRecord {
                outcome: BoutOutcome {
                    bout_id: format!("b{n:06}"),
                    competitor_a: a.id.clone(),
                    competitor_b: b.id.clone(),
                    division: DIVISIONS[div].to_string(),
                    date,
                    result,
                },
                age_a,
                age_b,
            },
            quote,
            model_prob,
            true_prob,
        });
    }
    Ok(out)
}

// Box-Muller transform.
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
