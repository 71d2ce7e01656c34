use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fight_edge::age_curve::AgeCurveModel;
use fight_edge::backtest::{run_backtest, simulate_bankroll};
use fight_edge::bout::{BoutRecord, DRAW, WIN};
use fight_edge::calibration::CalibrationSet;
use fight_edge::config::CoreConfig;
use fight_edge::elo::{RatingUpdateEngine, expectation};
use fight_edge::fake_history::{self, HistoryParams};
use fight_edge::matchup::{MatchupInput, evaluate_matchup};
use fight_edge::metrics::{
    BootstrapParams, division_reports, evaluate_probs, expected_calibration_error,
};
use fight_edge::odds::{OddsQuote, american_to_decimal};
use fight_edge::persist::{JsonSnapshotStore, SnapshotStore};
use fight_edge::rating_store::RatingStore;
use fight_edge::selection::Recommendation;
use fight_edge::snapshot_db::SqliteSnapshotStore;

const DEFAULT_SYNTHETIC_BOUTS: usize = 2_000;
const STARTING_BANKROLL: f64 = 1_000.0;
const CALIBRATION_BINS: usize = 10;

#[derive(Debug, Clone, serde::Deserialize)]
struct HistoryRow {
    #[serde(flatten)]
    record: BoutRecord,
    #[serde(default)]
    model_prob: Option<f64>,
    #[serde(default)]
    quote: Option<OddsQuote>,
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = match parse_path_arg("--config") {
        Some(path) => CoreConfig::load_json(&path)?,
        None => CoreConfig::default(),
    }
    .apply_env();
    cfg.validate().context("invalid configuration")?;

    let age_curves = match parse_path_arg("--age-curves") {
        Some(path) => AgeCurveModel::load_json(&path)?,
        None => AgeCurveModel::with_default_anchors(),
    };
    let calibrations = match parse_path_arg("--calibration") {
        Some(path) => CalibrationSet::load_json(&path)?,
        None => CalibrationSet::default(),
    };

    let mut rows = match parse_path_arg("--bouts") {
        Some(path) => load_rows(&path)?,
        None => synthetic_rows()?,
    };
    rows.sort_by(|a, b| {
        a.record
            .outcome
            .date
            .cmp(&b.record.outcome.date)
            .then_with(|| a.record.outcome.bout_id.cmp(&b.record.outcome.bout_id))
    });
    info!(bouts = rows.len(), "loaded history");

    let engine = RatingUpdateEngine::new(&cfg.rating, &age_curves)?;
    let mut store = RatingStore::new(&cfg.rating);

    let mut rated = Scored::default();
    let mut blended = Scored::default();
    let mut favourite_prices = Vec::new();
    let mut bets: Vec<(Recommendation, f64)> = Vec::new();
    let mut flagged_uncalibrated = 0usize;
    let mut rejected = 0usize;

    for row in &rows {
        let outcome = &row.record.outcome;
        let a = engine.preview(&store, &outcome.competitor_a, &outcome.division, outcome.date);
        let b = engine.preview(&store, &outcome.competitor_b, &outcome.division, outcome.date);
        let rating_prob = expectation(&a, &b, &cfg.rating);
        let decided = outcome.result != DRAW;
        if decided {
            rated.push(&outcome.division, rating_prob, outcome.result == WIN);
        }

        if let (Some(model_prob), Some(quote)) = (row.model_prob, row.quote.as_ref()) {
            let input = MatchupInput {
                competitor_a: outcome.competitor_a.clone(),
                competitor_b: outcome.competitor_b.clone(),
                division: outcome.division.clone(),
                model_prob,
                quote: quote.clone(),
                as_of: outcome.date,
                now: None,
            };
            match evaluate_matchup(&input, &store, &cfg, &age_curves, &calibrations) {
                Ok(result) => {
                    if result.flags.uncalibrated {
                        flagged_uncalibrated += 1;
                    }
                    if decided {
                        let price_a = quote
                            .price(&outcome.competitor_a)
                            .map(american_to_decimal)
                            .transpose()?;
                        if let Some(price_a) = price_a {
                            blended.push(
                                &outcome.division,
                                result.blended.probability,
                                outcome.result == WIN,
                            );
                            favourite_prices.push(price_a);
                        }
                    }
                    if let Some(pick) = result.recommendation {
                        let side_result = if pick.competitor_id == outcome.competitor_a {
                            outcome.result
                        } else {
                            1.0 - outcome.result
                        };
                        bets.push((pick.recommendation, side_result));
                    }
                }
                Err(err) => warn!(bout = %outcome.bout_id, "matchup skipped: {err}"),
            }
        }

        if let Err(err) = engine.apply(&mut store, outcome, row.record.age_a, row.record.age_b) {
            warn!(bout = %outcome.bout_id, "bout rejected: {err}");
            rejected += 1;
        }
    }

    println!("Bouts: {} (rejected {rejected})", rows.len());
    println!("Competitors rated: {}", store.len());
    rated.report("Ratings");
    if !blended.preds.is_empty() {
        blended.report("Blended");
        println!("  uncalibrated matchups: {flagged_uncalibrated}");
        let flat = run_backtest(&blended.preds, &blended.outcomes, &favourite_prices);
        println!("Flat favourite ROI {:+.4} over {} bets", flat.roi, flat.bets);
    }
    let walk = simulate_bankroll(STARTING_BANKROLL, &bets);
    println!(
        "Kelly bankroll {:.2} -> {:.2}  bets {}  yield {:+.4}  max drawdown {:.3}",
        walk.starting,
        walk.ending,
        walk.bets,
        walk.yield_on_stake(),
        walk.max_drawdown
    );

    let snapshot = store.snapshot(&cfg.rating);
    if let Some(path) = parse_path_arg("--save-json") {
        JsonSnapshotStore::new(path.clone()).save(&snapshot)?;
        println!("Saved snapshot to {}", path.display());
    }
    if let Some(path) = parse_path_arg("--save-sqlite") {
        SqliteSnapshotStore::open(&path)?.save(&snapshot)?;
        println!("Saved snapshot to {}", path.display());
    }

    Ok(())
}

/// Decided bouts scored by one predictor, tagged with their division.
#[derive(Default)]
struct Scored {
    divisions: Vec<String>,
    preds: Vec<f64>,
    outcomes: Vec<bool>,
}

impl Scored {
    fn push(&mut self, division: &str, prob: f64, a_won: bool) {
        self.divisions.push(division.to_string());
        self.preds.push(prob);
        self.outcomes.push(a_won);
    }

    fn report(&self, label: &str) {
        let m = evaluate_probs(&self.preds, &self.outcomes);
        println!(
            "{label:<8} brier {:.4}  logloss {:.4}  acc {:.3}  ece {:.4}  n {}",
            m.brier,
            m.log_loss,
            m.accuracy,
            expected_calibration_error(&self.preds, &self.outcomes, CALIBRATION_BINS),
            m.samples
        );
        let params = BootstrapParams {
            bins: CALIBRATION_BINS,
            ..BootstrapParams::default()
        };
        for d in division_reports(&self.divisions, &self.preds, &self.outcomes, &params) {
            println!(
                "  {:<4} brier {:.4}  logloss {:.4}  ece {:.4} [{:.4}, {:.4}]  n {}",
                d.division,
                d.metrics.brier,
                d.metrics.log_loss,
                d.ece,
                d.ece_lower,
                d.ece_upper,
                d.metrics.samples
            );
        }
    }
}

fn load_rows(path: &Path) -> Result<Vec<HistoryRow>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read bouts {}", path.display()))?;
    let rows: Vec<HistoryRow> =
        serde_json::from_str(&raw).with_context(|| format!("parse bouts {}", path.display()))?;
    Ok(rows)
}

fn synthetic_rows() -> Result<Vec<HistoryRow>> {
    let params = HistoryParams {
        bouts: parse_usize_arg("--synthetic").unwrap_or(DEFAULT_SYNTHETIC_BOUTS),
        seed: parse_usize_arg("--seed").map(|s| s as u64).unwrap_or(7),
        ..HistoryParams::default()
    };
    let history = fake_history::generate(&params).context("generate synthetic history")?;
    info!(bouts = history.len(), seed = params.seed, "generated synthetic history");
    Ok(history
        .into_iter()
        .map(|b| HistoryRow {
            record: b.record,
            model_prob: Some(b.model_prob),
            quote: Some(b.quote),
        })
        .collect())
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(path) = arg.strip_prefix(&format!("{name}=")) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && let Ok(v) = raw.trim().parse::<usize>()
        {
            return Some(v);
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && let Ok(v) = next.trim().parse::<usize>()
        {
            return Some(v);
        }
    }
    None
}
