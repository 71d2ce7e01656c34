pub mod age_curve;
pub mod backtest;
pub mod blend;
pub mod bout;
pub mod calibration;
pub mod config;
pub mod elo;
pub mod error;
pub mod fake_history;
pub mod matchup;
pub mod metrics;
pub mod odds;
pub mod persist;
pub mod rating_store;
pub mod replay;
pub mod selection;
pub mod snapshot_db;

pub use age_curve::AgeCurveModel;
pub use blend::{BlendedProbability, ProbabilityBlender};
pub use bout::{BoutOutcome, BoutRecord};
pub use calibration::{CalibrationMap, CalibrationSet};
pub use config::CoreConfig;
pub use elo::RatingUpdateEngine;
pub use error::{CoreError, CoreResult};
pub use matchup::{MatchupInput, MatchupResult, evaluate_matchup};
pub use odds::{NormalizedOdds, OddsQuote, normalize};
pub use persist::{JsonSnapshotStore, SnapshotStore};
pub use rating_store::{CompetitorRating, RatingSnapshot, RatingStore};
pub use replay::{ReplayReport, replay_history, replay_partitioned};
pub use selection::{Recommendation, select};
pub use snapshot_db::SqliteSnapshotStore;
