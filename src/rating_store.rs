use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RatingConfig;
use crate::error::{CoreError, CoreResult};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRating {
    pub competitor_id: String,
    pub ratings: Vec<f64>,
    pub uncertainties: Vec<f64>,
    pub last_updated: Option<NaiveDate>,
}

impl CompetitorRating {
    pub fn new_default(competitor_id: &str, cfg: &RatingConfig) -> Self {
        Self {
            competitor_id: competitor_id.to_string(),
            ratings: vec![cfg.default_rating; cfg.dimension()],
            uncertainties: vec![cfg.default_uncertainty; cfg.dimension()],
            last_updated: None,
        }
    }

    /// Weight-averaged uncertainty; plain mean when all weights are zero.
    pub fn weighted_uncertainty(&self, weights: &[f64]) -> f64 {
        let wsum: f64 = weights.iter().sum();
        if wsum <= 0.0 {
            let n = self.uncertainties.len().max(1) as f64;
            return self.uncertainties.iter().sum::<f64>() / n;
        }
        self.uncertainties
            .iter()
            .zip(weights)
            .map(|(u, w)| u * w)
            .sum::<f64>()
            / wsum
    }
}

/// Point-in-time copy of the store, handed to a `SnapshotStore` collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSnapshot {
    pub version: u32,
    pub components: Vec<String>,
    pub taken_at: DateTime<Utc>,
    pub ratings: BTreeMap<String, CompetitorRating>,
}

#[derive(Debug, Clone)]
pub struct RatingStore {
    dimension: usize,
    default_rating: f64,
    default_uncertainty: f64,
    ratings: HashMap<String, CompetitorRating>,
}

impl RatingStore {
    pub fn new(cfg: &RatingConfig) -> Self {
        Self {
            dimension: cfg.dimension(),
            default_rating: cfg.default_rating,
            default_uncertainty: cfg.default_uncertainty,
            ratings: HashMap::new(),
        }
    }

    pub fn from_snapshot(cfg: &RatingConfig, snapshot: RatingSnapshot) -> CoreResult<Self> {
        if snapshot.components != cfg.components {
            return Err(CoreError::InvalidConfig(format!(
                "snapshot components {:?} do not match configured {:?}",
                snapshot.components, cfg.components
            )));
        }
        let mut store = Self::new(cfg);
        for (id, rating) in snapshot.ratings {
            for len in [rating.ratings.len(), rating.uncertainties.len()] {
                if len != store.dimension {
                    return Err(CoreError::DimensionMismatch {
                        expected: store.dimension,
                        got: len,
                    });
                }
            }
            let mut rating = rating;
            for u in &mut rating.uncertainties {
                *u = u.max(cfg.uncertainty_floor);
            }
            rating.competitor_id = id.clone();
            store.ratings.insert(id, rating);
        }
        Ok(store)
    }

    pub fn snapshot(&self, cfg: &RatingConfig) -> RatingSnapshot {
        RatingSnapshot {
            version: SNAPSHOT_VERSION,
            components: cfg.components.clone(),
            taken_at: Utc::now(),
            ratings: self
                .ratings
                .iter()
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    pub fn contains(&self, competitor_id: &str) -> bool {
        self.ratings.contains_key(competitor_id)
    }

    pub fn get(&self, competitor_id: &str) -> Option<&CompetitorRating> {
        self.ratings.get(competitor_id)
    }

    /// Current rating, or the default vector for a competitor never seen.
    pub fn get_or_default(&self, competitor_id: &str) -> CompetitorRating {
        self.ratings
            .get(competitor_id)
            .cloned()
            .unwrap_or_else(|| self.default_for(competitor_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CompetitorRating)> {
        self.ratings.iter()
    }

    pub(crate) fn entry_or_init(&mut self, competitor_id: &str) -> &mut CompetitorRating {
        let (dim, rating, uncertainty) =
            (self.dimension, self.default_rating, self.default_uncertainty);
        self.ratings
            .entry(competitor_id.to_string())
            .or_insert_with(|| CompetitorRating {
                competitor_id: competitor_id.to_string(),
                ratings: vec![rating; dim],
                uncertainties: vec![uncertainty; dim],
                last_updated: None,
            })
    }

    /// Copies out the competitors in `ids` that already exist.
    pub(crate) fn subset(&self, ids: &HashSet<&str>) -> RatingStore {
        RatingStore {
            dimension: self.dimension,
            default_rating: self.default_rating,
            default_uncertainty: self.default_uncertainty,
            ratings: self
                .ratings
                .iter()
                .filter(|(id, _)| ids.contains(id.as_str()))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect(),
        }
    }

    /// Folds in a store that owns a disjoint set of competitors.
    pub(crate) fn absorb(&mut self, other: RatingStore) {
        self.ratings.extend(other.ratings);
    }

    fn default_for(&self, competitor_id: &str) -> CompetitorRating {
        CompetitorRating {
            competitor_id: competitor_id.to_string(),
            ratings: vec![self.default_rating; self.dimension],
            uncertainties: vec![self.default_uncertainty; self.dimension],
            last_updated: None,
        }
    }
}
