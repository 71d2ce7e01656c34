use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Monotone piecewise-linear probability map, as produced by an isotonic fit.
/// Inputs outside the knot range clip to the end values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMap", into = "RawMap")]
pub struct CalibrationMap {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawMap {
    knots: Vec<(f64, f64)>,
}

impl TryFrom<RawMap> for CalibrationMap {
    type Error = CoreError;

    fn try_from(raw: RawMap) -> CoreResult<Self> {
        CalibrationMap::new("<unnamed>", raw.knots)
    }
}

impl From<CalibrationMap> for RawMap {
    fn from(map: CalibrationMap) -> Self {
        RawMap {
            knots: map.xs.into_iter().zip(map.ys).collect(),
        }
    }
}

impl CalibrationMap {
    pub fn new(division: &str, knots: Vec<(f64, f64)>) -> CoreResult<Self> {
        let bad = |reason: &str| CoreError::InvalidCalibration {
            division: division.to_string(),
            reason: reason.to_string(),
        };
        if knots.is_empty() {
            return Err(bad("no knots"));
        }
        for (x, y) in &knots {
            if !(x.is_finite() && y.is_finite()) || !(0.0..=1.0).contains(x) || !(0.0..=1.0).contains(y) {
                return Err(bad("knots must lie in [0, 1]"));
            }
        }
        for pair in knots.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x1 <= x0 {
                return Err(bad("knot inputs must be strictly increasing"));
            }
            if y1 < y0 {
                return Err(bad("knot outputs must be non-decreasing"));
            }
        }
        let (xs, ys) = knots.into_iter().unzip();
        Ok(Self { xs, ys })
    }

    pub fn identity() -> Self {
        Self {
            xs: vec![0.0, 1.0],
            ys: vec![0.0, 1.0],
        }
    }

    pub fn apply(&self, p: f64) -> f64 {
        let n = self.xs.len();
        if p <= self.xs[0] {
            return self.ys[0];
        }
        if p >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        // First knot strictly above p; p is inside (xs[0], xs[n-1]).
        let i = self.xs.partition_point(|x| *x <= p);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        y0 + (p - x0) / (x1 - x0) * (y1 - y0)
    }

    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }
}

/// Versioned per-division maps, loaded once and shared read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub divisions: BTreeMap<String, CalibrationMap>,
}

impl CalibrationSet {
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read calibration maps {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse calibration maps {}", path.display()))
    }

    pub fn with_map(mut self, division: &str, map: CalibrationMap) -> Self {
        self.divisions.insert(division.to_string(), map);
        self
    }

    pub fn get(&self, division: &str) -> Option<&CalibrationMap> {
        self.divisions.get(division)
    }
}
