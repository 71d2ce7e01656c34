use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const EFFECT_BOUND: f64 = 0.5;
const AGE_SCALE_YEARS: f64 = 5.0;

// Peak-age anchors per weight class, heaviest first.
const DEFAULT_ANCHORS: &[(&str, f64)] = &[
    ("HW", 33.0),
    ("LHW", 32.0),
    ("MW", 31.0),
    ("WW", 30.0),
    ("LW", 29.0),
    ("FW", 28.0),
    ("BW", 27.0),
    ("FLW", 26.0),
];

/// Quadratic age effect for one division, fitted offline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivisionAgeAnchor {
    pub anchor_age: f64,
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
}

impl DivisionAgeAnchor {
    pub fn effect(&self, age: f64) -> f64 {
        let x = (age - self.anchor_age) / AGE_SCALE_YEARS;
        (self.c0 + self.c1 * x + self.c2 * x * x).clamp(-EFFECT_BOUND, EFFECT_BOUND)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeEffect {
    pub value: f64,
    /// No anchor for the division; `value` is the flat global curve.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeCurveModel {
    #[serde(default)]
    pub version: String,
    pub global_anchor_age: f64,
    #[serde(default)]
    pub divisions: BTreeMap<String, DivisionAgeAnchor>,
}

impl Default for AgeCurveModel {
    fn default() -> Self {
        Self {
            version: "flat".to_string(),
            global_anchor_age: 30.0,
            divisions: BTreeMap::new(),
        }
    }
}

impl AgeCurveModel {
    /// Standard eight-division anchors with a mild concave curve around each peak.
    pub fn with_default_anchors() -> Self {
        let divisions = DEFAULT_ANCHORS
            .iter()
            .map(|(name, anchor)| {
                (
                    name.to_string(),
                    DivisionAgeAnchor {
                        anchor_age: *anchor,
                        c0: 0.0,
                        c1: 0.0,
                        c2: -0.05,
                    },
                )
            })
            .collect();
        Self {
            version: "default-anchors".to_string(),
            global_anchor_age: 30.0,
            divisions,
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read age curves {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse age curves {}", path.display()))
    }

    pub fn anchor(&self, division: &str) -> Option<&DivisionAgeAnchor> {
        self.divisions.get(division)
    }

    /// `phi_d(age)`. Unknown divisions fall back to the global anchor with zero
    /// curvature, which is identically zero.
    pub fn effect(&self, division: &str, age: f64) -> AgeEffect {
        match self.divisions.get(division) {
            Some(anchor) => AgeEffect {
                value: anchor.effect(age),
                fallback: false,
            },
            None => AgeEffect {
                value: DivisionAgeAnchor {
                    anchor_age: self.global_anchor_age,
                    c0: 0.0,
                    c1: 0.0,
                    c2: 0.0,
                }
                .effect(age),
                fallback: true,
            },
        }
    }
}
