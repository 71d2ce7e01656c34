use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const WIN: f64 = 1.0;
pub const DRAW: f64 = 0.5;
pub const LOSS: f64 = 0.0;

/// A recorded bout. `result` is from side A's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoutOutcome {
    pub bout_id: String,
    pub competitor_a: String,
    pub competitor_b: String,
    pub division: String,
    pub date: NaiveDate,
    pub result: f64,
}

impl BoutOutcome {
    pub fn validate(&self) -> CoreResult<()> {
        if self.competitor_a.trim().is_empty() || self.competitor_b.trim().is_empty() {
            return Err(self.reject("missing competitor id"));
        }
        if self.competitor_a == self.competitor_b {
            return Err(self.reject("both sides reference the same competitor"));
        }
        if ![LOSS, DRAW, WIN].contains(&self.result) {
            return Err(self.reject(format!("result {} is not one of 0, 0.5, 1", self.result)));
        }
        Ok(())
    }

    pub fn involves(&self, competitor_id: &str) -> bool {
        self.competitor_a == competitor_id || self.competitor_b == competitor_id
    }

    pub(crate) fn reject(&self, reason: impl Into<String>) -> CoreError {
        CoreError::InvalidBout {
            bout_id: self.bout_id.clone(),
            reason: reason.into(),
        }
    }
}

/// Ingestion row: a bout plus each competitor's age on the night.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoutRecord {
    #[serde(flatten)]
    pub outcome: BoutOutcome,
    pub age_a: f64,
    pub age_b: f64,
}

/// Stable chronological order; same-day bouts fall back to bout id.
pub fn sort_chronologically(records: &mut [BoutRecord]) {
    records.sort_by(|a, b| {
        a.outcome
            .date
            .cmp(&b.outcome.date)
            .then_with(|| a.outcome.bout_id.cmp(&b.outcome.bout_id))
    });
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{BoutOutcome, BoutRecord, sort_chronologically};

    fn bout(id: &str, a: &str, b: &str, result: f64, day: u32) -> BoutOutcome {
        BoutOutcome {
            bout_id: id.to_string(),
            competitor_a: a.to_string(),
            competitor_b: b.to_string(),
            division: "LW".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).expect("valid date"),
            result,
        }
    }

    #[test]
    fn same_competitor_twice_is_invalid() {
        assert!(bout("b1", "x", "x", 1.0, 1).validate().is_err());
    }

    #[test]
    fn fractional_result_other_than_draw_is_invalid() {
        assert!(bout("b1", "x", "y", 0.7, 1).validate().is_err());
        assert!(bout("b1", "x", "y", 0.5, 1).validate().is_ok());
    }

    #[test]
    fn sorting_orders_by_date_then_id() {
        let mut rows: Vec<BoutRecord> = [("c", 3), ("b", 1), ("a", 1)]
            .iter()
            .map(|(id, day)| BoutRecord {
                outcome: bout(id, "x", "y", 1.0, *day),
                age_a: 30.0,
                age_b: 30.0,
            })
            .collect();
        sort_chronologically(&mut rows);
        let ids: Vec<&str> = rows.iter().map(|r| r.outcome.bout_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn record_json_is_flat() {
        let raw = r#"{"bout_id":"b1","competitor_a":"x","competitor_b":"y","division":"LW",
            "date":"2024-03-02","result":1.0,"age_a":29.5,"age_b":31.0}"#;
        let rec: BoutRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(rec.outcome.competitor_b, "y");
        assert!((rec.age_a - 29.5).abs() < 1e-12);
    }
}
