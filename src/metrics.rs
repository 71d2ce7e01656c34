use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// Binary scoring of `P(A wins)` against outcomes (`true` = A won).
pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;
    for (p, won) in predictions.iter().zip(outcomes) {
        let y = if *won { 1.0 } else { 0.0 };
        brier_sum += (p - y).powi(2);
        let actual_prob = (if *won { *p } else { 1.0 - p }).clamp(1e-12, 1.0);
        log_loss_sum += -actual_prob.ln();
        if (*p >= 0.5) == *won {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

pub fn calibration_bins(predictions: &[f64], outcomes: &[bool], bins: usize) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *won {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Count-weighted gap between predicted and observed rates across bins.
pub fn expected_calibration_error(predictions: &[f64], outcomes: &[bool], bins: usize) -> f64 {
    let total = predictions.len().min(outcomes.len());
    if total == 0 {
        return 0.0;
    }
    calibration_bins(predictions, outcomes, bins)
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| (b.actual_rate - b.avg_pred).abs() * b.count as f64 / total as f64)
        .sum()
}

/// Scores and ECE for one division, with a bootstrap interval on the ECE.
#[derive(Debug, Clone, PartialEq)]
pub struct DivisionReport {
    pub division: String,
    pub metrics: Metrics,
    pub ece: f64,
    /// 5th percentile of the bootstrapped ECE.
    pub ece_lower: f64,
    /// 95th percentile of the bootstrapped ECE.
    pub ece_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapParams {
    pub bins: usize,
    pub samples: usize,
    pub seed: u64,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            bins: 10,
            samples: 200,
            seed: 42,
        }
    }
}

/// Groups predictions by division and scores each group, ordered by division name.
/// Divisions with a single sample get a degenerate interval at their ECE.
pub fn division_reports(
    divisions: &[String],
    predictions: &[f64],
    outcomes: &[bool],
    params: &BootstrapParams,
) -> Vec<DivisionReport> {
    if divisions.len() != predictions.len() || predictions.len() != outcomes.len() {
        return Vec::new();
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, division) in divisions.iter().enumerate() {
        groups.entry(division.as_str()).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    groups
        .into_iter()
        .map(|(division, idx)| {
            let preds: Vec<f64> = idx.iter().map(|&i| predictions[i]).collect();
            let won: Vec<bool> = idx.iter().map(|&i| outcomes[i]).collect();
            let ece = expected_calibration_error(&preds, &won, params.bins);

            let (ece_lower, ece_upper) = if preds.len() > 1 && params.samples > 0 {
                let mut boot: Vec<f64> = (0..params.samples)
                    .map(|_| {
                        let (bp, bw): (Vec<f64>, Vec<bool>) = (0..preds.len())
                            .map(|_| {
                                let j = rng.gen_range(0..preds.len());
                                (preds[j], won[j])
                            })
                            .unzip();
                        expected_calibration_error(&bp, &bw, params.bins)
                    })
                    .collect();
                boot.sort_by(|a, b| a.total_cmp(b));
                (quantile(&boot, 0.05), quantile(&boot, 0.95))
            } else {
                (ece, ece)
            };

            DivisionReport {
                division: division.to_string(),
                metrics: evaluate_probs(&preds, &won),
                ece,
                ece_lower,
                ece_upper,
            }
        })
        .collect()
}

/// Linear interpolation between order statistics of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BootstrapParams, calibration_bins, division_reports, evaluate_probs,
        expected_calibration_error, quantile,
    };

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let m = evaluate_probs(&[1.0, 0.0, 1.0], &[true, false, true]);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
        assert!((m.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn coin_flip_log_loss_is_ln2() {
        let m = evaluate_probs(&[0.5, 0.5], &[true, false]);
        assert!((m.log_loss - std::f64::consts::LN_2).abs() < 1e-12);
        assert!((m.brier - 0.25).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_score_nothing() {
        assert_eq!(evaluate_probs(&[0.5], &[]).samples, 0);
    }

    #[test]
    fn bins_cover_unit_interval() {
        let bins = calibration_bins(&[0.05, 0.95, 1.0], &[false, true, true], 10);
        assert_eq!(bins.len(), 10);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[9].count, 2);
        assert!((bins[9].actual_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ece_of_calibrated_bucket_is_zero() {
        let preds = [0.25, 0.25, 0.25, 0.25];
        let outcomes = [true, false, false, false];
        assert!(expected_calibration_error(&preds, &outcomes, 10) < 1e-12);
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reports_are_grouped_by_division() {
        let divisions = labels(&["LW", "HW", "LW", "LW", "HW", "LW"]);
        let preds = [0.25, 0.9, 0.25, 0.25, 0.1, 0.25];
        let won = [true, true, false, false, false, false];
        let reports = division_reports(&divisions, &preds, &won, &BootstrapParams::default());

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].division, "HW");
        assert_eq!(reports[0].metrics.samples, 2);
        assert!((reports[0].metrics.accuracy - 1.0).abs() < 1e-12);
        assert_eq!(reports[1].division, "LW");
        assert_eq!(reports[1].metrics.samples, 4);
        assert!(reports[1].ece < 1e-12);
        for r in &reports {
            assert!(0.0 <= r.ece_lower && r.ece_lower <= r.ece_upper && r.ece_upper <= 1.0);
        }
    }

    #[test]
    fn single_bout_division_has_degenerate_interval() {
        let reports = division_reports(
            &labels(&["FLW"]),
            &[0.7],
            &[false],
            &BootstrapParams::default(),
        );
        assert_eq!(reports.len(), 1);
        assert!((reports[0].ece - 0.7).abs() < 1e-12);
        assert_eq!(reports[0].ece_lower, reports[0].ece);
        assert_eq!(reports[0].ece_upper, reports[0].ece);
    }

    #[test]
    fn bootstrap_is_seeded() {
        let divisions = labels(&["MW"; 40]);
        let preds: Vec<f64> = (0..40).map(|i| 0.3 + 0.01 * i as f64).collect();
        let won: Vec<bool> = (0..40).map(|i| i % 3 == 0).collect();
        let params = BootstrapParams::default();
        let first = division_reports(&divisions, &preds, &won, &params);
        let second = division_reports(&divisions, &preds, &won, &params);
        assert_eq!(first, second);
        assert!(first[0].ece_upper > first[0].ece_lower);
    }

    #[test]
    fn mismatched_inputs_report_nothing() {
        let reports = division_reports(
            &labels(&["LW"]),
            &[0.5, 0.5],
            &[true, false],
            &BootstrapParams::default(),
        );
        assert!(reports.is_empty());
    }

    #[test]
    fn quantile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0];
        assert!((quantile(&sorted, 0.5) - 1.5).abs() < 1e-12);
        assert_eq!(quantile(&sorted, 0.0), 0.0);
        assert_eq!(quantile(&sorted, 1.0), 3.0);
    }
}
