use chrono::NaiveDate;

use fight_edge::age_curve::AgeCurveModel;
use fight_edge::bout::{BoutOutcome, BoutRecord, WIN};
use fight_edge::config::CoreConfig;
use fight_edge::elo::RatingUpdateEngine;
use fight_edge::fake_history::{self, HistoryParams};
use fight_edge::rating_store::RatingStore;
use fight_edge::replay::{partition_bouts, replay_history, replay_partitioned};

fn synthetic_records(divisions: usize) -> Vec<BoutRecord> {
    fake_history::generate(&HistoryParams {
        competitors: 80,
        bouts: 600,
        divisions,
        ..HistoryParams::default()
    })
    .expect("synthetic history")
    .into_iter()
    .map(|b| b.record)
    .collect()
}

fn assert_same_ratings(left: &RatingStore, right: &RatingStore) {
    assert_eq!(left.len(), right.len());
    for (id, l) in left.iter() {
        let r = right.get(id).expect("competitor present in both stores");
        assert_eq!(l, r, "{id}");
    }
}

#[test]
fn replay_is_deterministic() {
    let cfg = CoreConfig::default();
    let curves = AgeCurveModel::with_default_anchors();
    let engine = RatingUpdateEngine::new(&cfg.rating, &curves).expect("valid config");
    let records = synthetic_records(4);

    let mut first = RatingStore::new(&cfg.rating);
    let mut second = RatingStore::new(&cfg.rating);
    let r1 = replay_history(&engine, &mut first, &records);
    let r2 = replay_history(&engine, &mut second, &records);

    assert_eq!(r1, r2);
    assert_eq!(r1.applied, records.len());
    assert_same_ratings(&first, &second);
}

#[test]
fn partitioned_replay_matches_sequential() {
    let cfg = CoreConfig::default();
    let curves = AgeCurveModel::with_default_anchors();
    let engine = RatingUpdateEngine::new(&cfg.rating, &curves).expect("valid config");
    let records = synthetic_records(6);

    let (partitions, malformed) = partition_bouts(&records);
    assert!(partitions.len() >= 6);
    assert!(malformed.is_empty());

    let mut sequential = RatingStore::new(&cfg.rating);
    let mut parallel = RatingStore::new(&cfg.rating);
    let seq = replay_history(&engine, &mut sequential, &records);
    let par = replay_partitioned(&engine, &mut parallel, &records);

    assert_eq!(seq.applied, par.applied);
    assert_eq!(seq.decays, par.decays);
    assert_eq!(seq.age_fallbacks, par.age_fallbacks);
    assert_eq!(par.partitions, partitions.len());
    assert_same_ratings(&sequential, &parallel);
}

#[test]
fn bad_bouts_are_reported_and_skipped_in_both_modes() {
    let cfg = CoreConfig::default();
    let curves = AgeCurveModel::default();
    let engine = RatingUpdateEngine::new(&cfg.rating, &curves).expect("valid config");
    let day = |d: u32| NaiveDate::from_ymd_opt(2022, 3, d).expect("valid date");
    let bout = |id: &str, a: &str, b: &str, on: NaiveDate| BoutRecord {
        outcome: BoutOutcome {
            bout_id: id.to_string(),
            competitor_a: a.to_string(),
            competitor_b: b.to_string(),
            division: "LW".to_string(),
            date: on,
            result: WIN,
        },
        age_a: 29.0,
        age_b: 31.0,
    };
    let records = vec![
        bout("1", "a", "b", day(10)),
        bout("2", "a", "a", day(11)),
        bout("3", "c", "d", day(12)),
        bout("4", "b", "a", day(5)),
        bout("5", "d", "e", day(20)),
    ];

    let mut sequential = RatingStore::new(&cfg.rating);
    let seq = replay_history(&engine, &mut sequential, &records);
    let mut parallel = RatingStore::new(&cfg.rating);
    let par = replay_partitioned(&engine, &mut parallel, &records);

    let seq_idx: Vec<usize> = seq.rejected.iter().map(|r| r.index).collect();
    let par_idx: Vec<usize> = par.rejected.iter().map(|r| r.index).collect();
    assert_eq!(seq_idx, vec![1, 3]);
    assert_eq!(par_idx, seq_idx);
    assert_eq!(seq.applied, 3);
    assert_eq!(par.applied, 3);
    assert_same_ratings(&sequential, &parallel);
}
