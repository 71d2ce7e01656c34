use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::bout::BoutRecord;
use crate::elo::RatingUpdateEngine;
use crate::error::CoreError;
use crate::rating_store::RatingStore;

#[derive(Debug, Clone, PartialEq)]
pub struct BoutRejection {
    /// Position in the input slice.
    pub index: usize,
    pub bout_id: String,
    pub error: CoreError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub applied: usize,
    pub rejected: Vec<BoutRejection>,
    pub age_fallbacks: usize,
    pub decays: usize,
    pub partitions: usize,
}

impl ReplayReport {
    fn merge(&mut self, other: ReplayReport) {
        self.applied += other.applied;
        self.rejected.extend(other.rejected);
        self.age_fallbacks += other.age_fallbacks;
        self.decays += other.decays;
    }
}

/// Bouts touching a connected set of competitors. Indices are ascending, so
/// replaying them in order keeps each competitor's history chronological.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub competitors: Vec<String>,
    pub bouts: Vec<usize>,
}

/// Applies `records` in the given order. Rejected bouts are skipped and reported.
pub fn replay_history(
    engine: &RatingUpdateEngine<'_>,
    store: &mut RatingStore,
    records: &[BoutRecord],
) -> ReplayReport {
    let report = replay_indices(engine, store, records, 0..records.len());
    info!(
        applied = report.applied,
        rejected = report.rejected.len(),
        competitors = store.len(),
        "replayed bout history"
    );
    report
}

/// Same result as [`replay_history`], with disjoint competitor groups replayed
/// on the rayon pool.
pub fn replay_partitioned(
    engine: &RatingUpdateEngine<'_>,
    store: &mut RatingStore,
    records: &[BoutRecord],
) -> ReplayReport {
    let (partitions, malformed) = partition_bouts(records);

    let base: &RatingStore = store;
    let results: Vec<(RatingStore, ReplayReport)> = partitions
        .par_iter()
        .map(|p| {
            let ids: HashSet<&str> = p.competitors.iter().map(String::as_str).collect();
            let mut local = base.subset(&ids);
            let report = replay_indices(engine, &mut local, records, p.bouts.iter().copied());
            (local, report)
        })
        .collect();

    let mut report = ReplayReport {
        partitions: partitions.len(),
        ..ReplayReport::default()
    };
    for index in malformed {
        if let Err(error) = records[index].outcome.validate() {
            report.rejected.push(rejection(records, index, error));
        }
    }
    for (local, partial) in results {
        store.absorb(local);
        report.merge(partial);
    }
    report.rejected.sort_by_key(|r| r.index);

    info!(
        applied = report.applied,
        rejected = report.rejected.len(),
        partitions = report.partitions,
        competitors = store.len(),
        "replayed bout history by partition"
    );
    report
}

/// Groups bouts into connected components of the competitor graph. Bouts that
/// fail validation are returned separately since they have no valid edge.
pub fn partition_bouts(records: &[BoutRecord]) -> (Vec<Partition>, Vec<usize>) {
    let mut ids: HashMap<&str, usize> = HashMap::new();
    let mut uf = UnionFind::default();
    let mut malformed = Vec::new();
    let mut edges = Vec::with_capacity(records.len());

    for (index, rec) in records.iter().enumerate() {
        if rec.outcome.validate().is_err() {
            malformed.push(index);
            continue;
        }
        let a = *ids
            .entry(rec.outcome.competitor_a.as_str())
            .or_insert_with(|| uf.push());
        let b = *ids
            .entry(rec.outcome.competitor_b.as_str())
            .or_insert_with(|| uf.push());
        uf.union(a, b);
        edges.push((index, a));
    }

    // Keyed by the first bout index of each component for a stable order.
    let mut roots: HashMap<usize, usize> = HashMap::new();
    let mut grouped: BTreeMap<usize, Partition> = BTreeMap::new();
    for (index, node) in edges {
        let root = uf.find(node);
        let key = *roots.entry(root).or_insert(index);
        grouped
            .entry(key)
            .or_insert_with(|| Partition {
                competitors: Vec::new(),
                bouts: Vec::new(),
            })
            .bouts
            .push(index);
    }

    let mut members: HashMap<usize, Vec<String>> = HashMap::new();
    for (id, node) in &ids {
        members
            .entry(uf.find(*node))
            .or_default()
            .push(id.to_string());
    }
    for (root, key) in roots {
        if let (Some(p), Some(mut names)) = (grouped.get_mut(&key), members.remove(&root)) {
            names.sort();
            p.competitors = names;
        }
    }

    (grouped.into_values().collect(), malformed)
}

fn replay_indices(
    engine: &RatingUpdateEngine<'_>,
    store: &mut RatingStore,
    records: &[BoutRecord],
    indices: impl Iterator<Item = usize>,
) -> ReplayReport {
    let mut report = ReplayReport {
        partitions: 1,
        ..ReplayReport::default()
    };
    for index in indices {
        let rec = &records[index];
        match engine.apply(store, &rec.outcome, rec.age_a, rec.age_b) {
            Ok(update) => {
                report.applied += 1;
                report.age_fallbacks += usize::from(update.age_fallback);
                report.decays += usize::from(update.decayed_a) + usize::from(update.decayed_b);
            }
            Err(error) => report.rejected.push(rejection(records, index, error)),
        }
    }
    report
}

fn rejection(records: &[BoutRecord], index: usize, error: CoreError) -> BoutRejection {
    warn!(bout = %records[index].outcome.bout_id, %error, "skipping bout");
    BoutRejection {
        index,
        bout_id: records[index].outcome.bout_id.clone(),
        error,
    }
}

#[derive(Default)]
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn push(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::partition_bouts;
    use crate::bout::{BoutOutcome, BoutRecord};

    fn rec(id: &str, a: &str, b: &str) -> BoutRecord {
        BoutRecord {
            outcome: BoutOutcome {
                bout_id: id.to_string(),
                competitor_a: a.to_string(),
                competitor_b: b.to_string(),
                division: "WW".to_string(),
                date: NaiveDate::from_ymd_opt(2023, 5, 1).expect("valid date"),
                result: 1.0,
            },
            age_a: 30.0,
            age_b: 30.0,
        }
    }

    #[test]
    fn disjoint_groups_form_separate_partitions() {
        let records = vec![
            rec("1", "a", "b"),
            rec("2", "c", "d"),
            rec("3", "b", "e"),
            rec("4", "x", "x"),
            rec("5", "d", "f"),
        ];
        let (parts, malformed) = partition_bouts(&records);
        assert_eq!(malformed, vec![3]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].bouts, vec![0, 2]);
        assert_eq!(parts[0].competitors, vec!["a", "b", "e"]);
        assert_eq!(parts[1].bouts, vec![1, 4]);
        assert_eq!(parts[1].competitors, vec!["c", "d", "f"]);
    }

    #[test]
    fn bridging_bout_merges_partitions() {
        let records = vec![rec("1", "a", "b"), rec("2", "c", "d"), rec("3", "b", "c")];
        let (parts, _) = partition_bouts(&records);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].bouts, vec![0, 1, 2]);
    }
}
