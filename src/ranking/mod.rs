//! Hot / Overlooked selection over one run's market records.
//!
//! Both selections are pure and deterministic: scores are computed per record,
//! sorted descending with a stable sort (exact ties keep fetch order) and
//! truncated to the configured limit.

pub mod hot;
pub mod overlooked;

use std::collections::HashSet;

use tracing::debug;

use crate::config::RankingConfig;
use crate::data::types::{Bucket, MarketRecord, RankedEntry, RankedList};

pub use hot::select_hot;
pub use overlooked::select_overlooked;

/// A record paired with the identity it carries for this run.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    pub identity: String,
    pub record: &'a MarketRecord,
}

pub(crate) fn candidates(records: &[MarketRecord]) -> Vec<Candidate<'_>> {
    records
        .iter()
        .enumerate()
        .map(|(position, record)| Candidate {
            identity: record.identity_or(position),
            record,
        })
        .collect()
}

/// `1/(1 + ttr/horizon)`. Already-ended markets count as resolving now.
pub(crate) fn urgency(ttr_days: f64, horizon_days: f64) -> f64 {
    let horizon = if horizon_days > 0.0 { horizon_days } else { 1.0 };
    1.0 / (1.0 + ttr_days.max(0.0) / horizon)
}

/// NaN scores sink to the bottom instead of poisoning the sort.
pub(crate) fn score_or_floor(score: f64) -> f64 {
    if score.is_nan() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// Stable descending sort by score.
pub(crate) fn sort_by_score_desc(scored: &mut [(f64, Candidate<'_>)]) {
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
}

pub(crate) fn into_ranked_list<'a>(
    bucket: Bucket,
    scored: impl IntoIterator<Item = (f64, Candidate<'a>)>,
    limit: usize,
) -> RankedList {
    let entries = scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (score, c))| RankedEntry {
            rank: i + 1,
            identity: c.identity,
            score,
            record: c.record.clone(),
        })
        .collect();
    RankedList { bucket, entries }
}

/// Drops later records whose identity was already seen. Records without any
/// identity field are never treated as duplicates.
pub fn dedup_by_identity(records: &[MarketRecord]) -> Vec<MarketRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| match r.identity() {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .cloned()
        .collect()
}

pub struct RankingEngine {
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }

    /// Computes `(hot, overlooked)` for one run.
    pub fn rank(&self, records: &[MarketRecord]) -> (RankedList, RankedList) {
        let unique = dedup_by_identity(records);
        if unique.len() < records.len() {
            debug!(
                "Dropped {} duplicate records before ranking",
                records.len() - unique.len()
            );
        }

        let hot = select_hot(&unique, &self.config.hot, self.config.limit);
        let overlooked =
            select_overlooked(&unique, &hot, &self.config.overlooked, self.config.limit);
        (hot, overlooked)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::market;
    use super::*;

    fn synthetic(n: usize) -> Vec<MarketRecord> {
        (0..n)
            .map(|i| {
                let mut m = market(
                    &format!("m{i}"),
                    ((i * 7919) % 250_000) as f64,
                    Some(((i * 31) % 17) as f64 / 100.0),
                    Some(((i * 13) % 90) as f64),
                );
                m.near50_flag = (i % 3 == 0) as u8;
                m.underround = Some(((i % 11) as f64 - 5.0) / 100.0);
                m
            })
            .collect()
    }

    #[test]
    fn test_urgency_shape() {
        assert!((urgency(0.0, 30.0) - 1.0).abs() < 1e-12);
        assert!((urgency(30.0, 30.0) - 0.5).abs() < 1e-12);
        assert!((urgency(-4.0, 30.0) - 1.0).abs() < 1e-12);
        assert!(urgency(9e9, 30.0) < 1e-6);
    }

    #[test]
    fn test_lists_bounded_and_disjoint() {
        let engine = RankingEngine::new(RankingConfig::default());
        for n in [0, 1, 5, 12, 13, 24, 25, 200] {
            let records = synthetic(n);
            let (hot, overlooked) = engine.rank(&records);
            assert!(hot.len() <= 12);
            assert!(overlooked.len() <= 12);
            assert_eq!(hot.len(), n.min(12));
            assert_eq!(overlooked.len(), n.saturating_sub(12).min(12));
            for id in overlooked.identities() {
                assert!(!hot.contains(id), "{id} in both lists (n={n})");
            }
        }
    }

    #[test]
    fn test_rank_is_deterministic() {
        let engine = RankingEngine::new(RankingConfig::default());
        let records = synthetic(80);
        let first = engine.rank(&records);
        let second = engine.rank(&records);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_gives_empty_lists() {
        let engine = RankingEngine::new(RankingConfig::default());
        let (hot, overlooked) = engine.rank(&[]);
        assert!(hot.is_empty());
        assert!(overlooked.is_empty());
        assert_eq!(hot.bucket, Bucket::Hot);
        assert_eq!(overlooked.bucket, Bucket::Overlooked);
    }

    #[test]
    fn test_duplicate_identity_ranked_once() {
        let engine = RankingEngine::new(RankingConfig::default());
        let records = vec![
            market("dup", 50_000.0, Some(0.01), Some(3.0)),
            market("dup", 50_000.0, Some(0.01), Some(3.0)),
            market("other", 10.0, None, None),
        ];
        let (hot, overlooked) = engine.rank(&records);
        assert_eq!(hot.len(), 2);
        assert!(overlooked.is_empty());
    }

    #[test]
    fn test_records_without_identity_stay_distinct() {
        let anonymous = MarketRecord {
            volume_24h: Some(10.0),
            ..Default::default()
        };
        let records = vec![anonymous.clone(), anonymous];
        assert_eq!(dedup_by_identity(&records).len(), 2);

        let engine = RankingEngine::new(RankingConfig::default());
        let (hot, _) = engine.rank(&records);
        let ids: Vec<&str> = hot.identities().collect();
        assert_eq!(ids, vec!["row:0", "row:1"]);
    }
}
