use std::collections::HashSet;

use tracing::debug;

use crate::config::OverlookedWeights;
use crate::data::types::{Bucket, MarketRecord, RankedList};
use crate::ranking::{candidates, into_ranked_list, score_or_floor, sort_by_score_desc, urgency};

/// More negative underround earns a larger bonus, clamped to the configured range.
pub fn underround_bonus(underround: Option<f64>, w: &OverlookedWeights) -> f64 {
    match underround {
        Some(u) => {
            (-w.underround_factor * u).clamp(w.underround_bonus_min, w.underround_bonus_max)
        }
        None => 0.0,
    }
}

pub fn in_volume_band(record: &MarketRecord, w: &OverlookedWeights) -> bool {
    let volume = record.effective_volume();
    volume >= w.volume_lower && volume <= w.volume_upper
}

pub fn volume_band_penalty(record: &MarketRecord, w: &OverlookedWeights) -> f64 {
    let volume = record.effective_volume();
    if volume > w.volume_upper {
        w.high_volume_penalty
    } else if volume < w.volume_lower {
        w.low_volume_penalty
    } else {
        0.0
    }
}

pub fn overlooked_score(record: &MarketRecord, w: &OverlookedWeights) -> f64 {
    let near50 = if record.is_near50() { w.near50_weight } else { 0.0 };
    near50
        + underround_bonus(record.underround, w)
        + w.urgency_weight * urgency(record.ttr_days(), w.urgency_horizon_days)
        - volume_band_penalty(record, w)
}

/// Top `limit` non-Hot records by [`overlooked_score`].
///
/// The pool is the moderate-volume candidates. When fewer than `limit` of them
/// exist it widens to every non-Hot candidate, ranked together by score, so the
/// result holds `min(limit, non-Hot candidates)` entries.
pub fn select_overlooked(
    records: &[MarketRecord],
    hot: &RankedList,
    weights: &OverlookedWeights,
    limit: usize,
) -> RankedList {
    let excluded: HashSet<&str> = hot.identities().collect();

    let scored: Vec<_> = candidates(records)
        .into_iter()
        .filter(|c| !excluded.contains(c.identity.as_str()))
        .map(|c| (score_or_floor(overlooked_score(c.record, weights)), c))
        .collect();

    let in_band = scored
        .iter()
        .filter(|(_, c)| in_volume_band(c.record, weights))
        .count();
    let mut pool: Vec<_> = if in_band >= limit {
        scored
            .into_iter()
            .filter(|(_, c)| in_volume_band(c.record, weights))
            .collect()
    } else {
        if in_band < scored.len() {
            debug!(
                "Only {} moderate-volume candidates, widening pool to {}",
                in_band,
                scored.len()
            );
        }
        scored
    };

    sort_by_score_desc(&mut pool);
    into_ranked_list(Bucket::Overlooked, pool, limit)
}
