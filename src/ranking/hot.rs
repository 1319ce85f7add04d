use crate::config::HotWeights;
use crate::data::types::{Bucket, MarketRecord, RankedList};
use crate::ranking::{candidates, into_ranked_list, score_or_floor, sort_by_score_desc, urgency};

/// Composite hot score: recent activity, tight pricing, near-term resolution.
pub fn hot_score(record: &MarketRecord, w: &HotWeights) -> f64 {
    let volume = record.effective_volume().max(0.0);
    let spread_component = match record.avg_spread {
        Some(spread) if spread >= 0.0 => 1.0 / (1.0 + w.spread_scale * spread),
        _ => w.missing_spread_component,
    };

    w.volume_weight * volume.ln_1p()
        + w.spread_weight * spread_component
        + w.urgency_weight * urgency(record.ttr_days(), w.urgency_horizon_days)
}

/// Top `limit` records by [`hot_score`]. Exact ties keep fetch order.
pub fn select_hot(records: &[MarketRecord], weights: &HotWeights, limit: usize) -> RankedList {
    let mut scored: Vec<_> = candidates(records)
        .into_iter()
        .map(|c| (score_or_floor(hot_score(c.record, weights)), c))
        .collect();
    sort_by_score_desc(&mut scored);
    into_ranked_list(Bucket::Hot, scored, limit)
}
