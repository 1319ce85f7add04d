//! Loosely-typed market rows as written by the fetch step.
//!
//! Numeric cells may be numbers, numeric strings, blanks, or a dash placeholder.
//! Anything that does not parse becomes `None`; nothing here is an error except
//! an unreadable file or a document that is not an array of objects.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::data::types::{sanitize_finite, sanitize_volume, MarketRecord, RankedList};

const PLACEHOLDERS: &[&str] = &["", "—", "-", "null", "None"];

pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if PLACEHOLDERS.contains(&s) {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !PLACEHOLDERS.contains(&s.trim()) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_f64(row: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| coerce_f64(row.get(*k)))
}

pub fn record_from_row(row: &Map<String, Value>) -> MarketRecord {
    MarketRecord {
        id: coerce_string(row.get("id")),
        slug: coerce_string(row.get("slug")),
        url: coerce_string(row.get("url")),
        question: coerce_string(row.get("question")),
        category: coerce_string(row.get("category")),
        volume_lifetime: sanitize_volume(first_f64(row, &["volume", "volumeNum"])),
        volume_24h: sanitize_volume(first_f64(row, &["volume24h", "vol24h"])),
        avg_spread: sanitize_finite(first_f64(row, &["avgSpread"])),
        underround: sanitize_finite(first_f64(row, &["underround"])),
        near50_flag: match first_f64(row, &["near50Flag"]) {
            Some(v) if v >= 1.0 => 1,
            _ => 0,
        },
        time_to_resolve_days: sanitize_finite(first_f64(row, &["timeToResolveDays"])),
        end_date_iso: coerce_string(row.get("endDateISO")),
    }
}

pub fn record_to_row(record: &MarketRecord) -> Value {
    json!({
        "id": record.id,
        "slug": record.slug,
        "url": record.url,
        "question": record.question,
        "category": record.category,
        "why": record.why(),
        "volume": record.volume_lifetime,
        "volume24h": record.volume_24h,
        "avgSpread": record.avg_spread,
        "underround": record.underround,
        "near50Flag": record.near50_flag,
        "timeToResolveDays": record.time_to_resolve_days,
        "endDateISO": record.end_date_iso,
    })
}

pub fn parse_records(contents: &str) -> Result<Vec<MarketRecord>> {
    let rows: Vec<Map<String, Value>> =
        serde_json::from_str(contents).context("Market rows must be a JSON array of objects")?;
    Ok(rows.iter().map(record_from_row).collect())
}

pub fn load_records(path: &Path) -> Result<Vec<MarketRecord>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read market rows: {}", path.display()))?;
    parse_records(&contents)
        .with_context(|| format!("Failed to parse market rows: {}", path.display()))
}

pub fn save_records(path: &Path, records: &[MarketRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rows: Vec<Value> = records.iter().map(record_to_row).collect();
    let body = serde_json::to_string_pretty(&rows)?;
    fs::write(path, body)
        .with_context(|| format!("Failed to write market rows: {}", path.display()))?;
    Ok(())
}

/// Hot rows then Overlooked rows, each carrying its `bucket` and 1-based `rank`.
pub fn ranked_rows(hot: &RankedList, overlooked: &RankedList) -> Vec<Value> {
    [hot, overlooked]
        .into_iter()
        .flat_map(|list| {
            list.entries.iter().map(move |entry| {
                let mut row = record_to_row(&entry.record);
                if let Value::Object(map) = &mut row {
                    map.insert("bucket".to_string(), json!(list.bucket));
                    map.insert("rank".to_string(), json!(entry.rank));
                    map.insert("score".to_string(), json!(entry.score));
                }
                row
            })
        })
        .collect()
}

pub fn save_ranked(path: &Path, hot: &RankedList, overlooked: &RankedList) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(&ranked_rows(hot, overlooked))?;
    fs::write(path, body)
        .with_context(|| format!("Failed to write ranked lists: {}", path.display()))?;
    Ok(())
}
