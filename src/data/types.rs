use serde::{Deserialize, Serialize};

/// Time-to-resolve used when a market has no end date. Large enough that the
/// urgency component is effectively zero.
pub const TTR_SENTINEL_DAYS: f64 = 9e9;

/// Binary midpoint band that counts as "near 50%".
pub const NEAR50_LOW: f64 = 0.40;
pub const NEAR50_HIGH: f64 = 0.60;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub url: Option<String>,
    pub question: Option<String>,
    pub category: Option<String>,
    pub volume_lifetime: Option<f64>,
    pub volume_24h: Option<f64>,
    pub avg_spread: Option<f64>,
    pub underround: Option<f64>,
    pub near50_flag: u8,
    pub time_to_resolve_days: Option<f64>,
    pub end_date_iso: Option<String>,
}

impl MarketRecord {
    /// Stable key: id, then slug, then url, then question.
    pub fn identity(&self) -> Option<&str> {
        first_non_empty(&[
            self.id.as_deref(),
            self.slug.as_deref(),
            self.url.as_deref(),
            self.question.as_deref(),
        ])
    }

    /// Identity, or an opaque per-run key derived from the fetch position.
    pub fn identity_or(&self, position: usize) -> String {
        match self.identity() {
            Some(id) => id.to_string(),
            None => format!("row:{position}"),
        }
    }

    /// 24h volume, falling back to lifetime volume, then zero.
    pub fn effective_volume(&self) -> f64 {
        self.volume_24h
            .or(self.volume_lifetime)
            .unwrap_or(0.0)
    }

    pub fn ttr_days(&self) -> f64 {
        self.time_to_resolve_days.unwrap_or(TTR_SENTINEL_DAYS)
    }

    pub fn is_near50(&self) -> bool {
        self.near50_flag >= 1
    }

    /// One-line reason shown next to a market, e.g.
    /// `24h $45,000 • spread 0.020 • TTR 10.0d • ~50% mid`.
    pub fn why(&self) -> String {
        let mut bits = Vec::new();
        if let Some(v24) = self.volume_24h.filter(|v| *v > 0.0) {
            bits.push(format!("24h ${}", thousands(v24.trunc() as u64)));
        }
        if let Some(spread) = self.avg_spread {
            bits.push(format!("spread {:.3}", spread));
        }
        if let Some(ttr) = self.time_to_resolve_days {
            bits.push(format!("TTR {:.1}d", ttr));
        }
        if self.is_near50() {
            bits.push("~50% mid".to_string());
        }
        bits.join(" • ")
    }
}

fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// First candidate that is present and not blank.
pub fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

pub fn near50_flag(midpoint: Option<f64>) -> u8 {
    match midpoint {
        Some(mid) if (NEAR50_LOW..=NEAR50_HIGH).contains(&mid) => 1,
        _ => 0,
    }
}

/// Volumes must be finite and nonnegative.
pub fn sanitize_volume(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x >= 0.0)
}

pub fn sanitize_finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bucket {
    Hot,
    Overlooked,
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bucket::Hot => write!(f, "HOT"),
            Bucket::Overlooked => write!(f, "OVERLOOKED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// 1-based.
    pub rank: usize,
    pub identity: String,
    pub score: f64,
    pub record: MarketRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedList {
    pub bucket: Bucket,
    pub entries: Vec<RankedEntry>,
}

impl RankedEntry {
    pub fn why(&self) -> String {
        self.record.why()
    }
}

impl RankedList {
    pub fn empty(bucket: Bucket) -> Self {
        Self {
            bucket,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identity.as_str())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities().any(|id| id == identity)
    }
}
