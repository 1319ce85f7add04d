use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::data::types::RankedList;
use crate::snapshot::chain::ChainError;

pub const MINUTE_FORMAT: &str = "%Y-%m-%d_%H%M";
pub const SECOND_FORMAT: &str = "%Y-%m-%d_%H%M%S";

pub const ARCHIVE_HREF: &str = "archive.html";
pub const LIVE_HREF: &str = "index.html";

fn snapshot_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^dashboard_(\d{4}-\d{2}-\d{2}_\d{4}(?:\d{2})?)\.html$")
            .expect("snapshot href pattern is valid")
    })
}

/// Timestamp key of a snapshot page: `YYYY-MM-DD_HHMM` or `YYYY-MM-DD_HHMMSS`.
///
/// Keys order by the instant they name. Two keys naming the same instant
/// collide even if written at different granularities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotKey {
    raw: String,
    instant: NaiveDateTime,
}

impl SnapshotKey {
    pub fn parse(raw: &str) -> Result<Self, ChainError> {
        let format = match raw.len() {
            15 => MINUTE_FORMAT,
            17 => SECOND_FORMAT,
            _ => return Err(ChainError::InvalidKey(raw.to_string())),
        };
        let instant = NaiveDateTime::parse_from_str(raw, format)
            .map_err(|_| ChainError::InvalidKey(raw.to_string()))?;
        Ok(Self {
            raw: raw.to_string(),
            instant,
        })
    }

    pub fn from_datetime(dt: DateTime<Utc>, with_seconds: bool) -> Self {
        let format = if with_seconds { SECOND_FORMAT } else { MINUTE_FORMAT };
        let raw = dt.format(format).to_string();
        // truncating to the key's granularity keeps `instant` consistent with `raw`
        let instant = NaiveDateTime::parse_from_str(&raw, format).unwrap_or(dt.naive_utc());
        Self { raw, instant }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    pub fn same_instant(&self, other: &SnapshotKey) -> bool {
        self.instant == other.instant
    }

    pub fn href(&self) -> String {
        format!("dashboard_{}.html", self.raw)
    }

    /// Key from a `dashboard_<key>.html` file name.
    pub fn from_href(href: &str) -> Option<Self> {
        let caps = snapshot_href_re().captures(href)?;
        Self::parse(&caps[1]).ok()
    }
}

impl Ord for SnapshotKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for SnapshotKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<String> for SnapshotKey {
    type Error = ChainError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<SnapshotKey> for String {
    fn from(key: SnapshotKey) -> Self {
        key.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavTarget {
    Snapshot(SnapshotKey),
    ArchiveRoot,
    LiveRoot,
}

impl NavTarget {
    pub fn href(&self) -> String {
        match self {
            NavTarget::Snapshot(key) => key.href(),
            NavTarget::ArchiveRoot => ARCHIVE_HREF.to_string(),
            NavTarget::LiveRoot => LIVE_HREF.to_string(),
        }
    }

    pub fn from_href(href: &str) -> Option<Self> {
        match href {
            ARCHIVE_HREF => Some(NavTarget::ArchiveRoot),
            LIVE_HREF => Some(NavTarget::LiveRoot),
            _ => SnapshotKey::from_href(href).map(NavTarget::Snapshot),
        }
    }
}

impl std::fmt::Display for NavTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.href())
    }
}

/// Back (older) / Forward (newer) navigation of one page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Links {
    pub older: Option<NavTarget>,
    pub newer: Option<NavTarget>,
}

impl Links {
    pub fn older_href(&self) -> Option<String> {
        self.older.as_ref().map(NavTarget::href)
    }

    pub fn newer_href(&self) -> Option<String> {
        self.newer.as_ref().map(NavTarget::href)
    }
}

/// The page whose navigation is being asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRef {
    Live,
    Archive,
    Snapshot(SnapshotKey),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenDescription {
    pub short: String,
    pub long: String,
    pub meta_source: Option<String>,
    pub long_source: Option<String>,
}

/// What the live page shows. Frozen verbatim into a snapshot on the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveContent {
    pub built_at: DateTime<Utc>,
    pub hot: RankedList,
    pub overlooked: RankedList,
    pub description: FrozenDescription,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPage {
    pub key: SnapshotKey,
    pub frozen_at: DateTime<Utc>,
    pub content: LiveContent,
    /// `None` until the first link rebuild after freezing.
    pub links: Option<Links>,
}
