//! Ordered, append-only chain of snapshot keys and the navigation between them.
//!
//! ```text
//! ArchiveRoot <-> k0 <-> k1 <-> ... <-> kN <-> LiveRoot
//! ```
//!
//! Links are always derived from the key order, never patched in place.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::snapshot::types::{Links, NavTarget, PageRef, SnapshotKey};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Snapshot {0} already exists")]
    Conflict(SnapshotKey),

    #[error("Snapshot {new} is older than chain tail {tail}")]
    OutOfOrder { new: SnapshotKey, tail: SnapshotKey },

    #[error("Unknown snapshot {0}")]
    UnknownKey(SnapshotKey),

    #[error("Chain integrity error: {0}")]
    Integrity(IntegrityFault),

    #[error("Invalid snapshot key '{0}'")]
    InvalidKey(String),

    #[error("Snapshot storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    /// Two stored keys name the same instant.
    DuplicateInstant { first: SnapshotKey, second: SnapshotKey },
    /// Stored navigation of a member disagrees with the key order.
    StaleLinks {
        key: SnapshotKey,
        stored_older: Option<String>,
        stored_newer: Option<String>,
    },
}

impl std::fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityFault::DuplicateInstant { first, second } => {
                write!(f, "keys {} and {} name the same instant", first, second)
            }
            IntegrityFault::StaleLinks {
                key,
                stored_older,
                stored_newer,
            } => write!(
                f,
                "stored links of {} are stale (older={}, newer={})",
                key,
                stored_older.as_deref().unwrap_or("none"),
                stored_newer.as_deref().unwrap_or("none"),
            ),
        }
    }
}

/// Anything that can enumerate the existing snapshot keys.
pub trait ChainKeySource {
    fn load_keys(&self) -> Result<Vec<SnapshotKey>>;
}

impl ChainKeySource for [SnapshotKey] {
    fn load_keys(&self) -> Result<Vec<SnapshotKey>> {
        Ok(self.to_vec())
    }
}

impl ChainKeySource for Vec<SnapshotKey> {
    fn load_keys(&self) -> Result<Vec<SnapshotKey>> {
        Ok(self.clone())
    }
}

/// Discovers keys from `dashboard_<key>.html` files in a site directory.
pub struct DirectoryKeySource {
    dir: PathBuf,
}

impl DirectoryKeySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ChainKeySource for DirectoryKeySource {
    fn load_keys(&self) -> Result<Vec<SnapshotKey>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(SnapshotKey::from_href) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotChain {
    /// Ascending by instant.
    keys: Vec<SnapshotKey>,
}

impl SnapshotChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(mut keys: Vec<SnapshotKey>) -> Self {
        keys.sort();
        Self { keys }
    }

    pub fn load(source: &(impl ChainKeySource + ?Sized)) -> Result<Self> {
        Ok(Self::from_keys(source.load_keys()?))
    }

    pub fn keys(&self) -> &[SnapshotKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn head(&self) -> Option<&SnapshotKey> {
        self.keys.first()
    }

    pub fn tail(&self) -> Option<&SnapshotKey> {
        self.keys.last()
    }

    fn position(&self, key: &SnapshotKey) -> Option<usize> {
        self.keys.binary_search(key).ok()
    }

    /// Whether `key` could become the new tail.
    pub fn check_append(&self, key: &SnapshotKey) -> Result<(), ChainError> {
        if let Some(existing) = self.keys.iter().find(|k| k.same_instant(key)) {
            return Err(ChainError::Conflict(existing.clone()));
        }
        match self.tail() {
            Some(tail) if key < tail => Err(ChainError::OutOfOrder {
                new: key.clone(),
                tail: tail.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Append `key` as the new tail. On error the chain is unchanged.
    pub fn append(&mut self, key: SnapshotKey) -> Result<SnapshotKey, ChainError> {
        self.check_append(&key)?;
        self.keys.push(key.clone());
        Ok(key)
    }

    pub fn links_for(&self, page: &PageRef) -> Result<Links, ChainError> {
        match page {
            PageRef::Live => Ok(Links {
                older: Some(
                    self.tail()
                        .map(|k| NavTarget::Snapshot(k.clone()))
                        .unwrap_or(NavTarget::ArchiveRoot),
                ),
                newer: None,
            }),
            PageRef::Archive => Ok(Links {
                older: None,
                newer: Some(
                    self.head()
                        .map(|k| NavTarget::Snapshot(k.clone()))
                        .unwrap_or(NavTarget::LiveRoot),
                ),
            }),
            PageRef::Snapshot(key) => {
                let i = self
                    .position(key)
                    .ok_or_else(|| ChainError::UnknownKey(key.clone()))?;
                Ok(self.member_links(i))
            }
        }
    }

    fn member_links(&self, i: usize) -> Links {
        let older = match i.checked_sub(1) {
            Some(prev) => NavTarget::Snapshot(self.keys[prev].clone()),
            None => NavTarget::ArchiveRoot,
        };
        let newer = match self.keys.get(i + 1) {
            Some(next) => NavTarget::Snapshot(next.clone()),
            None => NavTarget::LiveRoot,
        };
        Links {
            older: Some(older),
            newer: Some(newer),
        }
    }

    /// Keys must be strictly increasing by instant.
    pub fn validate(&self) -> Result<(), ChainError> {
        for pair in self.keys.windows(2) {
            if pair[0].instant() >= pair[1].instant() {
                return Err(ChainError::Integrity(IntegrityFault::DuplicateInstant {
                    first: pair[0].clone(),
                    second: pair[1].clone(),
                }));
            }
        }
        Ok(())
    }

    /// Links of every member, recomputed from the key order.
    pub fn rebuild_all_links(&self) -> Result<Vec<(SnapshotKey, Links)>, ChainError> {
        self.validate()?;
        Ok(self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| (key.clone(), self.member_links(i)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SnapshotKey {
        SnapshotKey::parse(raw).unwrap()
    }

    fn snap(raw: &str) -> Option<NavTarget> {
        Some(NavTarget::Snapshot(key(raw)))
    }

    fn three() -> SnapshotChain {
        SnapshotChain::from_keys(vec![
            key("2025-03-01_0800"),
            key("2025-03-01_1000"),
            key("2025-03-01_1200"),
        ])
    }

    #[test]
    fn test_links_for_three_members() {
        let chain = three();
        let k0 = PageRef::Snapshot(key("2025-03-01_0800"));
        let k1 = PageRef::Snapshot(key("2025-03-01_1000"));
        let k2 = PageRef::Snapshot(key("2025-03-01_1200"));

        assert_eq!(
            chain.links_for(&k1).unwrap(),
            Links {
                older: snap("2025-03-01_0800"),
                newer: snap("2025-03-01_1200"),
            }
        );
        assert_eq!(
            chain.links_for(&k0).unwrap(),
            Links {
                older: Some(NavTarget::ArchiveRoot),
                newer: snap("2025-03-01_1000"),
            }
        );
        assert_eq!(
            chain.links_for(&k2).unwrap(),
            Links {
                older: snap("2025-03-01_1000"),
                newer: Some(NavTarget::LiveRoot),
            }
        );
    }

    #[test]
    fn test_live_and_archive_links() {
        let chain = three();
        assert_eq!(
            chain.links_for(&PageRef::Live).unwrap(),
            Links {
                older: snap("2025-03-01_1200"),
                newer: None,
            }
        );
        assert_eq!(
            chain.links_for(&PageRef::Archive).unwrap(),
            Links {
                older: None,
                newer: snap("2025-03-01_0800"),
            }
        );
    }

    #[test]
    fn test_empty_chain_links() {
        let chain = SnapshotChain::new();
        assert_eq!(
            chain.links_for(&PageRef::Live).unwrap(),
            Links {
                older: Some(NavTarget::ArchiveRoot),
                newer: None,
            }
        );
        assert_eq!(
            chain.links_for(&PageRef::Archive).unwrap(),
            Links {
                older: None,
                newer: Some(NavTarget::LiveRoot),
            }
        );
        assert!(chain.rebuild_all_links().unwrap().is_empty());
    }

    #[test]
    fn test_single_member_points_at_both_roots() {
        let chain = SnapshotChain::from_keys(vec![key("2025-03-01_0800")]);
        let links = chain.links_for(&PageRef::Snapshot(key("2025-03-01_0800"))).unwrap();
        assert_eq!(links.older_href().as_deref(), Some("archive.html"));
        assert_eq!(links.newer_href().as_deref(), Some("index.html"));
    }

    #[test]
    fn test_unknown_key() {
        let chain = three();
        let err = chain
            .links_for(&PageRef::Snapshot(key("2025-03-01_0900")))
            .unwrap_err();
        assert!(matches!(err, ChainError::UnknownKey(_)));
    }

    #[test]
    fn test_chain_is_doubly_consistent() {
        let chain = SnapshotChain::from_keys(
            (0..10).map(|h| key(&format!("2025-03-02_{:02}30", h))).collect(),
        );
        let links = chain.rebuild_all_links().unwrap();
        for pair in links.windows(2) {
            let (ref k_i, ref l_i) = pair[0];
            let (ref k_next, ref l_next) = pair[1];
            assert_eq!(l_i.newer, Some(NavTarget::Snapshot(k_next.clone())));
            assert_eq!(l_next.older, Some(NavTarget::Snapshot(k_i.clone())));
        }
    }

    #[test]
    fn test_append_grows_by_one_and_moves_tail() {
        let mut chain = three();
        let before = chain.len();
        let previous_tail = chain.tail().cloned().unwrap();

        let new_key = chain.append(key("2025-03-01_1400")).unwrap();
        assert_eq!(chain.len(), before + 1);
        assert!(chain.keys()[..before].iter().all(|k| *k < new_key));

        // the previous tail now points forward at the new member instead of live
        let links = chain.links_for(&PageRef::Snapshot(previous_tail)).unwrap();
        assert_eq!(links.newer, Some(NavTarget::Snapshot(new_key.clone())));
        assert_eq!(
            chain.links_for(&PageRef::Live).unwrap().older,
            Some(NavTarget::Snapshot(new_key))
        );
    }

    #[test]
    fn test_append_collision_leaves_chain_unchanged() {
        let mut chain = SnapshotChain::new();
        chain.append(key("2025-03-01_1400")).unwrap();

        let err = chain.append(key("2025-03-01_1400")).unwrap_err();
        assert!(matches!(err, ChainError::Conflict(_)));
        // same instant at a finer granularity is still a collision
        let err = chain.append(key("2025-03-01_140000")).unwrap_err();
        assert!(matches!(err, ChainError::Conflict(_)));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_append_older_than_tail_rejected() {
        let mut chain = three();
        let err = chain.append(key("2025-03-01_0900")).unwrap_err();
        assert!(matches!(err, ChainError::OutOfOrder { .. }));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_duplicate_instants_fail_rebuild() {
        let chain = SnapshotChain::from_keys(vec![
            key("2025-03-01_0800"),
            key("2025-03-01_080000"),
        ]);
        let err = chain.rebuild_all_links().unwrap_err();
        assert!(matches!(
            err,
            ChainError::Integrity(IntegrityFault::DuplicateInstant { .. })
        ));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let chain = three();
        assert_eq!(chain.rebuild_all_links().unwrap(), chain.rebuild_all_links().unwrap());
    }

    #[test]
    fn test_unsorted_source_is_ordered() {
        let source = vec![
            key("2025-03-01_1200"),
            key("2025-03-01_0800"),
            key("2025-03-01_1000"),
        ];
        let chain = SnapshotChain::load(&source).unwrap();
        assert_eq!(chain.head(), Some(&key("2025-03-01_0800")));
        assert_eq!(chain.tail(), Some(&key("2025-03-01_1200")));
    }

    #[test]
    fn test_directory_source_reads_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "dashboard_2025-03-01_1000.html",
            "dashboard_2025-03-01_0800.html",
            "index.html",
            "archive.html",
            "dashboard_draft.html",
        ] {
            fs::write(dir.path().join(name), "<html></html>").unwrap();
        }
        let chain = SnapshotChain::load(&DirectoryKeySource::new(dir.path())).unwrap();
        let raw: Vec<&str> = chain.keys().iter().map(SnapshotKey::as_str).collect();
        assert_eq!(raw, vec!["2025-03-01_0800", "2025-03-01_1000"]);

        let missing = DirectoryKeySource::new(dir.path().join("nope"));
        assert!(missing.load_keys().unwrap().is_empty());
    }
}
