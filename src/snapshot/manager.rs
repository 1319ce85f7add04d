use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::snapshot::chain::{ChainError, IntegrityFault, SnapshotChain};
use crate::snapshot::persistence::SnapshotDatabase;
use crate::snapshot::types::{LiveContent, Links, PageRef, SnapshotKey};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RebuildReport {
    pub members: usize,
    /// Members whose stored links actually changed.
    pub rewritten: usize,
}

/// Owns the snapshot store and the in-memory chain derived from it.
///
/// Every mutation goes through here so the store and the chain never
/// diverge: an append is checked against the chain before it is written.
pub struct SnapshotManager {
    db: SnapshotDatabase,
    chain: SnapshotChain,
    key_seconds: bool,
}

impl SnapshotManager {
    pub fn new(db: SnapshotDatabase, key_seconds: bool) -> Result<Self> {
        let chain = SnapshotChain::load(&db)?;
        info!("Loaded snapshot chain with {} members", chain.len());
        Ok(Self {
            db,
            chain,
            key_seconds,
        })
    }

    pub fn db(&self) -> &SnapshotDatabase {
        &self.db
    }

    pub fn chain(&self) -> &SnapshotChain {
        &self.chain
    }

    pub fn key_for(&self, content: &LiveContent) -> SnapshotKey {
        SnapshotKey::from_datetime(content.built_at, self.key_seconds)
    }

    /// Freeze `content` as the new chain tail.
    ///
    /// Fails with `Conflict` if a snapshot for the same instant exists and
    /// with `OutOfOrder` if it would land before the tail. Neither the store
    /// nor the chain is touched on failure.
    pub fn append_snapshot(&mut self, content: &LiveContent) -> Result<SnapshotKey, ChainError> {
        let key = self.key_for(content);
        self.chain.check_append(&key)?;

        if !self.db.insert_snapshot(&key, content)? {
            return Err(ChainError::Conflict(key));
        }
        let key = self.chain.append(key)?;
        info!("Froze snapshot {} ({} members)", key, self.chain.len());
        Ok(key)
    }

    pub fn links_for(&self, page: &PageRef) -> Result<Links, ChainError> {
        self.chain.links_for(page)
    }

    /// Compare stored links against the key order without writing anything.
    pub fn verify_links(&self) -> Result<(), ChainError> {
        let stored: HashMap<String, _> = self.db.stored_links()?.into_iter().collect();
        for (key, expected) in self.chain.rebuild_all_links()? {
            let current = stored.get(key.as_str()).cloned().unwrap_or_default();
            if !current.matches(&expected) {
                return Err(ChainError::Integrity(IntegrityFault::StaleLinks {
                    key,
                    stored_older: current.older_href,
                    stored_newer: current.newer_href,
                }));
            }
        }
        Ok(())
    }

    /// Rewrite the navigation of every member from the current key order.
    pub fn rebuild_all_links(&self) -> Result<RebuildReport, ChainError> {
        let stored: HashMap<String, _> = self.db.stored_links()?.into_iter().collect();
        let all = self.chain.rebuild_all_links()?;

        let mut report = RebuildReport {
            members: all.len(),
            rewritten: 0,
        };
        for (key, links) in &all {
            let unchanged = stored
                .get(key.as_str())
                .map(|s| s.matches(links))
                .unwrap_or(false);
            if unchanged {
                continue;
            }
            debug!(
                "Relinking {}: older={:?} newer={:?}",
                key,
                links.older_href(),
                links.newer_href()
            );
            self.db.update_links(key, links)?;
            report.rewritten += 1;
        }

        if stored.len() != report.members {
            warn!(
                "Snapshot store has {} rows but chain has {} members",
                stored.len(),
                report.members
            );
        }
        info!(
            "Rebuilt links for {} snapshots ({} rewritten)",
            report.members, report.rewritten
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::content_at;
    use crate::snapshot::types::NavTarget;

    fn manager() -> SnapshotManager {
        SnapshotManager::new(SnapshotDatabase::open_in_memory().unwrap(), false).unwrap()
    }

    #[test]
    fn test_append_is_monotonic() {
        let mut mgr = manager();
        let k1 = mgr.append_snapshot(&content_at(8, 0)).unwrap();
        let k2 = mgr.append_snapshot(&content_at(10, 0)).unwrap();
        assert!(k1 < k2);
        assert_eq!(mgr.chain().len(), 2);
        assert_eq!(mgr.db().count_snapshots().unwrap(), 2);
        assert_eq!(k2.as_str(), "2025-03-01_1000");
    }

    #[test]
    fn test_collision_leaves_store_and_chain_unchanged() {
        let mut mgr = manager();
        mgr.append_snapshot(&content_at(8, 0)).unwrap();

        let err = mgr.append_snapshot(&content_at(8, 0)).unwrap_err();
        assert!(matches!(err, ChainError::Conflict(_)));
        let err = mgr.append_snapshot(&content_at(7, 0)).unwrap_err();
        assert!(matches!(err, ChainError::OutOfOrder { .. }));

        assert_eq!(mgr.chain().len(), 1);
        assert_eq!(mgr.db().count_snapshots().unwrap(), 1);
        let key = SnapshotKey::parse("2025-03-01_0800").unwrap();
        let page = mgr.db().get_snapshot(&key).unwrap().unwrap();
        assert_eq!(page.content.description.short, "short 8:0");
    }

    #[test]
    fn test_rebuild_moves_previous_tail_forward_link() {
        let mut mgr = manager();
        let k1 = mgr.append_snapshot(&content_at(8, 0)).unwrap();
        let report = mgr.rebuild_all_links().unwrap();
        assert_eq!(
            report,
            RebuildReport {
                members: 1,
                rewritten: 1,
            }
        );

        let page = mgr.db().get_snapshot(&k1).unwrap().unwrap();
        let links = page.links.unwrap();
        assert_eq!(links.older_href().as_deref(), Some("archive.html"));
        assert_eq!(links.newer_href().as_deref(), Some("index.html"));

        let k2 = mgr.append_snapshot(&content_at(9, 0)).unwrap();
        assert!(mgr.verify_links().is_err());

        let report = mgr.rebuild_all_links().unwrap();
        assert_eq!(
            report,
            RebuildReport {
                members: 2,
                rewritten: 2,
            }
        );
        let links = mgr.db().get_snapshot(&k1).unwrap().unwrap().links.unwrap();
        assert_eq!(links.newer, Some(NavTarget::Snapshot(k2.clone())));
        let links = mgr.db().get_snapshot(&k2).unwrap().unwrap().links.unwrap();
        assert_eq!(links.older, Some(NavTarget::Snapshot(k1)));
        assert_eq!(links.newer, Some(NavTarget::LiveRoot));
        assert!(mgr.verify_links().is_ok());
    }

    #[test]
    fn test_rebuild_twice_rewrites_nothing() {
        let mut mgr = manager();
        mgr.append_snapshot(&content_at(8, 0)).unwrap();
        mgr.append_snapshot(&content_at(9, 0)).unwrap();
        mgr.rebuild_all_links().unwrap();
        let report = mgr.rebuild_all_links().unwrap();
        assert_eq!(report.rewritten, 0);
    }

    #[test]
    fn test_reload_restores_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        let path = path.to_str().unwrap();
        {
            let db = SnapshotDatabase::new(path).unwrap();
            let mut mgr = SnapshotManager::new(db, false).unwrap();
            mgr.append_snapshot(&content_at(8, 0)).unwrap();
            mgr.append_snapshot(&content_at(9, 0)).unwrap();
        }
        let mgr = SnapshotManager::new(SnapshotDatabase::new(path).unwrap(), false).unwrap();
        assert_eq!(mgr.chain().len(), 2);
        assert_eq!(mgr.chain().tail().unwrap().as_str(), "2025-03-01_0900");
    }
}
