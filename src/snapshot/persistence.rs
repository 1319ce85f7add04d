use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::snapshot::chain::ChainKeySource;
use crate::snapshot::types::{LiveContent, Links, NavTarget, SnapshotKey, SnapshotPage};

pub struct SnapshotDatabase {
    conn: Connection,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        key TEXT PRIMARY KEY,
        built_at TIMESTAMP NOT NULL,
        frozen_at TIMESTAMP NOT NULL,
        content TEXT NOT NULL,
        older_href TEXT,
        newer_href TEXT,
        links_updated_at TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS live_page (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        built_at TIMESTAMP NOT NULL,
        content TEXT NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_snapshots_built_at ON snapshots(built_at);
"#;

/// Stored hrefs of one snapshot, as last written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredLinks {
    pub older_href: Option<String>,
    pub newer_href: Option<String>,
}

impl StoredLinks {
    pub fn matches(&self, links: &Links) -> bool {
        self.older_href == links.older_href() && self.newer_href == links.newer_href()
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad timestamp in snapshot store: {}", raw))?
        .with_timezone(&Utc))
}

impl SnapshotDatabase {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open snapshot database: {}", db_path))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert a frozen page with stale (empty) links.
    /// Returns `false` without touching the row when the key already exists.
    pub fn insert_snapshot(&self, key: &SnapshotKey, content: &LiveContent) -> Result<bool> {
        let body = serde_json::to_string(content)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO snapshots (key, built_at, frozen_at, content)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                key.as_str(),
                content.built_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                body,
            ],
        )?;
        Ok(inserted == 1)
    }

    pub fn get_snapshot(&self, key: &SnapshotKey) -> Result<Option<SnapshotPage>> {
        let row: Option<(String, String, Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT frozen_at, content, older_href, newer_href
                 FROM snapshots WHERE key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let Some((frozen_at, body, older_href, newer_href)) = row else {
            return Ok(None);
        };

        let links = match (older_href, newer_href) {
            (None, None) => None,
            (older, newer) => Some(Links {
                older: older.as_deref().and_then(NavTarget::from_href),
                newer: newer.as_deref().and_then(NavTarget::from_href),
            }),
        };

        Ok(Some(SnapshotPage {
            key: key.clone(),
            frozen_at: parse_ts(&frozen_at)?,
            content: serde_json::from_str(&body)
                .with_context(|| format!("Corrupt content for snapshot {}", key))?,
            links,
        }))
    }

    pub fn stored_links(&self) -> Result<Vec<(String, StoredLinks)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, older_href, newer_href FROM snapshots")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                StoredLinks {
                    older_href: row.get(1)?,
                    newer_href: row.get(2)?,
                },
            ))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.into())
    }

    pub fn update_links(&self, key: &SnapshotKey, links: &Links) -> Result<()> {
        self.conn.execute(
            "UPDATE snapshots
             SET older_href = ?1, newer_href = ?2, links_updated_at = ?3
             WHERE key = ?4",
            params![
                links.older_href(),
                links.newer_href(),
                Utc::now().to_rfc3339(),
                key.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn count_snapshots(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn load_live(&self) -> Result<Option<LiveContent>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT content FROM live_page WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        body.map(|b| serde_json::from_str(&b).context("Corrupt live page content"))
            .transpose()
    }

    pub fn save_live(&self, content: &LiveContent) -> Result<()> {
        let body = serde_json::to_string(content)?;
        self.conn.execute(
            "INSERT INTO live_page (id, built_at, content, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                built_at = excluded.built_at,
                content = excluded.content,
                updated_at = excluded.updated_at",
            params![
                content.built_at.to_rfc3339(),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

impl ChainKeySource for SnapshotDatabase {
    fn load_keys(&self) -> Result<Vec<SnapshotKey>> {
        let mut stmt = self.conn.prepare("SELECT key FROM snapshots")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        raw.iter()
            .map(|k| SnapshotKey::parse(k).map_err(anyhow::Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::test_support::content_at;

    #[test]
    fn test_insert_and_get_snapshot() {
        let db = SnapshotDatabase::open_in_memory().unwrap();
        let key = SnapshotKey::parse("2025-03-01_0800").unwrap();
        let content = content_at(8, 0);

        assert!(db.insert_snapshot(&key, &content).unwrap());
        let page = db.get_snapshot(&key).unwrap().unwrap();
        assert_eq!(page.content, content);
        assert_eq!(page.links, None);
        assert_eq!(db.count_snapshots().unwrap(), 1);
    }

    #[test]
    fn test_insert_existing_key_keeps_original() {
        let db = SnapshotDatabase::open_in_memory().unwrap();
        let key = SnapshotKey::parse("2025-03-01_0800").unwrap();
        assert!(db.insert_snapshot(&key, &content_at(8, 0)).unwrap());
        assert!(!db.insert_snapshot(&key, &content_at(9, 0)).unwrap());

        let page = db.get_snapshot(&key).unwrap().unwrap();
        assert_eq!(page.content.description.short, "short 8:0");
    }

    #[test]
    fn test_update_links_round_trip() {
        let db = SnapshotDatabase::open_in_memory().unwrap();
        let key = SnapshotKey::parse("2025-03-01_0800").unwrap();
        db.insert_snapshot(&key, &content_at(8, 0)).unwrap();

        let links = Links {
            older: Some(NavTarget::ArchiveRoot),
            newer: Some(NavTarget::LiveRoot),
        };
        db.update_links(&key, &links).unwrap();
        assert_eq!(db.get_snapshot(&key).unwrap().unwrap().links, Some(links.clone()));

        let stored = db.stored_links().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].1.matches(&links));
    }

    #[test]
    fn test_live_page_upsert() {
        let db = SnapshotDatabase::open_in_memory().unwrap();
        assert_eq!(db.load_live().unwrap(), None);
        db.save_live(&content_at(8, 0)).unwrap();
        db.save_live(&content_at(9, 30)).unwrap();
        assert_eq!(db.load_live().unwrap(), Some(content_at(9, 30)));
    }

    #[test]
    fn test_key_source_lists_keys() {
        let db = SnapshotDatabase::open_in_memory().unwrap();
        for raw in ["2025-03-01_1000", "2025-03-01_0800"] {
            let key = SnapshotKey::parse(raw).unwrap();
            db.insert_snapshot(&key, &content_at(8, 0)).unwrap();
        }
        let mut keys = db.load_keys().unwrap();
        keys.sort();
        let raw: Vec<&str> = keys.iter().map(SnapshotKey::as_str).collect();
        assert_eq!(raw, vec!["2025-03-01_0800", "2025-03-01_1000"]);
    }
}
