use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::snapshot::types::{FrozenDescription, SnapshotKey};

const HEADER: &str = "timestamp,snapshot_key,hot,overlooked,meta,long,links_rewritten";

/// One row per completed build.
#[derive(Debug, Clone)]
pub struct BuildRecord<'a> {
    pub built_at: DateTime<Utc>,
    /// Snapshot frozen on this run, if any.
    pub snapshot: Option<&'a SnapshotKey>,
    pub hot: usize,
    pub overlooked: usize,
    pub description: &'a FrozenDescription,
    pub links_rewritten: usize,
}

pub struct BuildLog {
    log_path: PathBuf,
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl BuildLog {
    pub fn new(log_path: &Path) -> Result<Self> {
        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            if let Some(parent) = log_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(log_path)?;
            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self {
            log_path: log_path.to_path_buf(),
        })
    }

    pub fn log_build(&self, record: &BuildRecord<'_>) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            record.built_at.to_rfc3339(),
            record.snapshot.map(SnapshotKey::as_str).unwrap_or(""),
            record.hot,
            record.overlooked,
            csv_field(record.description.meta_source.as_deref().unwrap_or("")),
            csv_field(record.description.long_source.as_deref().unwrap_or("")),
            record.links_rewritten,
        )?;

        Ok(())
    }
}
