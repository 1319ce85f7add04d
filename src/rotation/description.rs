use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::snapshot::types::FrozenDescription;

pub const DEFAULT_SHORT: &str = "Daily dashboard of Polymarket heat & overlooked opportunities.";
pub const DEFAULT_LONG: &str = "<p>Insightful commentary rotates here.</p>";
pub const SHORT_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionPicks {
    pub meta: Option<PathBuf>,
    pub long: Option<PathBuf>,
}

/// Files in `dir` with extension `ext`, sorted by name. A missing directory
/// is an empty pool.
pub fn list_pool(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_pick(pick: Option<&Path>) -> Option<String> {
    let path = pick?;
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to read description {}: {}", path.display(), e);
            None
        }
    }
}

fn source_name(pick: Option<&Path>) -> Option<String> {
    pick.and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
}

impl FrozenDescription {
    pub fn from_picks(picks: &DescriptionPicks) -> Self {
        let meta = picks.meta.as_deref();
        let long = picks.long.as_deref();

        let short = read_pick(meta)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_SHORT.to_string());
        let short: String = short.chars().take(SHORT_MAX_CHARS).collect();
        let long_text = read_pick(long).unwrap_or_else(|| DEFAULT_LONG.to_string());

        let description = Self {
            short,
            long: long_text,
            meta_source: source_name(meta),
            long_source: source_name(long),
        };
        info!(
            "Using meta={}, long={}",
            description.meta_source.as_deref().unwrap_or("-"),
            description.long_source.as_deref().unwrap_or("-")
        );
        description
    }
}
