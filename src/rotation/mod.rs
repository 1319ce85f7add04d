//! Rotating page descriptions with a bounded no-repeat history.

pub mod description;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub use description::{list_pool, DescriptionPicks};

/// File names picked on recent runs, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptionHistory {
    pub recent_meta: Vec<String>,
    pub recent_long: Vec<String>,
}

fn string_list(obj: &Value, field: &str) -> Vec<String> {
    obj.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl DescriptionHistory {
    /// Load the history file. Missing, unreadable or malformed files yield an
    /// empty history; a field of the wrong shape is reset on its own.
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(obj) if obj.is_object() => Self {
                recent_meta: string_list(&obj, "recent_meta"),
                recent_long: string_list(&obj, "recent_long"),
            },
            Ok(_) | Err(_) => {
                warn!("Ignoring malformed description history at {}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(self)?;
        fs::write(path, body)
            .with_context(|| format!("Failed to write description history: {}", path.display()))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pick one file from `pool`, preferring names not in `recent`.
///
/// Returns the pick and the updated window (at most `window` names, oldest
/// dropped first). An empty pool returns `None` and `recent` unchanged.
pub fn choose_rotating<R: Rng + ?Sized>(
    pool: &[PathBuf],
    recent: &[String],
    window: usize,
    rng: &mut R,
) -> (Option<PathBuf>, Vec<String>) {
    let fresh: Vec<&PathBuf> = pool
        .iter()
        .filter(|p| !recent.contains(&file_name(p)))
        .collect();

    let pick = if fresh.is_empty() {
        pool.choose(rng).cloned()
    } else {
        fresh.choose(rng).map(|p| (*p).clone())
    };

    let mut updated = recent.to_vec();
    if let Some(p) = &pick {
        updated.push(file_name(p));
        let excess = updated.len().saturating_sub(window);
        updated.drain(..excess);
    }
    (pick, updated)
}

/// One pick per pool plus the history to persist for the next run.
pub fn rotate<R: Rng + ?Sized>(
    history: &DescriptionHistory,
    meta_pool: &[PathBuf],
    long_pool: &[PathBuf],
    window: usize,
    rng: &mut R,
) -> (DescriptionPicks, DescriptionHistory) {
    let (meta, recent_meta) = choose_rotating(meta_pool, &history.recent_meta, window, rng);
    let (long, recent_long) = choose_rotating(long_pool, &history.recent_long, window, rng);
    (
        DescriptionPicks { meta, long },
        DescriptionHistory {
            recent_meta,
            recent_long,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("content/meta/{n}"))).collect()
    }

    #[test]
    fn test_empty_pool_leaves_history() {
        let mut rng = StdRng::seed_from_u64(7);
        let recent = vec!["a.txt".to_string()];
        let (pick, updated) = choose_rotating(&[], &recent, 30, &mut rng);
        assert_eq!(pick, None);
        assert_eq!(updated, recent);
    }

    #[test]
    fn test_prefers_fresh_files() {
        let mut rng = StdRng::seed_from_u64(7);
        let files = pool(&["a.txt", "b.txt", "c.txt"]);
        let recent = vec!["a.txt".to_string(), "c.txt".to_string()];
        for _ in 0..20 {
            let (pick, updated) = choose_rotating(&files, &recent, 30, &mut rng);
            assert_eq!(pick, Some(PathBuf::from("content/meta/b.txt")));
            assert_eq!(updated, vec!["a.txt", "c.txt", "b.txt"]);
        }
    }

    #[test]
    fn test_all_recent_falls_back_to_whole_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        let files = pool(&["a.txt", "b.txt"]);
        let recent = vec!["a.txt".to_string(), "b.txt".to_string()];
        let (pick, updated) = choose_rotating(&files, &recent, 2, &mut rng);
        let pick = pick.unwrap();
        assert!(files.contains(&pick));
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.last().unwrap(), &file_name(&pick));
    }

    #[test]
    fn test_no_repeat_within_window() {
        let mut rng = StdRng::seed_from_u64(42);
        let files = pool(&["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]);
        let mut history = DescriptionHistory::default();
        let mut seen = Vec::new();
        for _ in 0..files.len() {
            let (picks, next) = rotate(&history, &files, &[], 30, &mut rng);
            seen.push(picks.meta.unwrap());
            history = next;
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), files.len());
        assert!(history.recent_long.is_empty());
    }

    #[test]
    fn test_window_trims_oldest() {
        let mut rng = StdRng::seed_from_u64(3);
        let files = pool(&["a.txt", "b.txt", "c.txt"]);
        let mut recent = Vec::new();
        for _ in 0..5 {
            recent = choose_rotating(&files, &recent, 2, &mut rng).1;
        }
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_rotation_is_deterministic_for_seed() {
        let files = pool(&["a.txt", "b.txt", "c.txt", "d.txt"]);
        let history = DescriptionHistory::default();
        let a = rotate(&history, &files, &files, 30, &mut StdRng::seed_from_u64(9));
        let b = rotate(&history, &files, &files, 30, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_history_load_tolerates_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desc_history.json");
        assert_eq!(DescriptionHistory::load(&path), DescriptionHistory::default());

        fs::write(&path, "{not json").unwrap();
        assert_eq!(DescriptionHistory::load(&path), DescriptionHistory::default());

        fs::write(&path, "[1, 2, 3]").unwrap();
        assert_eq!(DescriptionHistory::load(&path), DescriptionHistory::default());

        fs::write(&path, r#"{"recent_meta": "a.txt", "recent_long": ["x.html", 5]}"#).unwrap();
        let history = DescriptionHistory::load(&path);
        assert!(history.recent_meta.is_empty());
        assert_eq!(history.recent_long, vec!["x.html"]);
    }

    #[test]
    fn test_history_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("desc_history.json");
        let history = DescriptionHistory {
            recent_meta: vec!["a.txt".to_string()],
            recent_long: vec!["b.html".to_string()],
        };
        history.save(&path).unwrap();
        assert_eq!(DescriptionHistory::load(&path), history);
    }
}
