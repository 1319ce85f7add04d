use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Another build holds the lock at {0}")]
    Held(PathBuf),

    #[error("Failed to create lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive build lock backed by a lock file. Released on drop.
///
/// Serializes snapshot append and link rebuild across builds started on
/// overlapping schedules. A lock file left behind by a crashed build is taken
/// over once it is older than the `stale_after` given to `acquire`.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = match create_exclusive(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !is_stale(path, stale_after) {
                    return Err(LockError::Held(path.to_path_buf()));
                }
                warn!(
                    "Removing stale build lock {} (older than {}s)",
                    path.display(),
                    stale_after.as_secs()
                );
                fs::remove_file(path).map_err(io_err)?;
                match create_exclusive(path) {
                    Ok(f) => f,
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        return Err(LockError::Held(path.to_path_buf()))
                    }
                    Err(source) => return Err(io_err(source)),
                }
            }
            Err(source) => return Err(io_err(source)),
        };

        // best effort; the file's existence is the lock
        let _ = writeln!(
            file,
            "pid={} acquired_at={}",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        info!("Build lock acquired: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn create_exclusive(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Unreadable metadata counts as fresh so a live build is never robbed.
fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release build lock {}: {}", self.path.display(), e);
        }
    }
}
