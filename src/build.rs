use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::gamma_api::GammaApiClient;
use crate::data::table;
use crate::data::types::MarketRecord;
use crate::monitoring::logger::{BuildLog, BuildRecord};
use crate::ranking::RankingEngine;
use crate::rotation::{self, list_pool, DescriptionHistory};
use crate::snapshot::chain::ChainError;
use crate::snapshot::lock::BuildLock;
use crate::snapshot::manager::{RebuildReport, SnapshotManager};
use crate::snapshot::persistence::SnapshotDatabase;
use crate::snapshot::types::{FrozenDescription, LiveContent, SnapshotKey};

#[derive(Debug, Clone)]
pub enum RecordSource {
    /// JSON rows prepared by an earlier fetch.
    File(PathBuf),
    Gamma { base_url: String },
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub live: LiveContent,
    /// Previous live content frozen on this run.
    pub frozen: Option<SnapshotKey>,
    pub links: RebuildReport,
}

pub async fn load_records(config: &Config, source: &RecordSource) -> Result<Vec<MarketRecord>> {
    match source {
        RecordSource::File(path) => {
            let records = table::load_records(path)?;
            info!("Loaded {} market rows from {}", records.len(), path.display());
            Ok(records)
        }
        RecordSource::Gamma { base_url } => {
            let client = GammaApiClient::new(
                base_url.clone(),
                Duration::from_secs(config.fetch.timeout_secs),
            )?;
            let records = client
                .fetch_open_markets(config.fetch.page_size, config.fetch.max_pages)
                .await?;
            if !config.system.dry_run {
                let path = markets_path(&config.system.data_dir, Utc::now());
                table::save_records(&path, &records)?;
                info!("Saved fetched markets to {}", path.display());
            }
            Ok(records)
        }
    }
}

pub fn markets_path(data_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    data_dir.join(format!("markets_{}.json", at.format("%Y%m%d_%H%M%S")))
}

pub fn ranked_path(data_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    data_dir.join(format!("ranked_{}.json", at.format("%Y%m%d_%H%M%S")))
}

fn open_store(config: &Config) -> Result<SnapshotDatabase> {
    let path = &config.system.database_path;
    if config.system.dry_run && !Path::new(path).exists() {
        return SnapshotDatabase::open_in_memory();
    }
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    SnapshotDatabase::new(path)
}

/// Fetch, rank and publish one run.
pub async fn run(config: &Config, source: &RecordSource) -> Result<BuildOutcome> {
    let _lock = if config.system.dry_run {
        None
    } else {
        let stale_after = Duration::from_secs(config.system.lock_stale_minutes * 60);
        Some(BuildLock::acquire(&config.system.lock_path, stale_after)?)
    };

    let records = load_records(config, source).await?;
    publish(config, &records, Utc::now(), &mut rand::thread_rng())
}

/// Rank `records` and move the site forward by one build.
///
/// The previous live content is frozen under its own build time before the
/// new content replaces it, then every member's navigation is rebuilt.
pub fn publish<R: Rng + ?Sized>(
    config: &Config,
    records: &[MarketRecord],
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<BuildOutcome> {
    let dry_run = config.system.dry_run;

    let engine = RankingEngine::new(config.ranking.clone());
    let (hot, overlooked) = engine.rank(records);
    if hot.is_empty() && overlooked.is_empty() {
        warn!("No markets to rank; publishing empty lists");
    }
    info!("Ranked {} hot, {} overlooked", hot.len(), overlooked.len());

    let history = DescriptionHistory::load(&config.system.history_path);
    let meta_pool = list_pool(&config.rotation.meta_dir, "txt")?;
    let long_pool = list_pool(&config.rotation.long_dir, "html")?;
    let (picks, next_history) = rotation::rotate(
        &history,
        &meta_pool,
        &long_pool,
        config.rotation.window,
        rng,
    );
    let description = FrozenDescription::from_picks(&picks);

    let live = LiveContent {
        built_at: now,
        hot,
        overlooked,
        description,
    };

    let mut manager = SnapshotManager::new(open_store(config)?, config.system.key_seconds)?;
    let previous = manager.db().load_live()?;

    // The previous live page must stay addressable under its own key, so a
    // build that would reuse or precede that key publishes nothing.
    if let Some(prev) = &previous {
        let prev_key = manager.key_for(prev);
        let live_key = manager.key_for(&live);
        if live_key.same_instant(&prev_key) {
            return Err(ChainError::Conflict(prev_key).into());
        }
        if live_key < prev_key {
            return Err(ChainError::OutOfOrder {
                new: live_key,
                tail: prev_key,
            }
            .into());
        }
    }

    if dry_run {
        if let Some(prev) = &previous {
            let key = manager.key_for(prev);
            match manager.chain().check_append(&key) {
                Ok(()) => info!("[dry run] Would freeze snapshot {}", key),
                Err(e) => warn!("[dry run] Would not freeze {}: {}", key, e),
            }
        }
        return Ok(BuildOutcome {
            live,
            frozen: None,
            links: RebuildReport::default(),
        });
    }

    let frozen = match &previous {
        Some(prev) => Some(
            manager
                .append_snapshot(prev)
                .context("Failed to freeze previous live page")?,
        ),
        None => {
            info!("No previous live page; nothing to freeze");
            None
        }
    };

    manager.db().save_live(&live)?;
    let ranked = ranked_path(&config.system.data_dir, now);
    table::save_ranked(&ranked, &live.hot, &live.overlooked)?;
    let links = manager.rebuild_all_links()?;
    next_history.save(&config.system.history_path)?;

    BuildLog::new(Path::new(&config.system.build_log_path))?.log_build(&BuildRecord {
        built_at: now,
        snapshot: frozen.as_ref(),
        hot: live.hot.len(),
        overlooked: live.overlooked.len(),
        description: &live.description,
        links_rewritten: links.rewritten,
    })?;

    info!(
        "Build complete: {} snapshots, live page at {}",
        links.members,
        now.to_rfc3339()
    );
    Ok(BuildOutcome {
        live,
        frozen,
        links,
    })
}
