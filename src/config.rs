use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// A lock file older than this is treated as left behind by a crashed build.
    #[serde(default = "default_lock_stale_minutes")]
    pub lock_stale_minutes: u64,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    #[serde(default = "default_build_log_path")]
    pub build_log_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Snapshot keys carry seconds (`YYYY-MM-DD_HHMMSS`) instead of minutes.
    #[serde(default)]
    pub key_seconds: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            lock_path: default_lock_path(),
            lock_stale_minutes: default_lock_stale_minutes(),
            history_path: default_history_path(),
            build_log_path: default_build_log_path(),
            log_level: default_log_level(),
            key_seconds: false,
        }
    }
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_database_path() -> String { "data/snapshots.db".to_string() }
fn default_lock_path() -> PathBuf { PathBuf::from("data/build.lock") }
fn default_lock_stale_minutes() -> u64 { 60 }
fn default_history_path() -> PathBuf { PathBuf::from("data/desc_history.json") }
fn default_build_log_path() -> String { "data/builds.csv".to_string() }
fn default_log_level() -> String { "info".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_page_size() -> usize { 200 }
fn default_max_pages() -> usize { 50 }
fn default_timeout_secs() -> u64 { 18 }

#[derive(Debug, Clone, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub hot: HotWeights,
    #[serde(default)]
    pub overlooked: OverlookedWeights,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            hot: HotWeights::default(),
            overlooked: OverlookedWeights::default(),
        }
    }
}

fn default_limit() -> usize { 12 }

/// Hot score: log-volume + spread tightness + time urgency.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotWeights {
    pub volume_weight: f64,
    pub spread_weight: f64,
    /// Multiplier inside `1/(1 + scale*spread)`.
    pub spread_scale: f64,
    /// Spread component used when a market has no usable spread.
    pub missing_spread_component: f64,
    pub urgency_weight: f64,
    pub urgency_horizon_days: f64,
}

impl Default for HotWeights {
    fn default() -> Self {
        Self {
            volume_weight: 1.3,
            spread_weight: 2.0,
            spread_scale: 100.0,
            missing_spread_component: 0.5,
            urgency_weight: 1.2,
            urgency_horizon_days: 30.0,
        }
    }
}

/// Overlooked score: near-50 flag + underround bonus + urgency - volume band penalty.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlookedWeights {
    pub near50_weight: f64,
    pub underround_factor: f64,
    pub underround_bonus_min: f64,
    pub underround_bonus_max: f64,
    pub urgency_weight: f64,
    pub urgency_horizon_days: f64,
    pub volume_lower: f64,
    pub volume_upper: f64,
    pub low_volume_penalty: f64,
    pub high_volume_penalty: f64,
}

impl Default for OverlookedWeights {
    fn default() -> Self {
        Self {
            near50_weight: 2.2,
            underround_factor: 2.2,
            underround_bonus_min: -1.0,
            underround_bonus_max: 0.6,
            urgency_weight: 1.0,
            urgency_horizon_days: 45.0,
            volume_lower: 1_500.0,
            volume_upper: 200_000.0,
            low_volume_penalty: 0.4,
            high_volume_penalty: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,
    #[serde(default = "default_long_dir")]
    pub long_dir: PathBuf,
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            meta_dir: default_meta_dir(),
            long_dir: default_long_dir(),
            window: default_window(),
        }
    }
}

fn default_meta_dir() -> PathBuf { PathBuf::from("content/meta") }
fn default_long_dir() -> PathBuf { PathBuf::from("content/long") }
fn default_window() -> usize { 30 }

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub polymarket_gamma_url: String,
    /// Overrides `system.dry_run` when set.
    pub dry_run: Option<bool>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        anyhow::ensure!(config.ranking.limit > 0, "ranking.limit must be positive");
        anyhow::ensure!(config.rotation.window > 0, "rotation.window must be positive");
        anyhow::ensure!(
            config.ranking.overlooked.volume_lower <= config.ranking.overlooked.volume_upper,
            "ranking.overlooked.volume_lower must not exceed volume_upper"
        );
        Ok(config)
    }
}

pub const DEFAULT_GAMMA_URL: &str = "https://gamma-api.polymarket.com";

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Self::from_vars(
            std::env::var("POLYMARKET_GAMMA_URL").ok(),
            std::env::var("DIGEST_DRY_RUN").ok(),
        )
    }

    pub fn from_vars(gamma_url: Option<String>, dry_run: Option<String>) -> Result<Self> {
        let dry_run = match dry_run {
            Some(v) => Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("DIGEST_DRY_RUN must be true or false, got '{}'", v))?,
            ),
            None => None,
        };

        Ok(Self {
            polymarket_gamma_url: gamma_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GAMMA_URL.to_string()),
            dry_run,
        })
    }
}
