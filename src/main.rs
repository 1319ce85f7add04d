use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use polymarket_digest::build::{self, RecordSource};
use polymarket_digest::config::{Config, EnvConfig};

fn load_config() -> Result<Config> {
    let path = std::env::var("DIGEST_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        Config::load(&path)
    } else {
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() {
    let config = load_config();

    // Initialize tracing; RUST_LOG wins over the configured level
    let level = config
        .as_ref()
        .map(|c| c.system.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!("Build failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(mut config: Config) -> Result<()> {
    let env_config = EnvConfig::load()?;
    if let Some(dry_run) = env_config.dry_run {
        config.system.dry_run = dry_run;
    }

    tracing::info!("Polymarket digest build starting");
    tracing::info!("Dry run mode: {}", config.system.dry_run);

    let source = match std::env::args().nth(1) {
        Some(path) => RecordSource::File(PathBuf::from(path)),
        None => RecordSource::Gamma {
            base_url: env_config.polymarket_gamma_url,
        },
    };

    let outcome = build::run(&config, &source).await?;
    tracing::info!(
        "Published {} hot / {} overlooked (frozen: {})",
        outcome.live.hot.len(),
        outcome.live.overlooked.len(),
        outcome
            .frozen
            .as_ref()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    Ok(())
}
