pub mod build;
pub mod config;
pub mod data;
pub mod monitoring;
pub mod ranking;
pub mod rotation;
pub mod snapshot;

pub use config::{Config, EnvConfig};
pub use data::types::{Bucket, MarketRecord, RankedEntry, RankedList};
pub use ranking::RankingEngine;
pub use snapshot::{ChainError, SnapshotChain, SnapshotKey, SnapshotManager};
