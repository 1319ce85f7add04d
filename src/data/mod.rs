pub mod gamma_api;
pub mod table;
pub mod types;

pub use gamma_api::GammaApiClient;
pub use types::{Bucket, MarketRecord, RankedEntry, RankedList};
