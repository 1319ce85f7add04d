pub mod logger;

pub use logger::{BuildLog, BuildRecord};
