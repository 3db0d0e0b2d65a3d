pub mod ingestor;
pub mod review;

pub use ingestor::{IngestorConfig, TweetIngestor};
pub use review::{ReviewConfig, ReviewScheduler};
