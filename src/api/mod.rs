use async_trait::async_trait;

use crate::error::SentinelError;
use crate::models::{AssetMetadata, Post, TokenStats};

pub mod jupiter;
pub mod launchlab;
pub mod pump;
pub mod retry;
pub mod social;

pub use social::SearchPage;

/// Platform metadata endpoint keyed by mint.
#[async_trait]
pub trait AssetMetadataSource: Send + Sync {
    async fn fetch_asset(&self, mint: &str) -> Result<Option<AssetMetadata>, SentinelError>;
}

/// 24h trade aggregates for a mint.
#[async_trait]
pub trait TokenStatsSource: Send + Sync {
    async fn fetch_stats(&self, mint: &str) -> Result<Option<TokenStats>, SentinelError>;
}

/// Social search feed. `lookup` returns `Ok(None)` once a post is deleted
/// or its author suspended.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<SearchPage, SentinelError>;
    async fn lookup(&self, post_id: &str) -> Result<Option<Post>, SentinelError>;
}
