pub mod post;
pub mod token;

// Re-export commonly used types
pub use post::{MediaKind, MediaRef, Post, PostAuthor, PostMetrics, Review, ReviewStatus};
pub use token::{
    calculate_fill_time, AssetMetadata, Holder, HoldersInfo, MigrationEvent, Platform, TokenAsset,
    TokenStats, TradeStats24h,
};
