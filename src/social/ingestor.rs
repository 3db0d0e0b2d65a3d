// src/social/ingestor.rs
//
// Polls the search feed, keeps small-account posts that already have
// traction, and queues every new one for review.

use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::{ContentApi, SearchPage};
use crate::bot::messages::new_post_notification;
use crate::bot::Notifier;
use crate::config::Config;
use crate::error::SentinelError;
use crate::models::{Post, Review};
use crate::storage::PostStore;

/// Engagement window for the search query. Maxima are sent negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryWindow {
    pub min_faves: u32,
    pub max_faves: u32,
    pub min_replies: u32,
    pub max_replies: u32,
    pub min_retweets: u32,
    pub max_retweets: u32,
}

impl QueryWindow {
    pub fn build_query(&self) -> String {
        format!(
            "min_retweets:{} min_faves:{} min_replies:{} -min_replies:{} -min_retweets:{} -min_faves:{} \
             -filter:nativeretweets -filter:retweets -filter:replies within_time:60min filter:media lang:en",
            self.min_retweets,
            self.min_faves,
            self.min_replies,
            self.max_replies,
            self.max_retweets,
            self.max_faves,
        )
    }
}

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub query: String,
    /// Inclusive ceiling: an author with exactly this many followers is
    /// kept, anyone above it is skipped.
    pub max_followers: u64,
    pub min_views: u64,
    pub first_review_delay: Duration,
    pub fetch_interval: std::time::Duration,
    pub max_pages: u32,
    /// Pause between consecutive new-post notifications.
    pub notify_pause: std::time::Duration,
}

impl IngestorConfig {
    pub fn from_config(config: &Config) -> Self {
        let window = QueryWindow {
            min_faves: config.x_min_faves,
            max_faves: config.x_max_faves,
            min_replies: config.x_min_replies,
            max_replies: config.x_max_replies,
            min_retweets: config.x_min_retweets,
            max_retweets: config.x_max_retweets,
        };
        Self {
            query: window.build_query(),
            max_followers: config.x_filter_user_max_followers,
            min_views: config.x_filter_post_min_views,
            first_review_delay: Duration::seconds(config.review_first_delay_secs as i64),
            fetch_interval: std::time::Duration::from_secs(config.x_fetch_interval_secs),
            max_pages: config.x_max_pages_per_cycle,
            notify_pause: std::time::Duration::from_secs(3),
        }
    }
}

/// Drops duplicates (first occurrence wins), applies the follower ceiling
/// and view floor, then orders oldest first. Ties keep feed order.
pub fn filter_posts(posts: Vec<Post>, max_followers: u64, min_views: u64) -> Vec<Post> {
    let mut seen = HashSet::new();
    let mut kept: Vec<Post> = posts
        .into_iter()
        .filter(|post| seen.insert(post.post_id.clone()))
        .filter(|post| post.author.followers <= max_followers && post.metrics.views >= min_views)
        .collect();
    kept.sort_by_key(|post| post.created_at);
    kept
}

#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub pages_fetched: u64,
    pub posts_seen: u64,
    pub posts_ingested: u64,
}

pub struct TweetIngestor {
    api: Arc<dyn ContentApi>,
    store: Arc<dyn PostStore>,
    notifier: Arc<dyn Notifier>,
    config: IngestorConfig,
    stats: Arc<RwLock<IngestStats>>,
}

impl TweetIngestor {
    pub fn new(
        api: Arc<dyn ContentApi>,
        store: Arc<dyn PostStore>,
        notifier: Arc<dyn Notifier>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            config,
            stats: Arc::new(RwLock::new(IngestStats::default())),
        }
    }

    pub async fn get_stats(&self) -> IngestStats {
        self.stats.read().await.clone()
    }

    pub async fn poll(&self, cursor: Option<&str>) -> Result<SearchPage, SentinelError> {
        let page = self.api.search(&self.config.query, cursor).await?;
        let mut stats = self.stats.write().await;
        stats.pages_fetched += 1;
        stats.posts_seen += page.posts.len() as u64;
        Ok(page)
    }

    /// Stores and announces posts not seen before. Returns how many were new.
    pub async fn ingest(&self, posts: Vec<Post>, cancel: &CancellationToken) -> usize {
        let mut ingested = 0;
        for mut post in posts {
            if cancel.is_cancelled() {
                break;
            }
            post.review = Some(Review::queued(Utc::now() + self.config.first_review_delay));

            match self.store.insert_if_absent(&post).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!("Failed to store post {}: {}", post.post_id, e);
                    continue;
                }
            }

            info!("New tweet found: {}", post.url);
            ingested += 1;
            self.stats.write().await.posts_ingested += 1;
            self.notifier.deliver(&new_post_notification(&post, Utc::now())).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.notify_pause) => {}
            }
        }
        ingested
    }

    /// Pages through the feed until an empty page, a missing cursor or the
    /// page bound.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> usize {
        let mut cursor: Option<String> = None;
        let mut ingested = 0;

        for _ in 0..self.config.max_pages.max(1) {
            if cancel.is_cancelled() {
                break;
            }
            let page = match self.poll(cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    error!("Error fetching tweets: {}", e);
                    break;
                }
            };
            if page.posts.is_empty() {
                info!("No new tweets found.");
                break;
            }

            info!("Fetched {} tweets.", page.posts.len());
            let filtered = filter_posts(page.posts, self.config.max_followers, self.config.min_views);
            debug!("Filtered down to {} tweets.", filtered.len());
            ingested += self.ingest(filtered, cancel).await;

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        ingested
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting tweet ingestor");
        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;
            info!("Waiting for {:?} before next fetch", self.config.fetch_interval);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.fetch_interval) => {}
            }
        }
        info!("Tweet ingestor stopped");
    }
}
