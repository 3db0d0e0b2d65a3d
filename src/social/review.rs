// src/social/review.rs
//
// Two-stage engagement review. A queued post gets one recheck if it is
// warming up; anything that reaches the posting threshold goes to the viral
// channel exactly once.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ContentApi;
use crate::bot::messages::viral_post_notification;
use crate::bot::Notifier;
use crate::config::Config;
use crate::models::{Post, PostMetrics, Review, ReviewStatus};
use crate::storage::PostStore;

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub second_delay: Duration,
    pub recheck_views: u64,
    pub post_views: u64,
    pub batch_size: usize,
    pub poll_interval: std::time::Duration,
    /// How long a claimed post stays hidden from other claimers.
    pub lease: Duration,
}

impl ReviewConfig {
    pub fn from_config(config: &Config) -> Self {
        let poll_secs = config.review_poll_interval_secs.max(1);
        Self {
            second_delay: Duration::seconds(config.review_second_delay_secs as i64),
            recheck_views: config.review_recheck_views,
            post_views: config.review_post_views,
            batch_size: config.review_batch_size.max(1),
            poll_interval: std::time::Duration::from_secs(poll_secs),
            lease: Duration::seconds((poll_secs * 5).max(60) as i64),
        }
    }
}

/// What a review decided for one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Posted,
    Recheck,
    Discarded,
    /// Lookup failed transiently; retried on a later poll.
    Deferred,
    /// Another reviewer already moved the post.
    Skipped,
}

/// Pure decision on fresh metrics. `None` views means the post is gone.
pub fn decide(review: &Review, views: Option<u64>, config: &ReviewConfig) -> ReviewStatus {
    match views {
        None => ReviewStatus::Discarded,
        Some(views) if views >= config.post_views => ReviewStatus::Posted,
        Some(views)
            if review.status == ReviewStatus::Queued
                && review.retries == 0
                && views >= config.recheck_views =>
        {
            ReviewStatus::Recheck
        }
        Some(_) => ReviewStatus::Discarded,
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReviewStats {
    pub reviewed: u64,
    pub posted: u64,
    pub rechecked: u64,
    pub discarded: u64,
    pub deferred: u64,
}

pub struct ReviewScheduler {
    api: Arc<dyn ContentApi>,
    store: Arc<dyn PostStore>,
    notifier: Arc<dyn Notifier>,
    config: ReviewConfig,
    stats: Arc<RwLock<ReviewStats>>,
}

impl ReviewScheduler {
    pub fn new(
        api: Arc<dyn ContentApi>,
        store: Arc<dyn PostStore>,
        notifier: Arc<dyn Notifier>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            config,
            stats: Arc::new(RwLock::new(ReviewStats::default())),
        }
    }

    pub async fn get_stats(&self) -> ReviewStats {
        self.stats.read().await.clone()
    }

    async fn record(&self, outcome: ReviewOutcome) {
        let mut stats = self.stats.write().await;
        stats.reviewed += 1;
        match outcome {
            ReviewOutcome::Posted => stats.posted += 1,
            ReviewOutcome::Recheck => stats.rechecked += 1,
            ReviewOutcome::Discarded => stats.discarded += 1,
            ReviewOutcome::Deferred => stats.deferred += 1,
            ReviewOutcome::Skipped => {}
        }
    }

    /// Reviews one claimed post and persists the outcome.
    pub async fn process_post(&self, post: &Post, now: DateTime<Utc>) -> ReviewOutcome {
        let Some(review) = post.review.clone() else {
            warn!("Post {} has no review record", post.post_id);
            return ReviewOutcome::Skipped;
        };

        let fresh = match self.api.lookup(&post.post_id).await {
            Ok(fresh) => fresh,
            Err(e) if !e.is_transient() => {
                warn!("Unusable lookup for {}, treating as gone: {}", post.post_id, e);
                None
            }
            Err(e) => {
                warn!("Lookup failed for {}: {}", post.post_id, e);
                let delay = Duration::from_std(self.config.poll_interval)
                    .unwrap_or_else(|_| Duration::seconds(60));
                let retry = Review {
                    next_check_at: Some(now + delay),
                    ..review.clone()
                };
                self.persist(post, review.status, retry, None).await;
                let outcome = ReviewOutcome::Deferred;
                self.record(outcome).await;
                return outcome;
            }
        };

        let metrics: Option<PostMetrics> = fresh.as_ref().map(|p| p.metrics);
        let status = decide(&review, metrics.map(|m| m.views), &self.config);
        debug!("Post {} views {:?} -> {:?}", post.post_id, metrics.map(|m| m.views), status);

        let next = match status {
            ReviewStatus::Recheck => Review {
                status,
                next_check_at: Some(now + self.config.second_delay),
                retries: review.retries + 1,
            },
            _ => Review { status, next_check_at: None, retries: review.retries },
        };

        if !self.persist(post, review.status, next, metrics).await {
            let outcome = ReviewOutcome::Skipped;
            self.record(outcome).await;
            return outcome;
        }

        let outcome = match status {
            ReviewStatus::Posted => {
                // Only the reviewer that won the transition announces it.
                let mut viral = fresh.unwrap_or_else(|| post.clone());
                viral.review = None;
                info!("Tweet went viral: {}", viral.url);
                self.notifier.deliver(&viral_post_notification(&viral, now)).await;
                ReviewOutcome::Posted
            }
            ReviewStatus::Recheck => ReviewOutcome::Recheck,
            _ => ReviewOutcome::Discarded,
        };
        self.record(outcome).await;
        outcome
    }

    async fn persist(
        &self,
        post: &Post,
        expected: ReviewStatus,
        review: Review,
        metrics: Option<PostMetrics>,
    ) -> bool {
        match self.store.transition(&post.post_id, expected, review, metrics).await {
            Ok(true) => true,
            Ok(false) => {
                debug!("Post {} already moved past {:?}", post.post_id, expected);
                false
            }
            Err(e) => {
                error!("Failed to update post {}: {}", post.post_id, e);
                false
            }
        }
    }

    /// Claims one batch of due posts and reviews them in order.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> usize {
        let now = Utc::now();
        let due = match self.store.claim_due(now, self.config.batch_size, self.config.lease).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due posts: {}", e);
                return 0;
            }
        };
        if !due.is_empty() {
            info!("Reviewing {} due posts", due.len());
        }

        let mut processed = 0;
        for post in &due {
            if cancel.is_cancelled() {
                break;
            }
            self.process_post(post, Utc::now()).await;
            processed += 1;
        }
        processed
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!("Starting review scheduler");
        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        info!("Review scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SearchPage;
    use crate::bot::notification::{Channel, Notification};
    use crate::error::SentinelError;
    use crate::models::PostAuthor;
    use crate::storage::SledPostStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Lookup {
        Views(u64),
        Gone,
        Fails,
        Malformed,
    }

    struct FakeApi {
        lookups: Mutex<HashMap<String, Lookup>>,
    }

    impl FakeApi {
        fn new(entries: Vec<(&str, Lookup)>) -> Self {
            Self {
                lookups: Mutex::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
            }
        }

        fn set(&self, id: &str, lookup: Lookup) {
            self.lookups.lock().unwrap().insert(id.to_string(), lookup);
        }
    }

    #[async_trait]
    impl ContentApi for FakeApi {
        async fn search(&self, _: &str, _: Option<&str>) -> Result<SearchPage, SentinelError> {
            Ok(SearchPage::default())
        }

        async fn lookup(&self, post_id: &str) -> Result<Option<Post>, SentinelError> {
            match self.lookups.lock().unwrap().get(post_id) {
                Some(Lookup::Views(views)) => {
                    let mut post = post(post_id);
                    post.metrics.views = *views;
                    Ok(Some(post))
                }
                Some(Lookup::Fails) => Err(SentinelError::TransientNetwork("timeout".into())),
                Some(Lookup::Malformed) => {
                    Err(SentinelError::MalformedData(format!("post {} without author", post_id)))
                }
                Some(Lookup::Gone) | None => Ok(None),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), SentinelError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn post(id: &str) -> Post {
        Post {
            post_id: id.to_string(),
            url: format!("https://x.com/dev/status/{}", id),
            author: PostAuthor { username: "dev".into(), followers: 900 },
            metrics: PostMetrics { views: 6000, ..Default::default() },
            text: "shipping".into(),
            media: vec![],
            created_at: Utc::now() - Duration::hours(2),
            review: None,
        }
    }

    fn config() -> ReviewConfig {
        ReviewConfig {
            second_delay: Duration::hours(3),
            recheck_views: 30_000,
            post_views: 100_000,
            batch_size: 10,
            poll_interval: std::time::Duration::from_secs(60),
            lease: Duration::minutes(5),
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        store: Arc<SledPostStore>,
        notifier: Arc<RecordingNotifier>,
        scheduler: ReviewScheduler,
    }

    async fn harness(entries: Vec<(&str, Lookup)>) -> Harness {
        let api = Arc::new(FakeApi::new(entries));
        let store = Arc::new(SledPostStore::temporary().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = ReviewScheduler::new(api.clone(), store.clone(), notifier.clone(), config());
        Harness { api, store, notifier, scheduler }
    }

    async fn queue(store: &SledPostStore, id: &str) -> Post {
        let mut p = post(id);
        p.review = Some(Review::queued(Utc::now() - Duration::seconds(1)));
        store.insert_if_absent(&p).await.unwrap();
        p
    }

    #[test]
    fn test_decide() {
        let config = config();
        let queued = Review::queued(Utc::now());
        let rechecked = Review { status: ReviewStatus::Recheck, next_check_at: None, retries: 1 };

        assert_eq!(decide(&queued, None, &config), ReviewStatus::Discarded);
        assert_eq!(decide(&queued, Some(100_000), &config), ReviewStatus::Posted);
        assert_eq!(decide(&queued, Some(30_000), &config), ReviewStatus::Recheck);
        assert_eq!(decide(&queued, Some(29_999), &config), ReviewStatus::Discarded);
        assert_eq!(decide(&rechecked, Some(50_000), &config), ReviewStatus::Discarded);
        assert_eq!(decide(&rechecked, Some(120_000), &config), ReviewStatus::Posted);
    }

    #[tokio::test]
    async fn test_low_views_discarded() {
        let h = harness(vec![("1", Lookup::Views(1200))]).await;
        let p = queue(&h.store, "1").await;

        assert_eq!(h.scheduler.process_post(&p, Utc::now()).await, ReviewOutcome::Discarded);
        let stored = h.store.get("1").await.unwrap().unwrap();
        assert_eq!(stored.status(), Some(ReviewStatus::Discarded));
        assert_eq!(stored.metrics.views, 1200);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_warming_post_gets_one_recheck() {
        let h = harness(vec![("1", Lookup::Views(45_000))]).await;
        let p = queue(&h.store, "1").await;
        let now = Utc::now();

        assert_eq!(h.scheduler.process_post(&p, now).await, ReviewOutcome::Recheck);
        let stored = h.store.get("1").await.unwrap().unwrap();
        let review = stored.review.clone().unwrap();
        assert_eq!(review.status, ReviewStatus::Recheck);
        assert_eq!(review.retries, 1);
        assert_eq!(review.next_check_at, Some(now + Duration::hours(3)));

        // Still short of the posting threshold on the second look.
        assert_eq!(h.scheduler.process_post(&stored, now).await, ReviewOutcome::Discarded);
        assert_eq!(h.store.get("1").await.unwrap().unwrap().status(), Some(ReviewStatus::Discarded));
    }

    #[tokio::test]
    async fn test_viral_post_announced_once() {
        let h = harness(vec![("1", Lookup::Views(250_000))]).await;
        let p = queue(&h.store, "1").await;

        assert_eq!(h.scheduler.process_post(&p, Utc::now()).await, ReviewOutcome::Posted);
        // A stale copy of the same claim loses the transition.
        assert_eq!(h.scheduler.process_post(&p, Utc::now()).await, ReviewOutcome::Skipped);

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, Channel::Viral);
        assert_eq!(h.store.get("1").await.unwrap().unwrap().status(), Some(ReviewStatus::Posted));
    }

    #[tokio::test]
    async fn test_deleted_post_discarded() {
        let h = harness(vec![("1", Lookup::Gone)]).await;
        let p = queue(&h.store, "1").await;

        assert_eq!(h.scheduler.process_post(&p, Utc::now()).await, ReviewOutcome::Discarded);
        assert_eq!(h.store.get("1").await.unwrap().unwrap().status(), Some(ReviewStatus::Discarded));
    }

    #[tokio::test]
    async fn test_malformed_lookup_discards() {
        let h = harness(vec![("1", Lookup::Malformed)]).await;
        let p = queue(&h.store, "1").await;

        assert_eq!(h.scheduler.process_post(&p, Utc::now()).await, ReviewOutcome::Discarded);
        let stored = h.store.get("1").await.unwrap().unwrap();
        assert_eq!(stored.status(), Some(ReviewStatus::Discarded));
        // Terminal: the next cycle has nothing left to claim.
        let later = Utc::now() + Duration::days(1);
        assert!(h.store.claim_due(later, 10, Duration::minutes(5)).await.unwrap().is_empty());
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_reschedules() {
        let h = harness(vec![("1", Lookup::Fails)]).await;
        let p = queue(&h.store, "1").await;
        let now = Utc::now();

        assert_eq!(h.scheduler.process_post(&p, now).await, ReviewOutcome::Deferred);
        let review = h.store.get("1").await.unwrap().unwrap().review.unwrap();
        assert_eq!(review.status, ReviewStatus::Queued);
        assert_eq!(review.next_check_at, Some(now + Duration::seconds(60)));

        h.api.set("1", Lookup::Views(150_000));
        let stored = h.store.get("1").await.unwrap().unwrap();
        assert_eq!(h.scheduler.process_post(&stored, now).await, ReviewOutcome::Posted);
    }

    #[tokio::test]
    async fn test_cycle_claims_only_due_posts() {
        let h = harness(vec![("due", Lookup::Views(10)), ("later", Lookup::Views(10))]).await;
        queue(&h.store, "due").await;
        let mut later = post("later");
        later.review = Some(Review::queued(Utc::now() + Duration::hours(1)));
        h.store.insert_if_absent(&later).await.unwrap();

        assert_eq!(h.scheduler.run_cycle(&CancellationToken::new()).await, 1);
        assert_eq!(h.store.get("due").await.unwrap().unwrap().status(), Some(ReviewStatus::Discarded));
        assert_eq!(h.store.get("later").await.unwrap().unwrap().status(), Some(ReviewStatus::Queued));
        assert_eq!(h.scheduler.get_stats().await.discarded, 1);
    }
}
