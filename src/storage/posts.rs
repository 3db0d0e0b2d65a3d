// src/storage/posts.rs
//
// Post records keyed by post id, plus a due index ordered by next check
// time. Both trees are only ever written together in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::SentinelError;
use crate::models::{Post, PostMetrics, Review, ReviewStatus};

const POSTS_TREE: &str = "posts";
const DUE_TREE: &str = "posts_due";

/// Persistence seam for the ingestor and the review scheduler.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Inserts a new record. `Ok(false)` if the post id is already known.
    async fn insert_if_absent(&self, post: &Post) -> Result<bool, SentinelError>;

    async fn get(&self, post_id: &str) -> Result<Option<Post>, SentinelError>;

    /// Up to `limit` active posts with `next_check_at <= now`, oldest first.
    /// Each returned post has its `next_check_at` pushed to `now + lease`
    /// so a concurrent claimer skips it.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<Post>, SentinelError>;

    /// Replaces the review (and metrics, if given) only while the stored
    /// status is still `expected`. Returns whether the write happened.
    async fn transition(
        &self,
        post_id: &str,
        expected: ReviewStatus,
        review: Review,
        metrics: Option<PostMetrics>,
    ) -> Result<bool, SentinelError>;

    async fn flush(&self) -> Result<(), SentinelError>;
}

/// Required fields for a stored post.
pub fn validate_post(post: &Post) -> Result<(), SentinelError> {
    if post.post_id.trim().is_empty() {
        return Err(SentinelError::MalformedData("post_id is required".to_string()));
    }
    if post.author.username.trim().is_empty() {
        return Err(SentinelError::MalformedData(format!("post {}: author is required", post.post_id)));
    }
    Ok(())
}

fn due_key(at: DateTime<Utc>, post_id: &str) -> Vec<u8> {
    let millis = at.timestamp_millis().max(0) as u64;
    let mut key = millis.to_be_bytes().to_vec();
    key.extend_from_slice(post_id.as_bytes());
    key
}

fn due_millis(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes) as i64)
}

fn encode(post: &Post) -> Result<Vec<u8>, SentinelError> {
    Ok(serde_json::to_vec(post)?)
}

fn decode(bytes: &[u8]) -> Result<Post, SentinelError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn abort(e: SentinelError) -> ConflictableTransactionError<SentinelError> {
    ConflictableTransactionError::Abort(e)
}

fn unwrap_tx<T>(result: Result<T, TransactionError<SentinelError>>) -> Result<T, SentinelError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(e.into()),
    }
}

/// Due-index entry for an active review, if it has one.
fn active_due_key(post: &Post) -> Option<Vec<u8>> {
    post.review
        .as_ref()
        .filter(|r| !r.status.is_terminal())
        .and_then(|r| r.next_check_at)
        .map(|at| due_key(at, &post.post_id))
}

fn write_post(
    posts: &TransactionalTree,
    due: &TransactionalTree,
    previous: Option<&Post>,
    post: &Post,
) -> Result<(), ConflictableTransactionError<SentinelError>> {
    if let Some(old_key) = previous.and_then(active_due_key) {
        due.remove(old_key)?;
    }
    if let Some(new_key) = active_due_key(post) {
        due.insert(new_key, post.post_id.as_bytes())?;
    }
    posts.insert(post.post_id.as_bytes(), encode(post).map_err(abort)?)?;
    Ok(())
}

pub struct SledPostStore {
    db: Db,
    posts: Tree,
    due: Tree,
}

impl SledPostStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SentinelError> {
        let db = sled::open(path.as_ref())?;
        info!("Opened post store at {}", path.as_ref().display());
        Self::from_db(db)
    }

    /// In-memory store, removed on drop.
    pub fn temporary() -> Result<Self, SentinelError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, SentinelError> {
        Ok(Self {
            posts: db.open_tree(POSTS_TREE)?,
            due: db.open_tree(DUE_TREE)?,
            db,
        })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Claims one due entry unless another claimer got there first.
    fn claim_one(&self, key: &[u8], post_id: &[u8], leased_until: DateTime<Utc>) -> Result<Option<Post>, SentinelError> {
        let result = (&self.posts, &self.due).transaction(|(posts, due)| {
            if due.get(key)?.is_none() {
                return Ok(None);
            }
            let Some(raw) = posts.get(post_id)? else {
                // Dangling index entry.
                due.remove(key)?;
                return Ok(None);
            };
            let previous = match decode(&raw) {
                Ok(post) => post,
                Err(e) => {
                    // Unreadable record: unindex it and move on.
                    warn!("Dropping unreadable post {} from review: {}", String::from_utf8_lossy(post_id), e);
                    due.remove(key)?;
                    return Ok(None);
                }
            };
            if active_due_key(&previous).as_deref() != Some(key) {
                due.remove(key)?;
                return Ok(None);
            }

            let mut claimed = previous.clone();
            if let Some(review) = claimed.review.as_mut() {
                review.next_check_at = Some(leased_until);
            }
            write_post(posts, due, Some(&previous), &claimed)?;
            Ok(Some(claimed))
        });
        unwrap_tx(result)
    }
}

#[async_trait]
impl PostStore for SledPostStore {
    async fn insert_if_absent(&self, post: &Post) -> Result<bool, SentinelError> {
        validate_post(post)?;
        let result = (&self.posts, &self.due).transaction(|(posts, due)| {
            if posts.get(post.post_id.as_bytes())?.is_some() {
                return Ok(false);
            }
            write_post(posts, due, None, post)?;
            Ok(true)
        });
        let inserted = unwrap_tx(result)?;
        if !inserted {
            debug!("Post {} already known", post.post_id);
        }
        Ok(inserted)
    }

    async fn get(&self, post_id: &str) -> Result<Option<Post>, SentinelError> {
        match self.posts.get(post_id.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<Post>, SentinelError> {
        let now_millis = now.timestamp_millis();
        let leased_until = now + lease;
        let mut claimed = Vec::new();

        // Snapshot of candidate keys; each is re-checked inside its own
        // transaction.
        let candidates: Vec<(sled::IVec, sled::IVec)> = self
            .due
            .iter()
            .take_while(|entry| match entry {
                Ok((key, _)) => due_millis(key).map_or(false, |at| at <= now_millis),
                Err(_) => true,
            })
            .collect::<Result<_, _>>()?;

        for (key, post_id) in candidates {
            if claimed.len() >= limit {
                break;
            }
            if let Some(post) = self.claim_one(&key, &post_id, leased_until)? {
                claimed.push(post);
            }
        }
        Ok(claimed)
    }

    async fn transition(
        &self,
        post_id: &str,
        expected: ReviewStatus,
        review: Review,
        metrics: Option<PostMetrics>,
    ) -> Result<bool, SentinelError> {
        let result = (&self.posts, &self.due).transaction(|(posts, due)| {
            let Some(raw) = posts.get(post_id.as_bytes())? else {
                return Ok(false);
            };
            let previous = decode(&raw).map_err(abort)?;
            if previous.status() != Some(expected) {
                return Ok(false);
            }

            let mut updated = previous.clone();
            updated.review = Some(review.clone());
            if let Some(metrics) = metrics {
                updated.metrics = metrics;
            }
            write_post(posts, due, Some(&previous), &updated)?;
            Ok(true)
        });
        unwrap_tx(result)
    }

    async fn flush(&self) -> Result<(), SentinelError> {
        self.db.flush_async().await?;
        Ok(())
    }
}
