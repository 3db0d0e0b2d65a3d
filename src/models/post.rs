use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub username: String,
    pub followers: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetrics {
    pub views: u64,
    pub likes: u64,
    pub replies: u64,
    pub retweets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Gif,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Queued,
    Recheck,
    Posted,
    Discarded,
}

impl ReviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReviewStatus::Posted | ReviewStatus::Discarded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub status: ReviewStatus,
    pub next_check_at: Option<DateTime<Utc>>,
    pub retries: u32,
}

impl Review {
    pub fn queued(next_check_at: DateTime<Utc>) -> Self {
        Self {
            status: ReviewStatus::Queued,
            next_check_at: Some(next_check_at),
            retries: 0,
        }
    }
}

/// A tweet as stored in the posts database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub url: String,
    pub author: PostAuthor,
    pub metrics: PostMetrics,
    pub text: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub review: Option<Review>,
}

impl Post {
    pub fn status(&self) -> Option<ReviewStatus> {
        self.review.as_ref().map(|r| r.status)
    }
}
