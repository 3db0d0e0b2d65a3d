use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::retry::RetryPolicy;
use crate::api::ContentApi;
use crate::error::SentinelError;
use crate::models::{MediaKind, MediaRef, Post, PostAuthor, PostMetrics};

/// `createdAt` format used by the feed, e.g. "Tue Dec 10 07:00:30 +0000 2024".
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}

/// Client for the twitterapi.io search + lookup endpoints.
#[derive(Debug, Clone)]
pub struct SocialClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tweets: Vec<RawTweet>,
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    tweets: Vec<RawTweet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTweet {
    id: Option<String>,
    url: Option<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    view_count: u64,
    created_at: Option<String>,
    author: Option<RawAuthor>,
    #[serde(default)]
    extended_entities: Option<RawEntities>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAuthor {
    user_name: Option<String>,
    #[serde(default)]
    followers: u64,
}

#[derive(Debug, Deserialize)]
struct RawEntities {
    #[serde(default)]
    media: Vec<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(rename = "type")]
    kind: String,
    media_url_https: Option<String>,
    video_info: Option<RawVideoInfo>,
}

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    #[serde(default)]
    variants: Vec<RawVariant>,
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    #[serde(default)]
    bitrate: Option<u64>,
    content_type: Option<String>,
    url: Option<String>,
}

impl SocialClient {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry: RetryPolicy::rest(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SentinelError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Social API error on {}: {} - {}", endpoint, status, error_text);
            return Err(SentinelError::TransientNetwork(format!("HTTP error! Status: {}", status)));
        }
        Ok(response.json().await?)
    }
}

impl SocialClient {
    pub async fn search_page(&self, query: &str, cursor: Option<&str>) -> Result<SearchPage, SentinelError> {
        debug!("Searching posts (cursor: {:?})", cursor);
        let mut params = vec![("query", query), ("queryType", "Top")];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }

        let body: SearchResponse = self.get_json("/twitter/tweet/advanced_search", &params).await?;
        let has_next_page = body.has_next_page;
        let posts = body
            .tweets
            .into_iter()
            .filter_map(|raw| match raw.into_post() {
                Ok(post) => Some(post),
                Err(e) => {
                    debug!("Skipping malformed post: {}", e);
                    None
                }
            })
            .collect();

        Ok(SearchPage {
            posts,
            next_cursor: body
                .next_cursor
                .filter(|c| has_next_page && !c.is_empty()),
        })
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>, SentinelError> {
        let body: LookupResponse = self
            .get_json("/twitter/tweets", &[("tweet_ids", post_id)])
            .await?;
        match body.tweets.into_iter().next() {
            Some(raw) => raw.into_post().map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ContentApi for SocialClient {
    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<SearchPage, SentinelError> {
        let page = self
            .retry
            .fetch_rest("social search", || async move {
                self.search_page(query, cursor).await.map(Some)
            })
            .await?;
        Ok(page.unwrap_or_default())
    }

    async fn lookup(&self, post_id: &str) -> Result<Option<Post>, SentinelError> {
        self.retry
            .fetch_rest("social lookup", || self.get_post(post_id))
            .await
    }
}

impl RawTweet {
    fn into_post(self) -> Result<Post, SentinelError> {
        let post_id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SentinelError::MalformedData("post without id".to_string()))?;
        let author = self
            .author
            .and_then(|a| a.user_name.map(|username| PostAuthor { username, followers: a.followers }))
            .ok_or_else(|| SentinelError::MalformedData(format!("post {} without author", post_id)))?;
        let created_at = self
            .created_at
            .as_deref()
            .and_then(parse_created_at)
            .ok_or_else(|| SentinelError::MalformedData(format!("post {} without createdAt", post_id)))?;

        let url = self
            .url
            .unwrap_or_else(|| format!("https://x.com/{}/status/{}", author.username, post_id));
        let media = self
            .extended_entities
            .map(|e| e.media.into_iter().filter_map(RawMedia::into_media_ref).collect())
            .unwrap_or_default();

        Ok(Post {
            post_id,
            url,
            author,
            metrics: PostMetrics {
                views: self.view_count,
                likes: self.like_count,
                replies: self.reply_count,
                retweets: self.retweet_count,
            },
            text: self.text,
            media,
            created_at,
            review: None,
        })
    }
}

impl RawMedia {
    fn into_media_ref(self) -> Option<MediaRef> {
        match self.kind.as_str() {
            "photo" => self.media_url_https.map(|url| MediaRef { kind: MediaKind::Photo, url }),
            "video" | "animated_gif" => {
                let kind = if self.kind == "video" { MediaKind::Video } else { MediaKind::Gif };
                // Highest bitrate mp4 variant.
                self.video_info
                    .and_then(|info| {
                        info.variants
                            .into_iter()
                            .filter(|v| v.content_type.as_deref() == Some("video/mp4"))
                            .max_by_key(|v| v.bitrate.unwrap_or(0))
                            .and_then(|v| v.url)
                    })
                    .map(|url| MediaRef { kind, url })
            }
            _ => None,
        }
    }
}

fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
