use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::retry::RetryPolicy;
use crate::api::AssetMetadataSource;
use crate::error::SentinelError;
use crate::models::AssetMetadata;

pub const PUMP_API_BASE_URL: &str = "https://frontend-api-v3.pump.fun";

#[derive(Debug, Clone)]
pub struct PumpClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

/// Subset of the /coins/{mint} payload we care about.
#[derive(Debug, Deserialize)]
struct PumpCoin {
    mint: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    image_uri: Option<String>,
    twitter: Option<String>,
    telegram: Option<String>,
    website: Option<String>,
    creator: Option<String>,
    /// Milliseconds since epoch.
    created_timestamp: Option<i64>,
}

impl PumpClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, PUMP_API_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::rest(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One GET of /coins/{mint}. `Ok(None)` when pump.fun does not know the mint.
    pub async fn get_coin(&self, mint: &str) -> Result<Option<AssetMetadata>, SentinelError> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        debug!("Fetching pump coin {}: {}", mint, url);

        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            warn!("Pump API error for {}: {}", mint, status);
            return Err(SentinelError::TransientNetwork(format!("HTTP error! Status: {}", status)));
        }

        let coin: PumpCoin = response.json().await?;
        coin.into_metadata().map(Some)
    }
}

impl PumpCoin {
    fn into_metadata(self) -> Result<AssetMetadata, SentinelError> {
        let mint = non_empty(self.mint).ok_or_else(|| invalid("mint"))?;
        let creator = non_empty(self.creator).ok_or_else(|| invalid("creator"))?;
        let created_ms = self.created_timestamp.ok_or_else(|| invalid("created_timestamp"))?;

        Ok(AssetMetadata {
            mint,
            name: self.name.unwrap_or_default(),
            symbol: self.symbol.unwrap_or_default(),
            creator,
            image_url: self.image_uri.unwrap_or_default(),
            twitter: non_empty(self.twitter),
            telegram: non_empty(self.telegram),
            website: non_empty(self.website),
            created_at: millis_to_datetime(created_ms)?,
        })
    }
}

#[async_trait]
impl AssetMetadataSource for PumpClient {
    async fn fetch_asset(&self, mint: &str) -> Result<Option<AssetMetadata>, SentinelError> {
        self.retry
            .fetch_rest("pump coin", || self.get_coin(mint))
            .await
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, SentinelError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| SentinelError::MalformedData(format!("bad timestamp {}", ms)))
}

fn invalid(field: &str) -> SentinelError {
    SentinelError::MalformedData(format!("Invalid Data: missing {}", field))
}
