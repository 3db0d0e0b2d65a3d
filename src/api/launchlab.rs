use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::pump::{millis_to_datetime, non_empty};
use crate::api::retry::RetryPolicy;
use crate::api::AssetMetadataSource;
use crate::error::SentinelError;
use crate::models::AssetMetadata;

/// Raydium LaunchLab mint-info service (backs letsbonk.fun).
pub const LAUNCHLAB_API_BASE_URL: &str = "https://launch-mint-v1.raydium.io";

#[derive(Debug, Clone)]
pub struct LaunchLabClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct MintsResponse {
    success: bool,
    data: Option<MintsData>,
}

#[derive(Debug, Deserialize)]
struct MintsData {
    #[serde(default)]
    rows: Vec<LaunchLabCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchLabCoin {
    mint: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    img_url: Option<String>,
    twitter: Option<String>,
    telegram: Option<String>,
    website: Option<String>,
    creator: Option<String>,
    /// Milliseconds since epoch.
    create_at: Option<i64>,
}

impl LaunchLabClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, LAUNCHLAB_API_BASE_URL)
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

    pub async fn get_coin(&self, mint: &str) -> Result<Option<AssetMetadata>, SentinelError> {
        let url = format!("{}/get/by/mints", self.base_url);
        debug!("Fetching launchlab coin {}: {}", mint, url);

        let response = self.client.get(&url).query(&[("ids", mint)]).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            warn!("LaunchLab API error for {}: {}", mint, status);
            return Err(SentinelError::TransientNetwork(format!("HTTP error! Status: {}", status)));
        }

        let body: MintsResponse = response.json().await?;
        if !body.success {
            return Err(SentinelError::TransientNetwork(
                "LaunchLab API reported failure".to_string(),
            ));
        }

        let row = body
            .data
            .map(|d| d.rows)
            .unwrap_or_default()
            .into_iter()
            .find(|row| row.mint.as_deref() == Some(mint));

        match row {
            Some(coin) => coin.into_metadata().map(Some),
            None => Ok(None),
        }
    }
}

impl LaunchLabCoin {
    fn into_metadata(self) -> Result<AssetMetadata, SentinelError> {
        let missing = |field: &str| SentinelError::MalformedData(format!("launchlab coin missing {}", field));
        let mint = non_empty(self.mint).ok_or_else(|| missing("mint"))?;
        let creator = non_empty(self.creator).ok_or_else(|| missing("creator"))?;
        let created_ms = self.create_at.ok_or_else(|| missing("createAt"))?;

        Ok(AssetMetadata {
            mint,
            name: self.name.unwrap_or_default(),
            symbol: self.symbol.unwrap_or_default(),
            creator,
            image_url: self.img_url.unwrap_or_default(),
            twitter: non_empty(self.twitter),
            telegram: non_empty(self.telegram),
            website: non_empty(self.website),
            created_at: millis_to_datetime(created_ms)?,
        })
    }
}

#[async_trait]
impl AssetMetadataSource for LaunchLabClient {
    async fn fetch_asset(&self, mint: &str) -> Result<Option<AssetMetadata>, SentinelError> {
        self.retry
            .fetch_rest("launchlab coin", || self.get_coin(mint))
            .await
    }
}
