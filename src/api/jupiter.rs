use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::retry::RetryPolicy;
use crate::api::TokenStatsSource;
use crate::error::SentinelError;
use crate::models::{TokenStats, TradeStats24h};

const JUPITER_DATA_BASE_URL: &str = "https://datapi.jup.ag/v1";
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Token search on Jupiter's data API: holder count, organic score and
/// rolling 24h trade aggregates.
#[derive(Debug, Clone)]
pub struct JupiterClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct AssetSearchItem {
    id: String,
    #[serde(default)]
    holder_count: Option<u64>,
    #[serde(default)]
    organic_score_label: Option<String>,
    #[serde(default)]
    stats24h: Option<Stats24h>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct Stats24h {
    #[serde(default)]
    buy_volume: f64,
    #[serde(default)]
    sell_volume: f64,
    #[serde(default)]
    num_buys: u64,
    #[serde(default)]
    num_sells: u64,
    #[serde(default)]
    num_traders: u64,
}

impl JupiterClient {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, JUPITER_DATA_BASE_URL)
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

    pub async fn get_token_stats(&self, mint: &str) -> Result<Option<TokenStats>, SentinelError> {
        let url = format!("{}/assets/search", self.base_url);
        debug!("Fetching token stats from Jupiter for {}: {}", mint, url);

        let response = self.client.get(&url).query(&[("query", mint)]).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            warn!("Jupiter stats API error for token {}: {}", mint, status);
            return Err(SentinelError::TransientNetwork(format!("HTTP error! Status: {}", status)));
        }

        let items: Vec<AssetSearchItem> = response.json().await?;
        Ok(items.into_iter().find(|item| item.id == mint).map(|item| TokenStats {
            holder_count: item.holder_count.unwrap_or(0),
            organic_score_label: item.organic_score_label.unwrap_or_default(),
            stats_24h: item.stats24h.map(|s| TradeStats24h {
                buy_volume: s.buy_volume,
                sell_volume: s.sell_volume,
                num_buys: s.num_buys,
                num_sells: s.num_sells,
                num_traders: s.num_traders,
            }),
        }))
    }
}

#[async_trait]
impl TokenStatsSource for JupiterClient {
    async fn fetch_stats(&self, mint: &str) -> Result<Option<TokenStats>, SentinelError> {
        self.retry
            .fetch_rest("token stats", || self.get_token_stats(mint))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stats_for_matching_asset() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/assets/search")
            .match_query(Matcher::UrlEncoded("query".into(), "MintAbc".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"id":"Other","holderCount":1},
                    {"id":"MintAbc","holderCount":812,"organicScoreLabel":"medium",
                     "stats24h":{"buyVolume":15234.5,"sellVolume":9000.25,"numBuys":410,"numSells":233,"numTraders":301}}]"#,
            )
            .create_async()
            .await;

        let client = JupiterClient::with_base_url(Client::new(), &server.url())
            .with_retry(RetryPolicy::new(1, Duration::ZERO));
        let stats = client.fetch_stats("MintAbc").await.unwrap().unwrap();

        assert_eq!(stats.holder_count, 812);
        assert_eq!(stats.organic_score_label, "medium");
        let day = stats.stats_24h.unwrap();
        assert_eq!(day.num_buys, 410);
        assert_eq!(day.num_traders, 301);
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/assets/search")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let client = JupiterClient::with_base_url(Client::new(), &server.url())
            .with_retry(RetryPolicy::new(2, Duration::ZERO));
        let result = client.fetch_stats("MintAbc").await;
        assert!(matches!(result, Err(SentinelError::TransientNetwork(_))));
    }
}
