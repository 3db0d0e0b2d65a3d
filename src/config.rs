use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// letsbonk.fun platform config account on the LaunchLab program.
pub const DEFAULT_BONK_CONFIG: &str = "FfYek5vEz23cMkWsdJwG2oa6EphsvXSHrGpdALN4g6W1";

pub const DEFAULT_SOCIAL_API_URL: &str = "https://api.twitterapi.io";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub solana_rpc_url: String,
    pub solana_ws_url: String,

    pub telegram_bot_token: String,
    pub main_group_id: i64,
    pub viral_group_id: i64,
    pub pump_topic_id: Option<i32>,
    pub bonk_topic_id: Option<i32>,
    pub tweets_topic_id: Option<i32>,
    pub viral_topic_id: Option<i32>,

    pub bonds_full_stats: bool,
    pub enable_pump: bool,
    pub enable_bonk: bool,
    pub enable_social: bool,
    pub bonk_config_addresses: Vec<String>,

    pub social_api_url: String,
    pub social_api_key: Option<String>,

    pub x_min_faves: u32,
    pub x_max_faves: u32,
    pub x_min_replies: u32,
    pub x_max_replies: u32,
    pub x_min_retweets: u32,
    pub x_max_retweets: u32,
    pub x_filter_user_max_followers: u64,
    pub x_filter_post_min_views: u64,
    pub x_fetch_interval_secs: u64,
    pub x_max_pages_per_cycle: u32,

    pub review_first_delay_secs: u64,
    pub review_second_delay_secs: u64,
    pub review_recheck_views: u64,
    pub review_post_views: u64,
    pub review_batch_size: usize,
    pub review_poll_interval_secs: u64,

    pub database_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. `load` feeds it the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key).with_context(|| format!("{} not set in environment", key))
        };
        let flag = |key: &str, default: bool| -> bool {
            lookup(key)
                .map(|v| v.trim().to_lowercase() == "true")
                .unwrap_or(default)
        };

        let main_group_id = required("MAIN_GROUP_ID")?
            .trim()
            .parse::<i64>()
            .context("Failed to parse MAIN_GROUP_ID as integer")?;

        let viral_group_id = match lookup("VIRAL_GROUP_ID") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .context("Failed to parse VIRAL_GROUP_ID as integer")?,
            None => main_group_id,
        };

        let bonk_config_addresses = lookup("BONK_CONFIG_ADDRESSES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_BONK_CONFIG.to_string()]);

        let enable_social = flag("ENABLE_SOCIAL", true);
        let social_api_key = lookup("SOCIAL_API_KEY");
        if enable_social && social_api_key.is_none() {
            anyhow::bail!("SOCIAL_API_KEY must be set when ENABLE_SOCIAL is true");
        }

        Ok(Self {
            solana_rpc_url: required("SOLANA_RPC_URL")?,
            solana_ws_url: required("SOLANA_WS_URL")?,

            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            main_group_id,
            viral_group_id,
            pump_topic_id: parse_optional(&lookup, "PUMP_TOPIC_ID")?,
            bonk_topic_id: parse_optional(&lookup, "BONK_TOPIC_ID")?,
            tweets_topic_id: parse_optional(&lookup, "TWEETS_TOPIC_ID")?,
            viral_topic_id: parse_optional(&lookup, "VIRAL_TOPIC_ID")?,

            bonds_full_stats: flag("BONDS_FULL_STATS", true),
            enable_pump: flag("ENABLE_PUMP", true),
            enable_bonk: flag("ENABLE_BONK", true),
            enable_social,
            bonk_config_addresses,

            social_api_url: lookup("SOCIAL_API_URL")
                .unwrap_or_else(|| DEFAULT_SOCIAL_API_URL.to_string()),
            social_api_key,

            x_min_faves: parse_or(&lookup, "X_SCRAPPER_MIN_FAVES", 50)?,
            x_max_faves: parse_or(&lookup, "X_SCRAPPER_MAX_FAVES", 500)?,
            x_min_replies: parse_or(&lookup, "X_SCRAPPER_MIN_REPLIES", 10)?,
            x_max_replies: parse_or(&lookup, "X_SCRAPPER_MAX_REPLIES", 100)?,
            x_min_retweets: parse_or(&lookup, "X_SCRAPPER_MIN_RETWEETS", 10)?,
            x_max_retweets: parse_or(&lookup, "X_SCRAPPER_MAX_RETWEETS", 100)?,
            x_filter_user_max_followers: parse_or(&lookup, "X_FILTER_USER_MAX_FOLLOWERS", 5000)?,
            x_filter_post_min_views: parse_or(&lookup, "X_FILTER_POST_MIN_VIEWS", 5000)?,
            x_fetch_interval_secs: parse_or(&lookup, "X_SCRAPPER_FETCH_INTERVAL", 300)?,
            x_max_pages_per_cycle: parse_or(&lookup, "X_MAX_PAGES_PER_CYCLE", 5)?,

            review_first_delay_secs: parse_or(&lookup, "REVIEW_FIRST_DELAY_SECS", 3600)?,
            review_second_delay_secs: parse_or(&lookup, "REVIEW_SECOND_DELAY_SECS", 3600)?,
            review_recheck_views: parse_or(&lookup, "REVIEW_RECHECK_VIEWS", 20_000)?,
            review_post_views: parse_or(&lookup, "REVIEW_POST_VIEWS", 50_000)?,
            review_batch_size: parse_or(&lookup, "REVIEW_BATCH_SIZE", 20)?,
            review_poll_interval_secs: parse_or(&lookup, "REVIEW_POLL_INTERVAL_SECS", 30)?,

            database_path: lookup("DATABASE_PATH").unwrap_or_else(|| "data/posts.sled".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key)),
        None => Ok(default),
    }
}

fn parse_optional<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Failed to parse {}", key)),
        _ => Ok(None),
    }
}
