use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Launch platforms whose migrations are watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Pump,
    Bonk,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Pump => "💊 Pump Fun",
            Platform::Bonk => "🔨 Bonk",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Pump => write!(f, "pump"),
            Platform::Bonk => write!(f, "bonk"),
        }
    }
}

/// One detected migration. Produced by the pipeline and consumed right away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    pub platform: Platform,
    pub mint: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub address: String,
    /// Integer percentage of total supply, 0..=100.
    pub allocation: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldersInfo {
    /// Descending by allocation.
    pub top_holders: Vec<Holder>,
    pub dev_allocation: u8,
    /// Always the sum of `top_holders` allocations.
    pub top_holders_allocation: u32,
}

/// Static metadata served by a launch platform's API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    pub creator: String,
    pub image_url: String,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats24h {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub num_buys: u64,
    pub num_sells: u64,
    pub num_traders: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub holder_count: u64,
    pub organic_score_label: String,
    pub stats_24h: Option<TradeStats24h>,
}

/// Everything a bond notification needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAsset {
    pub metadata: AssetMetadata,
    pub holders: HoldersInfo,
    pub stats: Option<TokenStats>,
    pub fill_time: String,
    pub platform_url: String,
    pub dex_url: String,
}

impl TokenAsset {
    pub fn mint(&self) -> &str {
        &self.metadata.mint
    }
}

/// Human readable time elapsed between `created_at` and `now`, bucketed
/// into minutes, hours or days.
pub fn calculate_fill_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at).num_seconds().max(0);

    if elapsed >= 86_400 {
        plural(elapsed / 86_400, "day")
    } else if elapsed >= 3_600 {
        plural(elapsed / 3_600, "hour")
    } else {
        plural(elapsed / 60, "minute")
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count <= 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}
