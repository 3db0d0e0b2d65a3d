use std::sync::Arc;

use crate::api::AssetMetadataSource;
use crate::bonds::classifier::{LogRule, TransactionClassifier, VerifyRule};
use crate::models::Platform;

/// pump.fun migration authority; every graduation transaction mentions it.
pub const PUMP_MIGRATION_ADDRESS: &str = "39azUYFWPz3VHgKCf3VChUwbpURdCHRxjWVowf5jUJjg";
/// Raydium LaunchLab program (letsbonk.fun pools).
pub const LAUNCHLAB_MIGRATION_ADDRESS: &str = "LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj";

const DEX_SCREENER_URL: &str = "https://dexscreener.com/solana";

/// Which holders are left out of the top-holders sum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationRule {
    /// Owners (or their token accounts) never counted as holders.
    pub exclude_owners: Vec<String>,
    /// Drop the largest remaining holder, normally the fresh pool.
    pub drop_largest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevLinkStyle {
    PumpProfile,
    Solscan,
}

/// Everything that differs between launch platforms. The pipeline is the
/// same for all of them.
#[derive(Clone)]
pub struct PlatformDescriptor {
    pub platform: Platform,
    pub migration_address: String,
    pub classifier: TransactionClassifier,
    pub allocation: AllocationRule,
    pub dev_link: DevLinkStyle,
    token_page_prefix: &'static str,
    pub metadata: Arc<dyn AssetMetadataSource>,
}

impl PlatformDescriptor {
    pub fn pump(metadata: Arc<dyn AssetMetadataSource>) -> Self {
        Self {
            platform: Platform::Pump,
            migration_address: PUMP_MIGRATION_ADDRESS.to_string(),
            classifier: TransactionClassifier::new(LogRule::MigrateOnce, VerifyRule::Always),
            allocation: AllocationRule {
                exclude_owners: vec![PUMP_MIGRATION_ADDRESS.to_string()],
                drop_largest: true,
            },
            dev_link: DevLinkStyle::PumpProfile,
            token_page_prefix: "https://pump.fun/",
            metadata,
        }
    }

    pub fn bonk(metadata: Arc<dyn AssetMetadataSource>, config_addresses: Vec<String>) -> Self {
        Self {
            platform: Platform::Bonk,
            migration_address: LAUNCHLAB_MIGRATION_ADDRESS.to_string(),
            classifier: TransactionClassifier::new(
                LogRule::MigrateToSwapWithBurn,
                VerifyRule::MentionsAny(config_addresses),
            ),
            allocation: AllocationRule {
                exclude_owners: Vec::new(),
                drop_largest: true,
            },
            dev_link: DevLinkStyle::Solscan,
            token_page_prefix: "https://letsbonk.fun/token/",
            metadata,
        }
    }

    pub fn label(&self) -> &'static str {
        self.platform.label()
    }

    pub fn token_url(&self, mint: &str) -> String {
        format!("{}{}", self.token_page_prefix, mint)
    }

    pub fn dex_url(&self, mint: &str) -> String {
        format!("{}/{}", DEX_SCREENER_URL, mint)
    }

    pub fn dev_url(&self, creator: &str) -> String {
        match self.dev_link {
            DevLinkStyle::PumpProfile => format!("https://pump.fun/profile/{}", creator),
            DevLinkStyle::Solscan => format!("https://solscan.io/account/{}", creator),
        }
    }
}
