// src/bonds/pipeline.rs
//
// Subscription -> classifier -> transaction fetch -> allocation -> notifier,
// one instance per launch platform.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::retry::RetryPolicy;
use crate::api::TokenStatsSource;
use crate::bonds::holders::HolderAllocationCalculator;
use crate::bonds::platform::PlatformDescriptor;
use crate::bot::messages::bond_notification;
use crate::bot::Notifier;
use crate::error::SentinelError;
use crate::models::{calculate_fill_time, MigrationEvent, TokenAsset};
use crate::solana::{ChainRpc, RawLog, SubscriptionManager};

#[derive(Debug, Default, Clone)]
pub struct PipelineStats {
    pub logs_processed: u64,
    pub migrations_detected: u64,
    pub notifications_sent: u64,
    pub failures: u64,
}

pub struct EventPipeline {
    platform: PlatformDescriptor,
    rpc: Arc<dyn ChainRpc>,
    token_stats: Arc<dyn TokenStatsSource>,
    holders: HolderAllocationCalculator,
    notifier: Arc<dyn Notifier>,
    subscription: SubscriptionManager,
    tx_retry: RetryPolicy,
    full_stats: bool,
    stats: Arc<RwLock<PipelineStats>>,
}

impl EventPipeline {
    pub fn new(
        platform: PlatformDescriptor,
        rpc: Arc<dyn ChainRpc>,
        token_stats: Arc<dyn TokenStatsSource>,
        notifier: Arc<dyn Notifier>,
        subscription: SubscriptionManager,
        full_stats: bool,
    ) -> Self {
        Self {
            holders: HolderAllocationCalculator::new(rpc.clone()),
            platform,
            rpc,
            token_stats,
            notifier,
            subscription,
            tx_retry: RetryPolicy::transaction(),
            full_stats,
            stats: Arc::new(RwLock::new(PipelineStats::default())),
        }
    }

    pub fn with_retry(mut self, transaction: RetryPolicy, token_accounts: RetryPolicy) -> Self {
        self.tx_retry = transaction;
        self.holders = HolderAllocationCalculator::new(self.rpc.clone()).with_retry(token_accounts);
        self
    }

    pub async fn get_stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    /// Runs until `cancel` fires. Connection problems are handled by the
    /// subscription; per-log failures are logged and skipped.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("🚀 Starting {} bond pipeline", self.platform.platform);
        self.subscription.run(cancel, |log| self.handle_log(log)).await;
        info!("{} bond pipeline stopped", self.platform.platform);
    }

    async fn handle_log(&self, log: RawLog) {
        self.stats.write().await.logs_processed += 1;

        let Some(event) = self.detect_migration(&log).await else {
            return;
        };
        info!("Found new bond: {} ({})", event.mint, event.signature);
        self.stats.write().await.migrations_detected += 1;

        match self.build_asset(&event).await {
            Ok(Some(asset)) => {
                let notification = bond_notification(&asset, &self.platform, self.full_stats);
                if self.notifier.deliver(&notification).await {
                    self.stats.write().await.notifications_sent += 1;
                }
            }
            Ok(None) => {
                warn!("No asset info for {}, skipping", event.mint);
            }
            Err(e) => {
                error!("Error processing bond {}: {}", event.mint, e);
                self.stats.write().await.failures += 1;
            }
        }
    }

    /// Log filter, confirmed-transaction check and mint extraction.
    pub async fn detect_migration(&self, log: &RawLog) -> Option<MigrationEvent> {
        let classifier = &self.platform.classifier;
        if log.err.is_some() || !classifier.is_migration_log(&log.logs) {
            debug!("Skipping log {}: failed or not a migration", log.signature);
            return None;
        }

        let Some(tx) = self
            .tx_retry
            .fetch_rpc("getTransaction", || self.rpc.get_transaction(&log.signature))
            .await
        else {
            warn!("Transaction {} not found", log.signature);
            return None;
        };
        if !classifier.is_migration_transaction(&tx) {
            debug!("Transaction {} is not a migration transaction", log.signature);
            return None;
        }

        match classifier.extract_mint(&tx) {
            Some(mint) => Some(MigrationEvent {
                platform: self.platform.platform,
                mint,
                signature: log.signature.clone(),
            }),
            None => {
                warn!("No mint balance found in transaction {}", log.signature);
                None
            }
        }
    }

    /// Metadata, stats and holder distribution for a detected migration.
    /// Missing stats or allocations degrade to empty values.
    pub async fn build_asset(&self, event: &MigrationEvent) -> Result<Option<TokenAsset>, SentinelError> {
        let Some(metadata) = self.platform.metadata.fetch_asset(&event.mint).await? else {
            return Ok(None);
        };

        let stats = match self.token_stats.fetch_stats(&event.mint).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Token stats unavailable for {}: {}", event.mint, e);
                None
            }
        };

        let holders = self
            .holders
            .compute_allocations(&event.mint, Some(&metadata.creator), &self.platform.allocation)
            .await
            .unwrap_or_default();

        Ok(Some(TokenAsset {
            fill_time: calculate_fill_time(metadata.created_at, Utc::now()),
            platform_url: self.platform.token_url(&event.mint),
            dex_url: self.platform.dex_url(&event.mint),
            metadata,
            holders,
            stats,
        }))
    }
}
