use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod api;
mod bonds;
mod bot;
mod config;
mod error;
mod models;
mod social;
mod solana;
mod storage;
mod tasks;

use crate::api::jupiter::JupiterClient;
use crate::api::launchlab::LaunchLabClient;
use crate::api::pump::PumpClient;
use crate::api::social::SocialClient;
use crate::api::{ContentApi, TokenStatsSource};
use crate::bonds::{EventPipeline, PlatformDescriptor};
use crate::bot::{ChannelRoutes, Notifier, TelegramNotifier};
use crate::config::Config;
use crate::social::{IngestorConfig, ReviewConfig, ReviewScheduler, TweetIngestor};
use crate::solana::{
    ChainRpc, LogConnector, SolanaClient, SubscriptionConfig, SubscriptionManager, WsLogConnector,
};
use crate::storage::{PostStore, SledPostStore};
use crate::tasks::ManagedTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenv().ok();

    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaClient::new(&config.solana_rpc_url));
    let connector: Arc<dyn LogConnector> = Arc::new(WsLogConnector::new(&config.solana_ws_url));
    info!("Solana client initialized successfully");

    let bot = Bot::new(&config.telegram_bot_token);
    let notifier: Arc<dyn Notifier> =
        Arc::new(TelegramNotifier::new(bot, ChannelRoutes::from_config(&config)));

    let token_stats: Arc<dyn TokenStatsSource> = Arc::new(JupiterClient::new(http.clone()));

    let mut platforms = Vec::new();
    if config.enable_pump {
        platforms.push(PlatformDescriptor::pump(Arc::new(PumpClient::new(http.clone()))));
    }
    if config.enable_bonk {
        platforms.push(PlatformDescriptor::bonk(
            Arc::new(LaunchLabClient::new(http.clone())),
            config.bonk_config_addresses.clone(),
        ));
    }

    let mut running: Vec<ManagedTask> = Vec::new();

    for descriptor in platforms {
        let subscription = SubscriptionManager::new(
            connector.clone(),
            SubscriptionConfig::new(&descriptor.migration_address),
        );
        let task = ManagedTask::new(&format!("{} bonds", descriptor.platform));
        let pipeline = Arc::new(EventPipeline::new(
            descriptor,
            rpc.clone(),
            token_stats.clone(),
            notifier.clone(),
            subscription,
            config.bonds_full_stats,
        ));
        task.start(move |cancel| async move { pipeline.run(cancel).await }).await;
        running.push(task);
    }

    let mut store: Option<Arc<SledPostStore>> = None;
    if config.enable_social {
        let posts = Arc::new(
            SledPostStore::open(&config.database_path)
                .with_context(|| format!("failed to open posts database at {}", config.database_path))?,
        );
        let api_key = config
            .social_api_key
            .as_deref()
            .context("SOCIAL_API_KEY missing")?;
        let api: Arc<dyn ContentApi> =
            Arc::new(SocialClient::new(http.clone(), &config.social_api_url, api_key));
        let post_store: Arc<dyn PostStore> = posts.clone();

        let ingestor = Arc::new(TweetIngestor::new(
            api.clone(),
            post_store.clone(),
            notifier.clone(),
            IngestorConfig::from_config(&config),
        ));
        let ingest_task = ManagedTask::new("tweet ingestor");
        ingest_task.start(move |cancel| async move { ingestor.run(cancel).await }).await;
        running.push(ingest_task);

        let scheduler = Arc::new(ReviewScheduler::new(
            api,
            post_store,
            notifier.clone(),
            ReviewConfig::from_config(&config),
        ));
        let review_task = ManagedTask::new("review scheduler");
        review_task.start(move |cancel| async move { scheduler.run(cancel).await }).await;
        running.push(review_task);

        store = Some(posts);
    }

    if running.is_empty() {
        anyhow::bail!("nothing to run: enable at least one of pump, bonk or social");
    }

    info!("Bond sentinel running with {} tasks", running.len());
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    for task in &running {
        info!("Stopping {}", task.name());
        task.stop().await;
    }
    if let Some(store) = store {
        if let Err(e) = store.flush().await {
            error!("Failed to flush posts database: {}", e);
        }
    }

    info!("Bond sentinel stopped");
    Ok(())
}
