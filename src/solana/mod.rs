pub mod client;
pub mod subscription;

pub use client::{ChainRpc, ConfirmedTransaction, SolanaClient};
pub use subscription::{LogConnector, RawLog, SubscriptionConfig, SubscriptionManager, WsLogConnector};
