// src/api/retry.rs
//
// Bounded retry around a single remote read. Every chain and REST fetch
// in the crate goes through one of the two entry points below.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SentinelError;

/// Default attempt budget for every remote call.
pub const MAX_FETCH_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// getTransaction: the node often needs a moment before a fresh
    /// signature is queryable.
    pub const fn transaction() -> Self {
        Self::new(MAX_FETCH_RETRIES, Duration::from_millis(500))
    }

    /// getTokenSupply / getTokenLargestAccounts.
    pub const fn token_accounts() -> Self {
        Self::new(MAX_FETCH_RETRIES, Duration::from_secs(1))
    }

    /// Platform REST endpoints.
    pub const fn rest() -> Self {
        Self::new(MAX_FETCH_RETRIES, Duration::from_secs(5))
    }

    /// Outgoing notifications.
    pub const fn notification() -> Self {
        Self::new(MAX_FETCH_RETRIES, Duration::from_secs(1))
    }

    /// Blockchain RPC reads. `Ok(None)` counts as an empty response and is
    /// retried. Exhausting the budget yields `None`, never an error.
    pub async fn fetch_rpc<T, F, Fut>(&self, label: &str, mut call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, SentinelError>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            match call().await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {
                    warn!("{}: empty response, retrying ({}/{})", label, attempt, attempts);
                }
                Err(e) => {
                    warn!("{}: {} ({}/{})", label, e, attempt, attempts);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        debug!("{}: giving up after {} attempts", label, attempts);
        None
    }

    /// REST reads. Only transient errors are retried; a malformed payload
    /// or an exhausted budget surfaces the error so the caller can apply
    /// its own policy. `Ok(None)` ("resource does not exist") is definitive
    /// and returned immediately.
    pub async fn fetch_rest<T, F, Fut>(&self, label: &str, mut call: F) -> Result<Option<T>, SentinelError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, SentinelError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match call().await {
                Ok(found) => return Ok(found),
                Err(e) if !e.is_transient() => {
                    warn!("{}: {} (not retried)", label, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}: {} ({}/{})", label, e, attempt, attempts);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }
        Err(last_error.unwrap_or_else(|| {
            SentinelError::TransientNetwork(format!("{}: no attempts made", label))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const FAST: RetryPolicy = RetryPolicy::new(3, Duration::ZERO);

    #[tokio::test]
    async fn test_rpc_retries_until_non_empty() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = FAST
            .fetch_rpc("tx", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Ok(None)
                    } else {
                        Ok(Some(42u64))
                    }
                }
            })
            .await;
        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rpc_exhausted_is_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Option<u64> = FAST
            .fetch_rpc("supply", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SentinelError::TransientNetwork("503".into()))
                }
            })
            .await;
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rest_malformed_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<Option<u64>, _> = FAST
            .fetch_rest("coin", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SentinelError::MalformedData("missing mint".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(SentinelError::MalformedData(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rest_transient_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<Option<u64>, _> = FAST
            .fetch_rest("coin", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(SentinelError::TransientNetwork(format!("502 #{}", n)))
                }
            })
            .await;
        match result {
            Err(SentinelError::TransientNetwork(msg)) => assert_eq!(msg, "502 #2"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rest_not_found_is_definitive() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Option<u64> = tokio_test::assert_ok!(
            FAST.fetch_rest("coin", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            })
            .await
        );
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
