use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentinelError {
    /// Network failure worth retrying (timeouts, 5xx, dropped connections).
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// An external payload is missing a field we rely on.
    #[error("Malformed data: {0}")]
    MalformedData(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl SentinelError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SentinelError::TransientNetwork(_) | SentinelError::Subscription(_)
        )
    }
}

impl From<reqwest::Error> for SentinelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SentinelError::MalformedData(e.to_string())
        } else {
            SentinelError::TransientNetwork(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(e: serde_json::Error) -> Self {
        SentinelError::MalformedData(e.to_string())
    }
}

impl From<sled::Error> for SentinelError {
    fn from(e: sled::Error) -> Self {
        SentinelError::Database(e.to_string())
    }
}

impl From<solana_client::client_error::ClientError> for SentinelError {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        SentinelError::TransientNetwork(format!("RPC Client Error: {}", e))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SentinelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SentinelError::Subscription(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(SentinelError::TransientNetwork("timeout".into()).is_transient());
        assert!(SentinelError::Subscription("closed".into()).is_transient());
        assert!(!SentinelError::MalformedData("no mint".into()).is_transient());
        assert!(!SentinelError::Database("io".into()).is_transient());
    }

    #[test]
    fn test_serde_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(SentinelError::from(err), SentinelError::MalformedData(_)));
    }
}
