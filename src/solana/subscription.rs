// src/solana/subscription.rs
//
// Long-lived logsSubscribe stream with reconnect + resubscribe.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::commitment_config::CommitmentConfig;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SentinelError;

// ============================================================================
// TRANSPORT
// ============================================================================

/// One `logsNotification` value.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub signature: String,
    pub err: Option<Value>,
    pub logs: Vec<String>,
}

/// Opens log-stream connections.
#[async_trait]
pub trait LogConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LogConnection>, SentinelError>;
}

/// A single open connection. `next_log` yields `None` once the remote side
/// closed the stream.
#[async_trait]
pub trait LogConnection: Send {
    async fn subscribe_mentions(
        &mut self,
        address: &str,
        commitment: CommitmentConfig,
    ) -> Result<u64, SentinelError>;
    async fn next_log(&mut self) -> Option<Result<RawLog, SentinelError>>;
    async fn unsubscribe(&mut self, subscription_id: u64) -> Result<(), SentinelError>;
    async fn close(&mut self);
}

/// JSON-RPC pubsub over a plain websocket.
#[derive(Debug, Clone)]
pub struct WsLogConnector {
    ws_url: String,
}

impl WsLogConnector {
    pub fn new(ws_url: &str) -> Self {
        Self { ws_url: ws_url.to_string() }
    }
}

pub struct WsLogConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_request_id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<LogsParams>,
}

#[derive(Debug, Deserialize)]
struct LogsParams {
    result: LogsResult,
}

#[derive(Debug, Deserialize)]
struct LogsResult {
    value: LogsValue,
}

#[derive(Debug, Deserialize)]
struct LogsValue {
    signature: String,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    err: Option<Value>,
}

#[async_trait]
impl LogConnector for WsLogConnector {
    async fn connect(&self) -> Result<Box<dyn LogConnection>, SentinelError> {
        debug!("Connecting to websocket {}", self.ws_url);
        let (stream, _) = connect_async(self.ws_url.as_str()).await?;
        Ok(Box::new(WsLogConnection { stream, next_request_id: 1 }))
    }
}

impl WsLogConnection {
    async fn send_request(&mut self, method: &str, params: Value) -> Result<u64, SentinelError> {
        let id = self.next_request_id;
        self.next_request_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        self.stream.send(Message::Text(request.to_string())).await?;
        Ok(id)
    }
}

#[async_trait]
impl LogConnection for WsLogConnection {
    async fn subscribe_mentions(
        &mut self,
        address: &str,
        commitment: CommitmentConfig,
    ) -> Result<u64, SentinelError> {
        let request_id = self
            .send_request(
                "logsSubscribe",
                json!([{ "mentions": [address] }, { "commitment": commitment.commitment }]),
            )
            .await?;

        // The first reply to our request carries the subscription id.
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => {
                    if let Some(ack) = parse_subscribe_ack(&text, request_id) {
                        return ack;
                    }
                }
                Message::Ping(data) => self.stream.send(Message::Pong(data)).await?,
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(SentinelError::Subscription("closed before subscription ack".to_string()))
    }

    async fn next_log(&mut self) -> Option<Result<RawLog, SentinelError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e.into())),
            };
            match frame {
                Message::Text(text) => match parse_notification(&text) {
                    Ok(Some(log)) => return Some(Ok(log)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Message::Ping(data) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
    }

    async fn unsubscribe(&mut self, subscription_id: u64) -> Result<(), SentinelError> {
        self.send_request("logsUnsubscribe", json!([subscription_id])).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Websocket close: {}", e);
        }
    }
}

/// `None` if the frame is not the reply to `request_id`.
fn parse_subscribe_ack(text: &str, request_id: u64) -> Option<Result<u64, SentinelError>> {
    let envelope: RpcEnvelope = serde_json::from_str(text).ok()?;
    if envelope.id != Some(request_id) {
        return None;
    }
    if let Some(error) = envelope.error {
        return Some(Err(SentinelError::Subscription(format!("logsSubscribe rejected: {}", error))));
    }
    Some(
        envelope
            .result
            .and_then(|r| r.as_u64())
            .ok_or_else(|| SentinelError::Subscription("logsSubscribe ack without id".to_string())),
    )
}

/// `Ok(None)` for frames that are not log notifications.
fn parse_notification(text: &str) -> Result<Option<RawLog>, SentinelError> {
    let envelope: RpcEnvelope = serde_json::from_str(text)
        .map_err(|e| SentinelError::Subscription(format!("malformed frame: {}", e)))?;
    if envelope.method.as_deref() != Some("logsNotification") {
        return Ok(None);
    }
    let value = envelope
        .params
        .ok_or_else(|| SentinelError::Subscription("logsNotification without params".to_string()))?
        .result
        .value;
    Ok(Some(RawLog {
        signature: value.signature,
        err: value.err.filter(|e| !e.is_null()),
        logs: value.logs,
    }))
}

// ============================================================================
// SUBSCRIPTION MANAGER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Subscribed,
}

#[derive(Debug, Default, Clone)]
pub struct SubscriptionStats {
    /// Total logs delivered to the handler
    pub logs_received: u64,
    /// Connections that reached `Subscribed`
    pub sessions: u64,
    /// Connections lost to errors or remote close
    pub reconnects: u64,
    pub unsubscribes: u64,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Address the stream is filtered to ("mentions").
    pub address: String,
    pub commitment: CommitmentConfig,
    /// Pause before reconnecting after a dropped connection.
    pub reconnect_delay: Duration,
}

impl SubscriptionConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            commitment: CommitmentConfig::confirmed(),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

enum SessionEnd {
    Cancelled,
    Dropped(String),
}

pub struct SubscriptionManager {
    connector: Arc<dyn LogConnector>,
    config: SubscriptionConfig,
    state: Arc<RwLock<SubscriptionState>>,
    stats: Arc<RwLock<SubscriptionStats>>,
}

impl SubscriptionManager {
    pub fn new(connector: Arc<dyn LogConnector>, config: SubscriptionConfig) -> Self {
        Self {
            connector,
            config,
            state: Arc::new(RwLock::new(SubscriptionState::Disconnected)),
            stats: Arc::new(RwLock::new(SubscriptionStats::default())),
        }
    }

    pub async fn state(&self) -> SubscriptionState {
        *self.state.read().await
    }

    pub async fn get_stats(&self) -> SubscriptionStats {
        self.stats.read().await.clone()
    }

    async fn set_state(&self, state: SubscriptionState) {
        *self.state.write().await = state;
    }

    /// Feeds every log to `on_log`, in delivery order, until `cancel` fires.
    /// Connection failures only cause a reconnect.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut on_log: F)
    where
        F: FnMut(RawLog) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        info!("📡 Watching logs mentioning {}", self.config.address);

        while !cancel.is_cancelled() {
            self.set_state(SubscriptionState::Connecting).await;

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };
            let mut connection = match connected {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Log stream connect failed: {}", e);
                    if !self.wait_reconnect(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let subscribed = tokio::select! {
                _ = cancel.cancelled() => {
                    connection.close().await;
                    break;
                }
                result = connection.subscribe_mentions(&self.config.address, self.config.commitment) => result,
            };
            let subscription_id = match subscribed {
                Ok(id) => id,
                Err(e) => {
                    error!("logsSubscribe failed: {}", e);
                    connection.close().await;
                    if !self.wait_reconnect(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.set_state(SubscriptionState::Subscribed).await;
            self.stats.write().await.sessions += 1;
            info!("Subscribed to logs (subscription {}). Waiting for messages...", subscription_id);

            let end = self.consume(connection.as_mut(), &cancel, &mut on_log).await;

            if let Err(e) = connection.unsubscribe(subscription_id).await {
                warn!("logsUnsubscribe {} failed: {}", subscription_id, e);
            }
            self.stats.write().await.unsubscribes += 1;
            connection.close().await;

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::Dropped(reason) => {
                    error!("Error with the log stream connection: {}", reason);
                    if !self.wait_reconnect(&cancel).await {
                        break;
                    }
                }
            }
        }

        self.set_state(SubscriptionState::Disconnected).await;
        info!("Log subscription for {} cancelled", self.config.address);
    }

    async fn consume<F, Fut>(
        &self,
        connection: &mut dyn LogConnection,
        cancel: &CancellationToken,
        on_log: &mut F,
    ) -> SessionEnd
    where
        F: FnMut(RawLog) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                next = connection.next_log() => next,
            };
            let log = match next {
                Some(Ok(log)) => log,
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("closed by remote".to_string()),
            };

            self.stats.write().await.logs_received += 1;
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = on_log(log) => {}
            }
        }
    }

    /// Returns false when cancelled while waiting.
    async fn wait_reconnect(&self, cancel: &CancellationToken) -> bool {
        self.set_state(SubscriptionState::Disconnected).await;
        self.stats.write().await.reconnects += 1;
        warn!("Reconnecting in {:?}", self.config.reconnect_delay);
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.reconnect_delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Script = VecDeque<Option<Result<RawLog, SentinelError>>>;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        sessions: Mutex<VecDeque<Result<Script, SentinelError>>>,
    }

    impl Recorder {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct FakeConnector(Arc<Recorder>);

    struct FakeConnection {
        recorder: Arc<Recorder>,
        script: Option<Result<Script, SentinelError>>,
    }

    #[async_trait]
    impl LogConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn LogConnection>, SentinelError> {
            self.0.record("connect");
            let script = self.0.sessions.lock().unwrap().pop_front();
            Ok(Box::new(FakeConnection { recorder: self.0.clone(), script }))
        }
    }

    #[async_trait]
    impl LogConnection for FakeConnection {
        async fn subscribe_mentions(&mut self, _: &str, _: CommitmentConfig) -> Result<u64, SentinelError> {
            self.recorder.record("subscribe");
            match &self.script {
                Some(Err(e)) => Err(SentinelError::Subscription(e.to_string())),
                _ => Ok(7),
            }
        }

        async fn next_log(&mut self) -> Option<Result<RawLog, SentinelError>> {
            let item = match &mut self.script {
                Some(Ok(script)) => script.pop_front(),
                _ => None,
            };
            match item {
                Some(item) => item,
                // Script exhausted: stay connected and idle.
                None => std::future::pending().await,
            }
        }

        async fn unsubscribe(&mut self, id: u64) -> Result<(), SentinelError> {
            self.recorder.record(&format!("unsubscribe:{}", id));
            Ok(())
        }

        async fn close(&mut self) {
            self.recorder.record("close");
        }
    }

    fn log(sig: &str) -> Option<Result<RawLog, SentinelError>> {
        Some(Ok(RawLog { signature: sig.to_string(), err: None, logs: vec![] }))
    }

    fn manager(recorder: &Arc<Recorder>) -> SubscriptionManager {
        let mut config = SubscriptionConfig::new("39azUYFWPz3VHgKCf3VChUwbpURdCHRxjWVowf5jUJjg");
        config.reconnect_delay = Duration::ZERO;
        SubscriptionManager::new(Arc::new(FakeConnector(recorder.clone())), config)
    }

    #[tokio::test]
    async fn test_disconnect_unsubscribes_once_then_reconnects() {
        let recorder = Arc::new(Recorder::default());
        recorder.sessions.lock().unwrap().extend([
            Ok(VecDeque::from(vec![
                log("sig-1"),
                Some(Err(SentinelError::Subscription("reset".to_string()))),
            ])),
            Ok(VecDeque::from(vec![log("sig-2")])),
        ]);

        let manager = manager(&recorder);
        let cancel = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_handle = seen.clone();
        let cancel_handle = cancel.clone();
        manager
            .run(cancel.clone(), move |log| {
                let seen = seen_handle.clone();
                let cancel = cancel_handle.clone();
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push(log.signature);
                    if seen.len() == 2 {
                        cancel.cancel();
                    }
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["sig-1", "sig-2"]);
        assert_eq!(
            recorder.calls(),
            vec![
                "connect", "subscribe", "unsubscribe:7", "close",
                "connect", "subscribe", "unsubscribe:7", "close",
            ]
        );
        let stats = manager.get_stats().await;
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.unsubscribes, 2);
        assert_eq!(manager.state().await, SubscriptionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_subscribe_skips_unsubscribe() {
        let recorder = Arc::new(Recorder::default());
        recorder.sessions.lock().unwrap().extend([
            Err(SentinelError::Subscription("rejected".to_string())),
            Ok(VecDeque::from(vec![log("sig-1")])),
        ]);

        let manager = manager(&recorder);
        let cancel = CancellationToken::new();
        let cancel_handle = cancel.clone();
        manager
            .run(cancel.clone(), move |_| {
                let cancel = cancel_handle.clone();
                async move { cancel.cancel() }
            })
            .await;

        assert_eq!(
            recorder.calls(),
            vec!["connect", "subscribe", "close", "connect", "subscribe", "unsubscribe:7", "close"]
        );
    }

    #[tokio::test]
    async fn test_remote_close_triggers_reconnect() {
        let recorder = Arc::new(Recorder::default());
        recorder.sessions.lock().unwrap().extend([
            Ok(VecDeque::from(vec![None])),
            Ok(VecDeque::from(vec![log("sig-after-close")])),
        ]);

        let manager = manager(&recorder);
        let cancel = CancellationToken::new();
        let cancel_handle = cancel.clone();
        manager
            .run(cancel.clone(), move |_| {
                let cancel = cancel_handle.clone();
                async move { cancel.cancel() }
            })
            .await;

        let stats = manager.get_stats().await;
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.logs_received, 1);
    }

    #[test]
    fn test_parse_subscribe_ack() {
        let ack = parse_subscribe_ack(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#, 1);
        assert_eq!(ack.unwrap().unwrap(), 24040);
        assert!(parse_subscribe_ack(r#"{"jsonrpc":"2.0","result":24040,"id":2}"#, 1).is_none());
        let rejected = parse_subscribe_ack(
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"Invalid params"},"id":1}"#,
            1,
        );
        assert!(matches!(rejected, Some(Err(SentinelError::Subscription(_)))));
    }

    #[test]
    fn test_parse_notification() {
        let frame = r#"{"jsonrpc":"2.0","method":"logsNotification","params":{
            "result":{"context":{"slot":5208469},"value":{"signature":"5h6x","err":null,
            "logs":["Program log: Instruction: Migrate"]}},"subscription":24040}}"#;
        let log = parse_notification(frame).unwrap().unwrap();
        assert_eq!(log.signature, "5h6x");
        assert!(log.err.is_none());
        assert_eq!(log.logs, vec!["Program log: Instruction: Migrate"]);

        assert!(parse_notification(r#"{"jsonrpc":"2.0","result":true,"id":3}"#).unwrap().is_none());
        assert!(parse_notification("not json").is_err());
    }
}
