//! Failover transport - one logical call, many endpoints

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backoff::{BackoffPolicy, Sleeper, TokioSleeper, MAX_BACKOFF};
use crate::connector::{Connector, HttpConnector};
use crate::jsonrpc::JsonRpcRequest;
use crate::pool::EndpointPool;
use crate::{Error, Result};

/// Transport timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-request timeout (ms)
    pub timeout_ms: u64,
    /// Base delay between endpoint attempts (ms)
    pub base_delay_ms: u64,
    /// Cap on any single delay (ms)
    pub max_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            base_delay_ms: 250,
            max_delay_ms: MAX_BACKOFF.as_millis() as u64,
        }
    }
}

impl TransportConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let max = Duration::from_millis(self.max_delay_ms).min(MAX_BACKOFF);
        BackoffPolicy::new(Duration::from_millis(self.base_delay_ms), max)
    }
}

/// JSON-RPC transport over an [`EndpointPool`]
///
/// Construct once per chain and share behind an `Arc`. The `last_good`
/// cursor is updated with relaxed atomics; concurrent callers may race on
/// it, which costs at most one extra failed attempt.
pub struct FailoverTransport {
    pool: EndpointPool,
    config: TransportConfig,
    backoff: BackoffPolicy,
    last_good: AtomicUsize,
    next_id: AtomicU64,
    connector: Arc<dyn Connector>,
    sleeper: Arc<dyn Sleeper>,
}

impl FailoverTransport {
    /// HTTP transport over the given URLs
    pub fn new<I, S>(urls: I, config: TransportConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = EndpointPool::new(urls)?;
        Ok(Self::with_connector(pool, config, Arc::new(HttpConnector::new())))
    }

    pub fn with_connector(
        pool: EndpointPool,
        config: TransportConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let backoff = config.backoff();
        Self {
            pool,
            config,
            backoff,
            last_good: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            connector,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn endpoints(&self) -> &[String] {
        self.pool.urls()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Index of the endpoint that answered most recently
    pub fn last_good_index(&self) -> usize {
        self.last_good.load(Ordering::Relaxed) % self.pool.len()
    }

    /// `[last_good, last_good + 1, ...]` modulo pool size
    pub fn attempt_order(&self) -> Vec<usize> {
        let n = self.pool.len();
        let start = self.last_good_index();
        (0..n).map(|i| (start + i) % n).collect()
    }

    /// Single-endpoint transport on the current last-good URL, sharing this
    /// transport's connector and sleeper. Non-idempotent calls such as
    /// `eth_sendTransaction` must never fail over to a second node.
    pub fn pinned(&self) -> Result<Self> {
        let url = self.pool.get(self.last_good_index()).ok_or(Error::NoEndpoints)?;
        let pool = EndpointPool::new([url])?;
        Ok(Self::with_connector(pool, self.config.clone(), self.connector.clone())
            .with_sleeper(self.sleeper.clone()))
    }

    /// Send one logical call, failing over across the pool
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);
        let order = self.attempt_order();
        let total = order.len();
        let timeout = self.config.timeout();
        let mut last_error = None;

        for (attempt, index) in order.into_iter().enumerate() {
            let endpoint = &self.pool.urls()[index];
            debug!(method, endpoint = %endpoint, attempt, "Sending JSON-RPC request");

            match self.connector.call(endpoint, &request, timeout).await {
                Ok(value) => {
                    let previous = self.last_good.swap(index, Ordering::Relaxed);
                    if previous != index {
                        info!(endpoint = %endpoint, index, "RPC cursor moved to endpoint");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_permanent() => {
                    debug!(method, endpoint = %endpoint, error = %err, "Permanent RPC error, not retrying");
                    return Err(err);
                }
                Err(err) => {
                    let remaining = total - attempt - 1;
                    warn!(method, endpoint = %endpoint, attempt, remaining, error = %err, "Retryable RPC failure");
                    last_error = Some(err);

                    if remaining > 0 {
                        let delay = self.backoff.jittered(attempt);
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off before next endpoint");
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(Error::AllEndpointsFailed(total)))
    }

    /// [`FailoverTransport::send`] and deserialize the result
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.send(method, params).await?;
        serde_json::from_value(value).map_err(|e| Error::Decode(format!("{method}: {e}")))
    }
}

impl std::fmt::Debug for FailoverTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverTransport")
            .field("endpoints", &self.pool.urls())
            .field("last_good", &self.last_good_index())
            .field("config", &self.config)
            .finish()
    }
}
