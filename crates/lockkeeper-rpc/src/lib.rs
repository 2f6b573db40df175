//! # Lockkeeper RPC Transport
//!
//! JSON-RPC over a pool of endpoints for one chain. Every logical call walks
//! the pool round-robin, starting from the endpoint that answered last.
//!
//! ```text
//!                 send(method, params)
//!                        │
//!              ┌─────────▼──────────┐
//!              │  attempt order     │  [last_good, last_good+1, ...] mod N
//!              └─────────┬──────────┘
//!                        │
//!        ┌───────────────┼────────────────┐
//!        ▼               ▼                ▼
//!   endpoint[k]  ──►  endpoint[k+1] ──►  endpoint[k+2]
//!        │   retryable?  │   retryable?   │
//!        │   sleep(jit)  │   sleep(jit)   │
//!        │               │                │
//!   ok ──┴── cursor = k  │                └── exhausted → last error
//!                        │
//!   permanent (-32600/-32601/-32602, revert) → return immediately
//! ```
//!
//! There is no circuit breaker and no persistent health tracking. The only
//! state is the in-memory `last_good` cursor, which is safe to race.

pub mod backoff;
pub mod connector;
pub mod jsonrpc;
pub mod pool;
pub mod transport;

pub use backoff::{BackoffPolicy, Sleeper, TokioSleeper, MAX_BACKOFF};
pub use connector::{Connector, HttpConnector};
pub use jsonrpc::{JsonRpcRequest, JsonRpcResponse, RpcErrorObject};
pub use pool::EndpointPool;
pub use transport::{FailoverTransport, TransportConfig};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the RPC transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("No valid RPC endpoints configured")]
    NoEndpoints,

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("HTTP error from {endpoint}: {message}")]
    Http {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("All {0} RPC endpoints failed")]
    AllEndpointsFailed(usize),

    #[error("Failed to decode RPC result: {0}")]
    Decode(String),
}

impl Error {
    /// True when no endpoint can succeed: the request itself is malformed,
    /// the call reverted, or the user refused to sign.
    pub fn is_permanent(&self) -> bool {
        match self {
            Error::Rpc { code, message, .. } => {
                let lower = message.to_lowercase();
                matches!(
                    *code,
                    jsonrpc::PARSE_ERROR
                        | jsonrpc::INVALID_REQUEST
                        | jsonrpc::METHOD_NOT_FOUND
                        | jsonrpc::INVALID_PARAMS
                        | jsonrpc::EXECUTION_REVERTED
                        | jsonrpc::USER_REJECTED
                ) || lower.contains("execution reverted")
                    || lower.contains("insufficient funds")
            }
            Error::NoEndpoints | Error::Decode(_) => true,
            Error::Timeout { .. }
            | Error::Http { .. }
            | Error::InvalidResponse { .. }
            | Error::AllEndpointsFailed(_) => false,
        }
    }

    /// Inverse of [`Error::is_permanent`]
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent()
    }

    /// JSON-RPC error code, if the node returned one
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Error::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
