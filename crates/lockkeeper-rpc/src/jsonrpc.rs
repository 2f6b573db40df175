//! JSON-RPC 2.0 envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Generic server error; geth reports insufficient funds and reverts here
pub const SERVER_ERROR: i64 = -32000;
/// Rate limit exceeded (EIP-1474)
pub const LIMIT_EXCEEDED: i64 = -32005;
/// `eth_call`/`eth_estimateGas` revert with data
pub const EXECUTION_REVERTED: i64 = 3;
/// EIP-1193 user rejected request
pub const USER_REJECTED: i64 = 4001;

/// Outgoing request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Error object inside a response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcErrorObject> for Error {
    fn from(err: RpcErrorObject) -> Self {
        Error::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Incoming response. `result` may legitimately be `null`
/// (e.g. a receipt for a pending transaction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(self.result),
        }
    }
}
