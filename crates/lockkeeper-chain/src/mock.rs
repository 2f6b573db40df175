//! Scripted in-memory node for contract-layer tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde_json::{json, Value};

use lockkeeper_rpc::{Connector, EndpointPool, FailoverTransport, JsonRpcRequest, Sleeper, TransportConfig};

use crate::client::ChainClient;
use crate::config::ChainConfig;
use crate::lock::LockClient;
use crate::receipt::{Log, TransactionReceipt};
use crate::signer::NodeSigner;
use crate::types::TransactionRequest;

#[derive(Default)]
struct NodeState {
    chain_id: u64,
    balance: U256,
    /// (contract, selector) → queued return data; the last entry sticks
    calls: HashMap<(Address, [u8; 4]), VecDeque<Vec<u8>>>,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<B256, TransactionReceipt>,
    pending_logs: VecDeque<Vec<Log>>,
    fail_next_receipt: bool,
}

#[derive(Clone, Default)]
pub struct MockNode {
    state: Arc<Mutex<NodeState>>,
}

impl MockNode {
    pub fn new(chain_id: u64) -> Self {
        let node = Self::default();
        node.state.lock().unwrap().chain_id = chain_id;
        node
    }

    pub fn set_call(&self, to: Address, selector: [u8; 4], output: Vec<u8>) {
        self.queue_calls(to, selector, vec![output]);
    }

    pub fn queue_calls(&self, to: Address, selector: [u8; 4], outputs: Vec<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .calls
            .insert((to, selector), outputs.into_iter().collect());
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    /// Logs for the receipt of the next sent transaction
    pub fn push_receipt_logs(&self, logs: Vec<Log>) {
        self.state.lock().unwrap().pending_logs.push_back(logs);
    }

    pub fn fail_next_receipt(&self) {
        self.state.lock().unwrap().fail_next_receipt = true;
    }

    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.state.lock().unwrap().chain_id
    }

    fn handle(&self, method: &str, params: &Value) -> lockkeeper_rpc::Result<Value> {
        let mut state = self.state.lock().unwrap();
        match method {
            "eth_chainId" => Ok(json!(U64::from(state.chain_id))),
            "eth_getBalance" => Ok(json!(state.balance)),
            "wallet_switchEthereumChain" => {
                let hex_id = params[0]["chainId"].as_str().unwrap_or_default();
                state.chain_id = u64::from_str_radix(hex_id.trim_start_matches("0x"), 16).unwrap();
                Ok(Value::Null)
            }
            "eth_call" => {
                let to: Address = serde_json::from_value(params[0]["to"].clone()).unwrap();
                let data: Bytes = serde_json::from_value(params[0]["data"].clone()).unwrap();
                let selector: [u8; 4] = data[..4].try_into().unwrap();
                let output = match state.calls.get_mut(&(to, selector)) {
                    Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                    Some(queue) => queue.front().cloned().unwrap_or_default(),
                    None => Vec::new(),
                };
                Ok(json!(format!("0x{}", hex::encode(output))))
            }
            "eth_sendTransaction" => {
                let tx: TransactionRequest = serde_json::from_value(params[0].clone()).unwrap();
                state.sent.push(tx);
                let tx_hash = B256::from(U256::from(state.sent.len()).to_be_bytes::<32>());
                let status = if std::mem::take(&mut state.fail_next_receipt) { 0 } else { 1 };
                let logs = state.pending_logs.pop_front().unwrap_or_default();
                state.receipts.insert(
                    tx_hash,
                    TransactionReceipt {
                        transaction_hash: tx_hash,
                        status: Some(U64::from(status)),
                        block_number: Some(U64::from(100)),
                        contract_address: None,
                        logs,
                    },
                );
                Ok(json!(tx_hash))
            }
            "eth_getTransactionReceipt" => {
                let tx_hash: B256 = serde_json::from_value(params[0].clone()).unwrap();
                Ok(json!(state.receipts.get(&tx_hash)))
            }
            other => Err(lockkeeper_rpc::Error::Rpc {
                code: lockkeeper_rpc::jsonrpc::METHOD_NOT_FOUND,
                message: format!("method {other} not found"),
                data: None,
            }),
        }
    }
}

#[async_trait]
impl Connector for MockNode {
    async fn call(
        &self,
        _endpoint: &str,
        request: &JsonRpcRequest,
        _timeout: Duration,
    ) -> lockkeeper_rpc::Result<Value> {
        self.handle(&request.method, &request.params)
    }
}

pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// A [`LockClient`] wired to `node`, signing as `signer`
pub fn mock_client(node: MockNode, signer: Address) -> LockClient {
    let pool = EndpointPool::new(["mock://node"]).unwrap();
    let transport = Arc::new(
        FailoverTransport::with_connector(pool, TransportConfig::default(), Arc::new(node))
            .with_sleeper(Arc::new(NoSleep)),
    );
    let config = ChainConfig {
        signer_address: Some(signer),
        factory_address: Address::repeat_byte(0xfa),
        ..ChainConfig::default()
    };
    let chain = ChainClient::new(transport.clone())
        .with_receipt_polling(Duration::ZERO, 3)
        .with_sleeper(Arc::new(NoSleep));
    LockClient::new(chain, Arc::new(NodeSigner::new(signer, transport)), config)
}
