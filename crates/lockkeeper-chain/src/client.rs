//! Read-side chain access on top of the failover transport

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolCall;
use serde_json::json;
use tracing::debug;

use lockkeeper_rpc::{FailoverTransport, Sleeper, TokioSleeper};

use crate::receipt::TransactionReceipt;
use crate::{Error, Result};

pub struct ChainClient {
    transport: Arc<FailoverTransport>,
    sleeper: Arc<dyn Sleeper>,
    receipt_poll_interval: Duration,
    receipt_max_polls: u32,
}

impl ChainClient {
    pub fn new(transport: Arc<FailoverTransport>) -> Self {
        Self {
            transport,
            sleeper: Arc::new(TokioSleeper),
            receipt_poll_interval: Duration::from_secs(2),
            receipt_max_polls: 60,
        }
    }

    pub fn with_receipt_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_max_polls = max_polls;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn transport(&self) -> &Arc<FailoverTransport> {
        &self.transport
    }

    pub async fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration).await;
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.transport.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    pub async fn get_balance(&self, account: Address) -> Result<U256> {
        Ok(self
            .transport
            .request("eth_getBalance", json!([account, "latest"]))
            .await?)
    }

    /// Raw `eth_call` against latest state
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        Ok(self
            .transport
            .request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?)
    }

    /// Typed `eth_call`
    pub async fn call_typed<C: SolCall + Send + Sync>(&self, to: Address, call: &C) -> Result<C::Return> {
        let output = self.call(to, call.abi_encode().into()).await?;
        if output.is_empty() {
            return Err(Error::Contract(format!(
                "Empty result calling {} on {to}; is this the right contract?",
                C::SIGNATURE
            )));
        }
        Ok(C::abi_decode_returns(&output, true)?)
    }

    pub async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        Ok(self
            .transport
            .request("eth_getTransactionReceipt", json!([tx_hash]))
            .await?)
    }

    /// Poll at a fixed interval until the receipt appears or polls run out
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        for poll in 0..self.receipt_max_polls.max(1) {
            if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            debug!(tx = %tx_hash, poll, "Receipt not available yet");
            self.sleeper.sleep(self.receipt_poll_interval).await;
        }
        Err(Error::ReceiptTimeout { tx_hash })
    }
}
