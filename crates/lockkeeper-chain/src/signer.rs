//! Signing capability
//!
//! The contract layer only needs to sign and send, read the chain id, and
//! switch network. Wallet backends implement [`Signer`]; which one is used
//! is decided where the process is wired together.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use lockkeeper_rpc::FailoverTransport;

use crate::types::TransactionRequest;
use crate::{Error, Result};

#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn chain_id(&self) -> Result<u64>;

    async fn switch_chain(&self, chain_id: u64) -> Result<()>;

    /// Sign and broadcast, returning the transaction hash
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256>;
}

/// Signs through an account held by the node (`eth_sendTransaction`)
pub struct NodeSigner {
    address: Address,
    transport: Arc<FailoverTransport>,
}

impl NodeSigner {
    pub fn new(address: Address, transport: Arc<FailoverTransport>) -> Self {
        Self { address, transport }
    }
}

#[async_trait]
impl Signer for NodeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.transport.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<()> {
        info!(chain_id, signer = %self.address, "Switching signer network");
        self.transport
            .send(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("0x{chain_id:x}") }]),
            )
            .await
            .map_err(|e| Error::Wallet(format!("Cannot switch to chain {chain_id}: {e}")))?;
        Ok(())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
        if tx.from != self.address {
            return Err(Error::Wallet(format!(
                "Transaction from {} cannot be signed by {}",
                tx.from, self.address
            )));
        }
        Ok(self.transport.request("eth_sendTransaction", json!([tx])).await?)
    }
}
