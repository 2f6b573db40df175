//! Receipt Analysis
//!
//! Recovers a freshly deployed lock address and minted token ids from a
//! transaction receipt. Nothing here fails on malformed logs: a log that
//! does not decode is skipped and noted at debug level, since receipts
//! from nodes are trusted but not guaranteed parseable across lock versions.
//!
//! ```text
//! extract_deployed_address
//!   ├── primary:  decode NewLock(lockOwner, newLockAddress) → newLockAddress
//!   └── fallback: first non-first topic shaped like an address,
//!                 not zero, not the deployer
//!
//! extract_token_ids
//!   └── every Transfer(from, to, tokenId) log → topics[3] as U256
//! ```

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolEvent;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::abi::{IPublicLock, IUnlock};

/// A log entry as returned by `eth_getTransactionReceipt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::from(1))
    }
}

/// Address of the lock created in this receipt, if any
pub fn extract_deployed_address(receipt: &TransactionReceipt, deployer: Option<Address>) -> Option<Address> {
    decode_new_lock(receipt).or_else(|| scan_address_topics(receipt, deployer))
}

fn decode_new_lock(receipt: &TransactionReceipt) -> Option<Address> {
    for (index, log) in receipt.logs.iter().enumerate() {
        if log.topics.first() != Some(&IUnlock::NewLock::SIGNATURE_HASH) {
            continue;
        }
        match IUnlock::NewLock::decode_raw_log(log.topics.iter().copied(), &log.data, true) {
            Ok(event) => return Some(event.newLockAddress),
            Err(e) => debug!(index, error = %e, "Skipping undecodable NewLock log"),
        }
    }
    None
}

fn scan_address_topics(receipt: &TransactionReceipt, deployer: Option<Address>) -> Option<Address> {
    for log in &receipt.logs {
        for topic in log.topics.iter().skip(1) {
            let Some(candidate) = topic_as_address(topic) else {
                continue;
            };
            if deployer == Some(candidate) {
                continue;
            }
            debug!(address = %candidate, emitter = %log.address, "Deployed address recovered from topic scan");
            return Some(candidate);
        }
    }
    None
}

/// A topic is address-shaped when its upper 12 bytes are zero and the
/// remaining 20 are not all zero.
fn topic_as_address(topic: &B256) -> Option<Address> {
    if topic[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let address = Address::from_word(*topic);
    if address.is_zero() {
        return None;
    }
    Some(address)
}

/// Token ids from every `Transfer` log, in log order
pub fn extract_token_ids(receipt: &TransactionReceipt) -> Vec<U256> {
    receipt
        .logs
        .iter()
        .enumerate()
        .filter(|(_, log)| log.topics.first() == Some(&IPublicLock::Transfer::SIGNATURE_HASH))
        .filter_map(|(index, log)| match log.topics.get(3) {
            Some(topic) => Some(U256::from_be_bytes(topic.0)),
            None => {
                // ERC-20 Transfer carries the amount in data, not a token id
                debug!(index, topics = log.topics.len(), "Transfer log without token id topic");
                None
            }
        })
        .collect()
}
