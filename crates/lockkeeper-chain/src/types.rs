//! Lock configuration and result types

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Transfer fee that makes keys non-transferable (100%)
pub const NON_TRANSFERABLE_FEE_BPS: u64 = 10_000;

/// Parameters for a new lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfig {
    pub name: String,
    /// Key duration in seconds; `U256::MAX` for keys that never expire
    pub expiration_duration: U256,
    /// Payment currency; zero address means the native coin
    pub token_address: Address,
    pub key_price: U256,
    pub max_number_of_keys: U256,
}

impl LockConfig {
    /// A grant-only lock: free, no public supply, keys never expire
    pub fn grant_based(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expiration_duration: U256::MAX,
            token_address: Address::ZERO,
            key_price: U256::ZERO,
            max_number_of_keys: U256::ZERO,
        }
    }

    pub fn with_expiration(mut self, seconds: u64) -> Self {
        self.expiration_duration = U256::from(seconds);
        self
    }

    pub fn with_price(mut self, token: Address, price: U256) -> Self {
        self.token_address = token;
        self.key_price = price;
        self
    }

    pub fn with_max_keys(mut self, max: U256) -> Self {
        self.max_number_of_keys = max;
        self
    }
}

/// Current supply caps as read from chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockCaps {
    pub expiration_duration: U256,
    pub max_number_of_keys: U256,
    pub max_keys_per_address: U256,
}

/// Arguments for `updateLockConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConfigUpdate {
    pub expiration_duration: U256,
    pub max_number_of_keys: U256,
    pub max_keys_per_address: U256,
}

impl LockConfigUpdate {
    /// Keep expiration, force total supply to zero. A per-address cap of
    /// zero is raised to one because some lock versions reject it; with
    /// total supply at zero nobody can buy either way.
    pub fn secured_from(current: &LockCaps) -> Self {
        let max_keys_per_address = if current.max_keys_per_address.is_zero() {
            U256::from(1)
        } else {
            current.max_keys_per_address
        };

        Self {
            expiration_duration: current.expiration_duration,
            max_number_of_keys: U256::ZERO,
            max_keys_per_address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxKeysSecurity {
    pub is_secure: bool,
    pub current_value: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSecurity {
    pub is_secure: bool,
    pub current_fee_bps: U256,
}

impl TransferSecurity {
    pub fn from_fee(fee_bps: U256) -> Self {
        Self {
            is_secure: fee_bps >= U256::from(NON_TRANSFERABLE_FEE_BPS),
            current_fee_bps: fee_bps,
        }
    }
}

/// Everything readable about a lock in one round of concurrent calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSnapshot {
    pub address: Address,
    pub caps: LockCaps,
    pub key_price: U256,
    pub token_address: Address,
    pub transfer_fee_bps: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub lock_address: Address,
    pub tx_hash: B256,
}

/// Result of a purchase or grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyIssuance {
    pub tx_hash: B256,
    pub token_ids: Vec<U256>,
}

/// `eth_sendTransaction` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "U256::is_zero")]
    pub value: U256,
}
