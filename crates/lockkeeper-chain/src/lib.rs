//! # Lockkeeper Chain
//!
//! Unlock Protocol contract interaction on top of the failover transport.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        LockClient                          │
//! │  deploy_lock · purchase_key · grant_keys · add_lock_manager│
//! │  update_lock_config · update_transfer_fee · verify_*       │
//! └──────────────┬──────────────────────────────┬──────────────┘
//!                │ reads (eth_call)             │ writes
//!        ┌───────▼────────┐            ┌────────▼────────┐
//!        │  ChainClient   │◄───────────│     Signer      │
//!        │ receipts, poll │  receipts  │ chain id, send  │
//!        └───────┬────────┘            └────────┬────────┘
//!                └──────────┬───────────────────┘
//!                   FailoverTransport (lockkeeper-rpc)
//! ```
//!
//! Every manager-gated write checks `isLockManager(signer)` first and fails
//! with [`Error::NotLockManager`] before anything is broadcast.

pub mod abi;
pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod receipt;
pub mod signer;
pub mod types;

#[cfg(test)]
mod mock;

pub use client::ChainClient;
pub use config::ChainConfig;
pub use error::{Error, ErrorKind, Result};
pub use lock::LockClient;
pub use receipt::{extract_deployed_address, extract_token_ids, Log, TransactionReceipt};
pub use signer::{NodeSigner, Signer};
pub use types::{
    Deployment, KeyIssuance, LockCaps, LockConfig, LockConfigUpdate, LockSnapshot, MaxKeysSecurity,
    TransactionRequest, TransferSecurity, NON_TRANSFERABLE_FEE_BPS,
};

// Re-export the primitive types callers need to name
pub use alloy_primitives::{Address, B256, U256};
