//! Error taxonomy for chain writes and reads
//!
//! Callers branch on [`ErrorKind`], never on message text.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use lockkeeper_rpc::jsonrpc::{
    EXECUTION_REVERTED, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, USER_REJECTED,
};

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UserRejected,
    InsufficientFunds,
    NetworkError,
    ContractError,
    WalletError,
    ConfigurationError,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::ContractError => "contract_error",
            ErrorKind::WalletError => "wallet_error",
            ErrorKind::ConfigurationError => "configuration_error",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transaction rejected by signer: {0}")]
    UserRejected(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Insufficient token allowance: have {have}, need {need}")]
    InsufficientAllowance { have: U256, need: U256 },

    #[error("RPC error: {0}")]
    Rpc(#[source] lockkeeper_rpc::Error),

    #[error("Timed out waiting for receipt of {tx_hash}")]
    ReceiptTimeout { tx_hash: B256 },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("{account} must be lock manager of {lock}")]
    NotLockManager { lock: Address, account: Address },

    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller asked for something no node can execute
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserRejected(_) => ErrorKind::UserRejected,
            Error::InsufficientFunds(_) | Error::InsufficientAllowance { .. } => {
                ErrorKind::InsufficientFunds
            }
            Error::Rpc(e) if e.is_retryable() => ErrorKind::NetworkError,
            Error::Rpc(_) => ErrorKind::Unknown,
            Error::ReceiptTimeout { .. } => ErrorKind::NetworkError,
            Error::Contract(_) | Error::NotLockManager { .. } | Error::Reverted { .. } => {
                ErrorKind::ContractError
            }
            Error::Wallet(_) => ErrorKind::WalletError,
            Error::Configuration(_) | Error::InvalidArgument(_) => ErrorKind::ConfigurationError,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Operator-facing message, safe to show verbatim
    pub fn user_message(&self) -> String {
        match self {
            Error::UserRejected(_) => "Transaction was rejected in the wallet".to_string(),
            Error::InsufficientFunds(detail) => {
                format!("Insufficient funds to pay for this transaction ({detail})")
            }
            Error::InsufficientAllowance { have, need } => format!(
                "Insufficient token allowance: approved {have}, key price requires {need}"
            ),
            Error::Rpc(e) if e.is_retryable() => {
                format!("Network error talking to the RPC node: {e}")
            }
            Error::ReceiptTimeout { tx_hash } => format!(
                "Transaction {tx_hash} was sent but not confirmed in time; check it on a block explorer"
            ),
            other => other.to_string(),
        }
    }
}

impl From<lockkeeper_rpc::Error> for Error {
    fn from(err: lockkeeper_rpc::Error) -> Self {
        let (code, message) = match &err {
            lockkeeper_rpc::Error::Rpc { code, message, .. } => (*code, message.to_lowercase()),
            lockkeeper_rpc::Error::NoEndpoints => {
                return Error::Configuration(err.to_string());
            }
            _ => return Error::Rpc(err),
        };

        if code == USER_REJECTED || message.contains("user rejected") || message.contains("user denied") {
            return Error::UserRejected(err.to_string());
        }
        if message.contains("insufficient funds") {
            return Error::InsufficientFunds(err.to_string());
        }
        if code == EXECUTION_REVERTED || message.contains("execution reverted") {
            return Error::Contract(err.to_string());
        }
        if message.contains("unknown account") || message.contains("authentication needed") {
            return Error::Wallet(err.to_string());
        }
        if code == METHOD_NOT_FOUND {
            return Error::Configuration(err.to_string());
        }
        if matches!(code, INVALID_PARAMS | INVALID_REQUEST | PARSE_ERROR) {
            return Error::InvalidArgument(err.to_string());
        }
        Error::Rpc(err)
    }
}

impl From<alloy_sol_types::Error> for Error {
    fn from(err: alloy_sol_types::Error) -> Self {
        Error::Contract(format!("ABI decode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc(code: i64, message: &str) -> lockkeeper_rpc::Error {
        lockkeeper_rpc::Error::Rpc {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(Error::from(rpc(4001, "User rejected the request")).kind(), ErrorKind::UserRejected);
        assert_eq!(
            Error::from(rpc(-32000, "insufficient funds for gas * price + value")).kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            Error::from(rpc(3, "execution reverted: not owner")).kind(),
            ErrorKind::ContractError
        );
        assert_eq!(Error::from(rpc(-32000, "unknown account")).kind(), ErrorKind::WalletError);
        assert_eq!(Error::from(rpc(-32601, "method not found")).kind(), ErrorKind::ConfigurationError);
        assert_eq!(Error::from(rpc(-32602, "invalid params")).kind(), ErrorKind::ConfigurationError);
        assert!(matches!(Error::from(rpc(-32600, "invalid request")), Error::InvalidArgument(_)));
        assert_eq!(Error::from(rpc(-32603, "internal error")).kind(), ErrorKind::NetworkError);
        assert_eq!(
            Error::from(lockkeeper_rpc::Error::AllEndpointsFailed(3)).kind(),
            ErrorKind::NetworkError
        );
        assert_eq!(
            Error::from(lockkeeper_rpc::Error::NoEndpoints).kind(),
            ErrorKind::ConfigurationError
        );
    }

    #[test]
    fn test_allowance_message_differs_from_balance() {
        let allowance = Error::InsufficientAllowance {
            have: U256::from(1),
            need: U256::from(10),
        };
        let balance = Error::InsufficientFunds("balance 1 below 10".into());

        assert_eq!(allowance.kind(), balance.kind());
        assert!(allowance.user_message().contains("allowance"));
        assert!(!balance.user_message().contains("allowance"));
    }

    #[test]
    fn test_not_lock_manager_is_contract_error() {
        let err = Error::NotLockManager {
            lock: Address::ZERO,
            account: Address::repeat_byte(1),
        };
        assert_eq!(err.kind(), ErrorKind::ContractError);
        assert!(err.user_message().contains("must be lock manager"));
    }
}
