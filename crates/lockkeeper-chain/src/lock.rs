//! Contract Interaction Layer
//!
//! One client for the Unlock factory and PublicLock contracts. Reads go
//! through [`ChainClient`]; writes are signed by a [`Signer`], confirmed
//! by receipt, and fail fast when the signer lacks manager rights.
//!
//! ```text
//! deploy_lock
//!   createUpgradeableLockAtVersion(
//!       initialize(factory, duration, token, price, maxKeys, name),
//!       version,
//!       [ addLockManager(manager), addLockManager(platform...), renounceLockManager() ]
//!   )
//!   └── one transaction: the factory never keeps a manager role
//! ```

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use tracing::{debug, info, warn};

use crate::abi::{IPublicLock, IUnlock, IERC20};
use crate::client::ChainClient;
use crate::config::ChainConfig;
use crate::receipt::{extract_deployed_address, extract_token_ids, TransactionReceipt};
use crate::signer::Signer;
use crate::types::{
    Deployment, KeyIssuance, LockCaps, LockConfig, LockConfigUpdate, LockSnapshot, MaxKeysSecurity,
    TransactionRequest, TransferSecurity, NON_TRANSFERABLE_FEE_BPS,
};
use crate::{Error, Result};

pub struct LockClient {
    chain: ChainClient,
    signer: Arc<dyn Signer>,
    config: ChainConfig,
}

impl LockClient {
    pub fn new(chain: ChainClient, signer: Arc<dyn Signer>, config: ChainConfig) -> Self {
        Self { chain, signer, config }
    }

    /// Wire a client from configuration: read pool, signer endpoint, polling
    pub fn from_config(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let signer_address = config.signer()?;
        let transport = config.build_transport()?;
        let signer_transport = config.build_signer_transport(&transport)?;
        let chain = ChainClient::new(transport)
            .with_receipt_polling(config.receipt_poll_interval(), config.receipt_max_polls);
        let signer = Arc::new(crate::signer::NodeSigner::new(signer_address, signer_transport));
        Ok(Self::new(chain, signer, config))
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    // ========================================================================
    // DEPLOYMENT
    // ========================================================================

    /// Deploy a lock through the factory, adding `manager`, `extra_managers`
    /// and the configured platform managers, and renouncing the factory's
    /// own manager role, all in the creation transaction.
    pub async fn deploy_lock(
        &self,
        config: &LockConfig,
        manager: Address,
        extra_managers: &[Address],
    ) -> Result<Deployment> {
        let factory = self.config.factory_address;
        if factory.is_zero() {
            return Err(Error::Configuration("factory_address is not set".into()));
        }

        let initialize = IPublicLock::initializeCall {
            _lockCreator: factory,
            _expirationDuration: config.expiration_duration,
            _tokenAddress: config.token_address,
            _keyPrice: config.key_price,
            _maxNumberOfKeys: config.max_number_of_keys,
            _lockName: config.name.clone(),
        };

        let managers = manager_set(manager, extra_managers, &self.config.platform_managers);
        let mut transactions: Vec<Bytes> = managers
            .iter()
            .map(|account| IPublicLock::addLockManagerCall { account: *account }.abi_encode().into())
            .collect();
        transactions.push(IPublicLock::renounceLockManagerCall {}.abi_encode().into());

        let create = IUnlock::createUpgradeableLockAtVersionCall {
            data: initialize.abi_encode().into(),
            lockVersion: self.config.lock_version,
            transactions,
        };

        info!(
            name = %config.name,
            version = self.config.lock_version,
            managers = managers.len(),
            "Deploying lock"
        );
        let receipt = self.submit(factory, create.abi_encode().into(), U256::ZERO).await?;

        let lock_address = extract_deployed_address(&receipt, Some(self.signer_address())).ok_or_else(|| {
            Error::Contract(format!(
                "Deployment {} succeeded but no lock address was found in its receipt",
                receipt.transaction_hash
            ))
        })?;

        info!(lock = %lock_address, tx = %receipt.transaction_hash, "Lock deployed");
        Ok(Deployment {
            lock_address,
            tx_hash: receipt.transaction_hash,
        })
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    /// Buy one key for `recipient`, paying from the signer. ERC-20 locks get
    /// an allowance top-up first.
    pub async fn purchase_key(&self, lock: Address, recipient: Address) -> Result<KeyIssuance> {
        let buyer = self.signer_address();
        let (price, token) = tokio::try_join!(self.key_price(lock), self.token_address(lock))?;

        let value = if token.is_zero() {
            let balance = self.chain.get_balance(buyer).await?;
            if balance < price {
                return Err(Error::InsufficientFunds(format!(
                    "balance {balance} below key price {price}"
                )));
            }
            price
        } else {
            self.ensure_allowance(token, buyer, lock, price).await?;
            U256::ZERO
        };

        let call = IPublicLock::purchaseCall {
            _values: vec![price],
            _recipients: vec![recipient],
            _referrers: vec![Address::ZERO],
            _keyManagers: vec![Address::ZERO],
            _data: vec![Bytes::new()],
        };

        let receipt = self.submit(lock, call.abi_encode().into(), value).await?;
        Ok(KeyIssuance {
            tx_hash: receipt.transaction_hash,
            token_ids: extract_token_ids(&receipt),
        })
    }

    /// Grant keys without payment. Manager-gated.
    pub async fn grant_keys(
        &self,
        lock: Address,
        recipients: &[Address],
        expirations: &[U256],
    ) -> Result<KeyIssuance> {
        if recipients.is_empty() || recipients.len() != expirations.len() {
            return Err(Error::InvalidArgument(format!(
                "grant_keys needs one expiration per recipient ({} recipients, {} expirations)",
                recipients.len(),
                expirations.len()
            )));
        }
        self.ensure_lock_manager(lock).await?;

        let call = IPublicLock::grantKeysCall {
            _recipients: recipients.to_vec(),
            _expirationTimestamps: expirations.to_vec(),
            _keyManagers: vec![Address::ZERO; recipients.len()],
        };

        let receipt = self.submit(lock, call.abi_encode().into(), U256::ZERO).await?;
        let token_ids = extract_token_ids(&receipt);
        info!(lock = %lock, granted = token_ids.len(), "Keys granted");
        Ok(KeyIssuance {
            tx_hash: receipt.transaction_hash,
            token_ids,
        })
    }

    // ========================================================================
    // MANAGERS
    // ========================================================================

    pub async fn is_lock_manager(&self, lock: Address, account: Address) -> Result<bool> {
        Ok(self
            .chain
            .call_typed(lock, &IPublicLock::isLockManagerCall { account })
            .await?
            ._0)
    }

    /// Manager-gated
    pub async fn add_lock_manager(&self, lock: Address, account: Address) -> Result<B256> {
        self.ensure_lock_manager(lock).await?;
        let call = IPublicLock::addLockManagerCall { account };
        let receipt = self.submit(lock, call.abi_encode().into(), U256::ZERO).await?;
        info!(lock = %lock, manager = %account, "Lock manager added");
        Ok(receipt.transaction_hash)
    }

    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    pub async fn expiration_duration(&self, lock: Address) -> Result<U256> {
        Ok(self.chain.call_typed(lock, &IPublicLock::expirationDurationCall {}).await?._0)
    }

    pub async fn max_number_of_keys(&self, lock: Address) -> Result<U256> {
        Ok(self.chain.call_typed(lock, &IPublicLock::maxNumberOfKeysCall {}).await?._0)
    }

    pub async fn max_keys_per_address(&self, lock: Address) -> Result<U256> {
        Ok(self.chain.call_typed(lock, &IPublicLock::maxKeysPerAddressCall {}).await?._0)
    }

    pub async fn key_price(&self, lock: Address) -> Result<U256> {
        Ok(self.chain.call_typed(lock, &IPublicLock::keyPriceCall {}).await?._0)
    }

    pub async fn token_address(&self, lock: Address) -> Result<Address> {
        Ok(self.chain.call_typed(lock, &IPublicLock::tokenAddressCall {}).await?._0)
    }

    pub async fn transfer_fee_basis_points(&self, lock: Address) -> Result<U256> {
        Ok(self
            .chain
            .call_typed(lock, &IPublicLock::transferFeeBasisPointsCall {})
            .await?
            ._0)
    }

    /// Expiration and both caps, read concurrently
    pub async fn caps(&self, lock: Address) -> Result<LockCaps> {
        let (expiration_duration, max_number_of_keys, max_keys_per_address) = tokio::try_join!(
            self.expiration_duration(lock),
            self.max_number_of_keys(lock),
            self.max_keys_per_address(lock),
        )?;
        Ok(LockCaps {
            expiration_duration,
            max_number_of_keys,
            max_keys_per_address,
        })
    }

    /// Arguments for `updateLockConfig` that close the lock to purchases
    pub async fn get_lock_config_for_update(&self, lock: Address) -> Result<LockConfigUpdate> {
        let caps = self.caps(lock).await?;
        let update = LockConfigUpdate::secured_from(&caps);
        debug!(
            lock = %lock,
            current_max_keys = %caps.max_number_of_keys,
            per_address = %update.max_keys_per_address,
            "Prepared secured lock config"
        );
        Ok(update)
    }

    /// Manager-gated
    pub async fn update_lock_config(&self, lock: Address, update: &LockConfigUpdate) -> Result<B256> {
        self.ensure_lock_manager(lock).await?;
        let call = IPublicLock::updateLockConfigCall {
            _newExpirationDuration: update.expiration_duration,
            _maxNumberOfKeys: update.max_number_of_keys,
            _maxKeysPerAcccount: update.max_keys_per_address,
        };
        let receipt = self.submit(lock, call.abi_encode().into(), U256::ZERO).await?;
        info!(lock = %lock, max_keys = %update.max_number_of_keys, "Lock config updated");
        Ok(receipt.transaction_hash)
    }

    /// Secure iff on-chain `maxNumberOfKeys` is zero. Read-only.
    pub async fn verify_max_keys_security(&self, lock: Address) -> Result<MaxKeysSecurity> {
        let current_value = self.max_number_of_keys(lock).await?;
        Ok(MaxKeysSecurity {
            is_secure: current_value.is_zero(),
            current_value,
        })
    }

    /// Manager-gated
    pub async fn update_transfer_fee(&self, lock: Address, fee_bps: U256) -> Result<B256> {
        self.ensure_lock_manager(lock).await?;
        let call = IPublicLock::updateTransferFeeCall {
            _transferFeeBasisPoints: fee_bps,
        };
        let receipt = self.submit(lock, call.abi_encode().into(), U256::ZERO).await?;
        info!(lock = %lock, fee_bps = %fee_bps, "Transfer fee updated");
        Ok(receipt.transaction_hash)
    }

    /// Make keys non-transferable
    pub async fn disable_transfers(&self, lock: Address) -> Result<B256> {
        self.update_transfer_fee(lock, U256::from(NON_TRANSFERABLE_FEE_BPS)).await
    }

    pub async fn verify_transferability_security(&self, lock: Address) -> Result<TransferSecurity> {
        Ok(TransferSecurity::from_fee(self.transfer_fee_basis_points(lock).await?))
    }

    pub async fn snapshot(&self, lock: Address) -> Result<LockSnapshot> {
        let (caps, key_price, token_address, transfer_fee_bps) = tokio::try_join!(
            self.caps(lock),
            self.key_price(lock),
            self.token_address(lock),
            self.transfer_fee_basis_points(lock),
        )?;
        Ok(LockSnapshot {
            address: lock,
            caps,
            key_price,
            token_address,
            transfer_fee_bps,
        })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn ensure_lock_manager(&self, lock: Address) -> Result<()> {
        let account = self.signer_address();
        if self.is_lock_manager(lock, account).await? {
            return Ok(());
        }
        warn!(lock = %lock, account = %account, "Signer is not a lock manager");
        Err(Error::NotLockManager { lock, account })
    }

    async fn ensure_chain(&self) -> Result<()> {
        let current = self.signer.chain_id().await?;
        if current == self.config.chain_id {
            return Ok(());
        }
        self.signer.switch_chain(self.config.chain_id).await?;
        let switched = self.signer.chain_id().await?;
        if switched != self.config.chain_id {
            return Err(Error::Wallet(format!(
                "Signer is on chain {switched}, expected {}",
                self.config.chain_id
            )));
        }
        Ok(())
    }

    /// Check balance and allowance; approve and poll at a fixed interval
    /// when short. Gives up after `allowance_max_polls`.
    async fn ensure_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let balance = self.chain.call_typed(token, &IERC20::balanceOfCall { owner }).await?._0;
        if balance < amount {
            return Err(Error::InsufficientFunds(format!(
                "token balance {balance} below key price {amount}"
            )));
        }

        let mut allowance = self.allowance(token, owner, spender).await?;
        if allowance >= amount {
            return Ok(());
        }

        info!(token = %token, spender = %spender, amount = %amount, "Approving token spend");
        let approve = IERC20::approveCall { spender, amount };
        self.submit(token, approve.abi_encode().into(), U256::ZERO).await?;

        for poll in 0..self.config.allowance_max_polls {
            allowance = self.allowance(token, owner, spender).await?;
            if allowance >= amount {
                return Ok(());
            }
            debug!(poll, allowance = %allowance, "Allowance not visible yet");
            self.chain.sleep(self.config.allowance_poll_interval()).await;
        }

        Err(Error::InsufficientAllowance {
            have: allowance,
            need: amount,
        })
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        Ok(self
            .chain
            .call_typed(token, &IERC20::allowanceCall { owner, spender })
            .await?
            ._0)
    }

    /// Sign, send, wait for the receipt, and turn a failed status into an error
    async fn submit(&self, to: Address, data: Bytes, value: U256) -> Result<TransactionReceipt> {
        self.ensure_chain().await?;
        let tx = TransactionRequest {
            from: self.signer_address(),
            to,
            data,
            value,
        };
        let tx_hash = self.signer.send_transaction(tx).await?;
        debug!(tx = %tx_hash, to = %to, "Transaction sent");

        let receipt = self.chain.wait_for_receipt(tx_hash).await?;
        if !receipt.succeeded() {
            warn!(tx = %tx_hash, to = %to, "Transaction reverted");
            return Err(Error::Reverted { tx_hash });
        }
        Ok(receipt)
    }
}

/// `manager` first, then extras and platform managers; no zero address,
/// no duplicates
fn manager_set(manager: Address, extra: &[Address], platform: &[Address]) -> Vec<Address> {
    let mut managers = Vec::with_capacity(1 + extra.len() + platform.len());
    for account in std::iter::once(&manager).chain(extra).chain(platform) {
        if !account.is_zero() && !managers.contains(account) {
            managers.push(*account);
        }
    }
    managers
}
