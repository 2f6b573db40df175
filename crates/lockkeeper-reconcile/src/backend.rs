//! The contract operations the reconciler drives

use alloy_primitives::{Address, B256};
use async_trait::async_trait;

use lockkeeper_chain::{
    Deployment, LockClient, LockConfig, LockConfigUpdate, MaxKeysSecurity, Result, TransferSecurity,
};

#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Account that signs every write
    fn signer(&self) -> Address;

    async fn deploy_lock(
        &self,
        config: &LockConfig,
        manager: Address,
        extra_managers: &[Address],
    ) -> Result<Deployment>;

    async fn is_lock_manager(&self, lock: Address, account: Address) -> Result<bool>;

    async fn add_lock_manager(&self, lock: Address, account: Address) -> Result<B256>;

    async fn get_lock_config_for_update(&self, lock: Address) -> Result<LockConfigUpdate>;

    async fn update_lock_config(&self, lock: Address, update: &LockConfigUpdate) -> Result<B256>;

    async fn verify_max_keys_security(&self, lock: Address) -> Result<MaxKeysSecurity>;

    async fn disable_transfers(&self, lock: Address) -> Result<B256>;

    async fn verify_transferability_security(&self, lock: Address) -> Result<TransferSecurity>;
}

#[async_trait]
impl LockBackend for LockClient {
    fn signer(&self) -> Address {
        self.signer_address()
    }

    async fn deploy_lock(
        &self,
        config: &LockConfig,
        manager: Address,
        extra_managers: &[Address],
    ) -> Result<Deployment> {
        LockClient::deploy_lock(self, config, manager, extra_managers).await
    }

    async fn is_lock_manager(&self, lock: Address, account: Address) -> Result<bool> {
        LockClient::is_lock_manager(self, lock, account).await
    }

    async fn add_lock_manager(&self, lock: Address, account: Address) -> Result<B256> {
        LockClient::add_lock_manager(self, lock, account).await
    }

    async fn get_lock_config_for_update(&self, lock: Address) -> Result<LockConfigUpdate> {
        LockClient::get_lock_config_for_update(self, lock).await
    }

    async fn update_lock_config(&self, lock: Address, update: &LockConfigUpdate) -> Result<B256> {
        LockClient::update_lock_config(self, lock, update).await
    }

    async fn verify_max_keys_security(&self, lock: Address) -> Result<MaxKeysSecurity> {
        LockClient::verify_max_keys_security(self, lock).await
    }

    async fn disable_transfers(&self, lock: Address) -> Result<B256> {
        LockClient::disable_transfers(self, lock).await
    }

    async fn verify_transferability_security(&self, lock: Address) -> Result<TransferSecurity> {
        LockClient::verify_transferability_security(self, lock).await
    }
}
