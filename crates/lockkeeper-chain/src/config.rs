//! Chain configuration
//!
//! Loaded from YAML, then overridden by `LOCKKEEPER_*` environment variables.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use lockkeeper_rpc::{EndpointPool, FailoverTransport, TransportConfig};

use crate::{Error, Result};

pub const ENV_RPC_URLS: &str = "LOCKKEEPER_RPC_URLS";
pub const ENV_SIGNER: &str = "LOCKKEEPER_SIGNER";
pub const ENV_FACTORY: &str = "LOCKKEEPER_FACTORY";
pub const ENV_CHAIN_ID: &str = "LOCKKEEPER_CHAIN_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Read endpoints, tried in order with failover
    pub rpc_urls: Vec<String>,
    /// Endpoint holding the signing account; defaults to the first read endpoint
    pub signer_rpc_url: Option<String>,
    /// Account that signs deployments and manager-gated writes
    pub signer_address: Option<Address>,
    /// Unlock factory on this chain
    pub factory_address: Address,
    /// PublicLock implementation version used for new locks
    pub lock_version: u16,
    /// Platform accounts added as lock managers on every deployment
    pub platform_managers: Vec<Address>,
    pub receipt_poll_interval_ms: u64,
    pub receipt_max_polls: u32,
    pub allowance_poll_interval_ms: u64,
    pub allowance_max_polls: u32,
    pub transport: TransportConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 84532,
            rpc_urls: vec!["https://sepolia.base.org".to_string()],
            signer_rpc_url: None,
            signer_address: None,
            factory_address: Address::ZERO,
            lock_version: 14,
            platform_managers: Vec::new(),
            receipt_poll_interval_ms: 2_000,
            receipt_max_polls: 60,
            allowance_poll_interval_ms: 1_500,
            allowance_max_polls: 10,
            transport: TransportConfig::default(),
        }
    }
}

impl ChainConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Configuration(format!("Invalid config: {e}")))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Apply `LOCKKEEPER_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(urls) = lookup(ENV_RPC_URLS) {
            self.rpc_urls = EndpointPool::from_csv(&urls)?.urls().to_vec();
        }
        if let Some(signer) = lookup(ENV_SIGNER) {
            self.signer_address = Some(parse_address(ENV_SIGNER, &signer)?);
        }
        if let Some(factory) = lookup(ENV_FACTORY) {
            self.factory_address = parse_address(ENV_FACTORY, &factory)?;
        }
        if let Some(chain_id) = lookup(ENV_CHAIN_ID) {
            self.chain_id = chain_id
                .trim()
                .parse()
                .map_err(|e| Error::Configuration(format!("{ENV_CHAIN_ID}: {e}")))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        EndpointPool::new(&self.rpc_urls)?;
        if self.factory_address.is_zero() {
            return Err(Error::Configuration("factory_address is not set".into()));
        }
        if self.lock_version == 0 {
            return Err(Error::Configuration("lock_version must be non-zero".into()));
        }
        Ok(())
    }

    /// Signing account, required for any write
    pub fn signer(&self) -> Result<Address> {
        self.signer_address
            .ok_or_else(|| Error::Configuration("No signing account configured (signer_address)".into()))
    }

    pub fn build_transport(&self) -> Result<Arc<FailoverTransport>> {
        Ok(Arc::new(FailoverTransport::new(&self.rpc_urls, self.transport.clone())?))
    }

    /// Transport for the signing endpoint. Sends are not idempotent, so the
    /// signer always gets a single endpoint: the dedicated signer URL, or
    /// the read pool pinned to one node.
    pub fn build_signer_transport(&self, read: &Arc<FailoverTransport>) -> Result<Arc<FailoverTransport>> {
        match &self.signer_rpc_url {
            Some(url) => Ok(Arc::new(FailoverTransport::new([url], self.transport.clone())?)),
            None => Ok(Arc::new(read.pinned()?)),
        }
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn allowance_poll_interval(&self) -> Duration {
        Duration::from_millis(self.allowance_poll_interval_ms)
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("{key}: invalid address {value:?}: {e}")))
}
