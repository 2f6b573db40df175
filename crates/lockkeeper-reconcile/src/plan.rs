//! Desired vs observed lock configuration

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use lockkeeper_chain::NON_TRANSFERABLE_FEE_BPS;

use crate::outcome::SubStep;

/// What a grant-based lock should look like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredLockState {
    pub managers: Vec<Address>,
    pub max_number_of_keys: U256,
    pub transfer_fee_bps: U256,
}

impl DesiredLockState {
    /// Purchases closed, keys non-transferable, `managers` hold the lock
    pub fn grant_based(managers: impl IntoIterator<Item = Address>) -> Self {
        let mut unique = Vec::new();
        for manager in managers {
            if !manager.is_zero() && !unique.contains(&manager) {
                unique.push(manager);
            }
        }
        Self {
            managers: unique,
            max_number_of_keys: U256::ZERO,
            transfer_fee_bps: U256::from(NON_TRANSFERABLE_FEE_BPS),
        }
    }
}

/// What the chain reports right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedLockState {
    pub lock: Address,
    /// `isLockManager` for every desired manager
    pub managers: BTreeMap<Address, bool>,
    pub max_number_of_keys: U256,
    pub transfer_fee_bps: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Correction {
    AddManager { account: Address },
    ZeroMaxKeys { current: U256 },
    DisableTransfers { current_fee_bps: U256 },
}

impl Correction {
    pub fn step(&self) -> SubStep {
        match self {
            Correction::AddManager { .. } => SubStep::Grant,
            Correction::ZeroMaxKeys { .. } => SubStep::MaxKeys,
            Correction::DisableTransfers { .. } => SubStep::Transferability,
        }
    }
}

/// Minimal corrections, in execution order: managers first so the
/// config writes that follow are authorized.
pub fn plan_corrections(desired: &DesiredLockState, observed: &ObservedLockState) -> Vec<Correction> {
    let mut plan: Vec<Correction> = desired
        .managers
        .iter()
        .filter(|account| !observed.managers.get(*account).copied().unwrap_or(false))
        .map(|account| Correction::AddManager { account: *account })
        .collect();

    if observed.max_number_of_keys != desired.max_number_of_keys {
        plan.push(Correction::ZeroMaxKeys {
            current: observed.max_number_of_keys,
        });
    }
    if observed.transfer_fee_bps < desired.transfer_fee_bps {
        plan.push(Correction::DisableTransfers {
            current_fee_bps: observed.transfer_fee_bps,
        });
    }
    plan
}
