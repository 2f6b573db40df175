//! Effective-State Projection
//!
//! The only way a granted/secured flag reaches persistence. For each
//! sub-step:
//!
//! ```text
//! fresh outcome?  ── yes ──► value = !failed, reason = error (or default) when failed
//!       │ no
//! lock deployed?  ── yes ──► persisted value and reason, unchanged
//!       │ no
//!       └────────────────► false, no reason
//! ```

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::outcome::{StepOutcome, DEFAULT_GRANT_ERROR, DEFAULT_MAX_KEYS_ERROR, DEFAULT_TRANSFER_ERROR};

/// A flag and the reason it is not set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveFlag {
    pub value: bool,
    pub reason: Option<String>,
}

pub fn effective_grant_for_save(
    outcome: Option<&StepOutcome>,
    lock_address: Option<Address>,
    current_granted: bool,
    current_reason: Option<&str>,
) -> EffectiveFlag {
    project(outcome, lock_address, current_granted, current_reason, DEFAULT_GRANT_ERROR)
}

pub fn effective_max_keys_for_save(
    outcome: Option<&StepOutcome>,
    lock_address: Option<Address>,
    current_secured: bool,
    current_reason: Option<&str>,
) -> EffectiveFlag {
    project(outcome, lock_address, current_secured, current_reason, DEFAULT_MAX_KEYS_ERROR)
}

pub fn effective_transferability_for_save(
    outcome: Option<&StepOutcome>,
    lock_address: Option<Address>,
    current_secured: bool,
    current_reason: Option<&str>,
) -> EffectiveFlag {
    project(outcome, lock_address, current_secured, current_reason, DEFAULT_TRANSFER_ERROR)
}

fn project(
    outcome: Option<&StepOutcome>,
    lock_address: Option<Address>,
    current: bool,
    current_reason: Option<&str>,
    default_reason: &str,
) -> EffectiveFlag {
    if let Some(outcome) = outcome {
        return EffectiveFlag {
            value: !outcome.failed,
            reason: outcome
                .failed
                .then(|| outcome.error.clone().unwrap_or_else(|| default_reason.to_string())),
        };
    }

    if lock_address.is_some() {
        // A set flag never carries a reason
        return EffectiveFlag {
            value: current,
            reason: if current { None } else { current_reason.map(str::to_string) },
        };
    }

    EffectiveFlag::default()
}
