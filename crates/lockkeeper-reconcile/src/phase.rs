//! Per-entity lock lifecycle
//!
//! ```text
//!   unsecured ──deploy──► granting ──ok──► granted_unsecured ──secure──► securing ──ok──► secured
//!       ▲                   │                                 ▲           │
//!       │                 fail                                │         fail
//!    (no lock)              ▼                                 │           ▼
//!                      grant_failed ──secure──────────────────┘     secure_failed
//!                           │  ▲                                          │
//!                           └──┴── regrant               retry ◄──secure──┘
//! ```
//!
//! Phases are never stored. The resting phase is recomputed from the
//! persisted flags, so a crash between steps resumes from whatever the last
//! recorded outcome says.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::PersistedSecurityState;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPhase {
    Unsecured,
    Granting,
    GrantFailed,
    GrantedUnsecured,
    Securing,
    SecureFailed,
    Secured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEvent {
    Deploy,
    Regrant,
    Secure,
    Succeeded,
    Failed,
}

impl fmt::Display for LockPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unsecured => "unsecured",
            Self::Granting => "granting",
            Self::GrantFailed => "grant_failed",
            Self::GrantedUnsecured => "granted_unsecured",
            Self::Securing => "securing",
            Self::SecureFailed => "secure_failed",
            Self::Secured => "secured",
        })
    }
}

impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deploy => "deploy",
            Self::Regrant => "regrant",
            Self::Secure => "secure",
            Self::Succeeded => "succeed",
            Self::Failed => "fail",
        })
    }
}

impl LockPhase {
    pub fn apply(self, event: LockEvent) -> Result<LockPhase> {
        use LockEvent::*;
        use LockPhase::*;

        let next = match (self, event) {
            (Unsecured | GrantFailed, Deploy) => Granting,
            (GrantFailed | GrantedUnsecured | SecureFailed | Secured, Regrant) => Granting,
            (GrantFailed | GrantedUnsecured | SecureFailed | Secured, Secure) => Securing,
            (Granting, Succeeded) => GrantedUnsecured,
            (Granting, Failed) => GrantFailed,
            (Securing, Succeeded) => Secured,
            (Securing, Failed) => SecureFailed,
            (from, event) => return Err(Error::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Resting phase implied by persisted flags
    pub fn resume_from(state: &PersistedSecurityState) -> LockPhase {
        if state.lock_address.is_none() {
            return if state.grant_failure_reason.is_some() {
                LockPhase::GrantFailed
            } else {
                LockPhase::Unsecured
            };
        }
        if !state.lock_manager_granted {
            return LockPhase::GrantFailed;
        }
        if state.max_keys_secured && state.transferability_secured {
            return LockPhase::Secured;
        }
        if state.max_keys_failure_reason.is_some() || state.transferability_failure_reason.is_some() {
            return LockPhase::SecureFailed;
        }
        LockPhase::GrantedUnsecured
    }
}
