//! Reconciler errors
//!
//! Failures of individual sub-steps are not errors here: they are recorded
//! in the outcome and persisted with a reason. These variants cover the
//! cases where an action cannot start at all.

use alloy_primitives::Address;

use crate::phase::{LockEvent, LockPhase};
use crate::state::EntityRef;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chain(#[from] lockkeeper_chain::Error),

    #[error("Cannot {event} a lock in phase {from}")]
    InvalidTransition { from: LockPhase, event: LockEvent },

    #[error("No lock deployed for {0}")]
    NoLock(EntityRef),

    #[error("{entity} already has lock {lock}")]
    AlreadyDeployed { entity: EntityRef, lock: Address },

    #[error("Invalid entity reference: {0}")]
    InvalidEntity(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
