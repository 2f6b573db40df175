//! # Lockkeeper Reconcile
//!
//! Keeps grant-based locks in their intended state and keeps the persisted
//! record honest about it.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        LockReconciler                           │
//! │   deploy · grant · secure · reconcile · verify · attach         │
//! ├──────────────┬──────────────────┬───────────────────────────────┤
//! │  LockPhase   │  plan_corrections│  ReconcileOutcome             │
//! │  transitions │  desired/observed│  grant · max_keys · transfer  │
//! └──────┬───────┴────────┬─────────┴──────────────┬────────────────┘
//!        │                │                        │
//!        │         LockBackend (chain)      projection (pure)
//!        │                                         │
//!        └──────────── SecurityStateStore ◄────────┘
//! ```
//!
//! Grant, max-keys and transferability are independent sub-steps. Each
//! records its own outcome, and a failure in one never blocks or undoes
//! another.

pub mod backend;
pub mod error;
pub mod outcome;
pub mod phase;
pub mod plan;
pub mod projection;
pub mod reconciler;
pub mod state;
pub mod store;

pub use backend::LockBackend;
pub use error::{Error, Result};
pub use outcome::{apply_deployment_outcome, DeploymentProjection, GrantOutcome, ReconcileOutcome, StepOutcome, SubStep};
pub use phase::{LockEvent, LockPhase};
pub use plan::{plan_corrections, Correction, DesiredLockState, ObservedLockState};
pub use projection::{
    effective_grant_for_save, effective_max_keys_for_save, effective_transferability_for_save, EffectiveFlag,
};
pub use reconciler::{ActionResult, LockReconciler, VerifyReport};
pub use state::{EntityKind, EntityRef, PersistedSecurityState};
pub use store::{JsonFileStore, MemoryStore, SecurityStateStore};
