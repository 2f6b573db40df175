//! Lock Security Reconciler
//!
//! Drives one entity's lock through deploy, grant and secure, recording
//! each sub-step's outcome independently and folding it into persisted
//! state through the projection.
//!
//! ```text
//!  observe ──► plan_corrections ──► execute (per sub-step, failures isolated)
//!     ▲                                   │
//!     └──────────── re-observe ◄──────────┘  a write that did not take
//!                                            effect is a failure
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lockkeeper_chain::LockConfig;

use crate::backend::LockBackend;
use crate::outcome::{ReconcileOutcome, StepOutcome, SubStep};
use crate::phase::{LockEvent, LockPhase};
use crate::plan::{plan_corrections, Correction, DesiredLockState, ObservedLockState};
use crate::state::{EntityRef, PersistedSecurityState};
use crate::store::SecurityStateStore;
use crate::{Error, Result};

const ALL_STEPS: [SubStep; 3] = [SubStep::Grant, SubStep::MaxKeys, SubStep::Transferability];
const SECURE_STEPS: [SubStep; 2] = [SubStep::MaxKeys, SubStep::Transferability];

/// What an admin action hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn from_outcome(lock_address: Option<Address>, transaction_hash: Option<B256>, outcome: &ReconcileOutcome) -> Self {
        Self {
            success: !outcome.any_failed(),
            transaction_hash,
            lock_address,
            error: outcome.failure_reason(),
        }
    }
}

/// Read-only comparison of persisted and on-chain state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub entity: EntityRef,
    pub lock_address: Address,
    pub secure: bool,
    pub observed: ObservedLockState,
    pub pending: Vec<Correction>,
    pub state: PersistedSecurityState,
}

struct StepRun {
    outcome: ReconcileOutcome,
    last_tx: Option<B256>,
}

pub struct LockReconciler {
    backend: Arc<dyn LockBackend>,
    store: Arc<dyn SecurityStateStore>,
    platform_managers: Vec<Address>,
}

impl LockReconciler {
    pub fn new(backend: Arc<dyn LockBackend>, store: Arc<dyn SecurityStateStore>) -> Self {
        Self {
            backend,
            store,
            platform_managers: Vec::new(),
        }
    }

    pub fn with_platform_managers(mut self, managers: Vec<Address>) -> Self {
        self.platform_managers = managers;
        self
    }

    /// Signer plus platform managers, purchases closed, non-transferable
    pub fn desired(&self) -> DesiredLockState {
        DesiredLockState::grant_based(
            std::iter::once(self.backend.signer()).chain(self.platform_managers.iter().copied()),
        )
    }

    pub async fn status(&self, entity: &EntityRef) -> Result<PersistedSecurityState> {
        Ok(self.store.load(entity).await?.unwrap_or_default())
    }

    pub async fn status_all(&self) -> Result<Vec<(EntityRef, PersistedSecurityState)>> {
        self.store.list().await
    }

    pub async fn phase(&self, entity: &EntityRef) -> Result<LockPhase> {
        Ok(LockPhase::resume_from(&self.status(entity).await?))
    }

    /// Record a lock deployed elsewhere; nothing about it is trusted yet
    pub async fn attach(&self, entity: &EntityRef, lock: Address) -> Result<PersistedSecurityState> {
        let current = self.status(entity).await?;
        match current.lock_address {
            Some(existing) if existing == lock => return Ok(current),
            Some(existing) => {
                return Err(Error::AlreadyDeployed {
                    entity: entity.clone(),
                    lock: existing,
                })
            }
            None => {}
        }

        let state = PersistedSecurityState {
            lock_address: Some(lock),
            updated_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        self.store.save(entity, &state).await?;
        info!(entity = %entity, lock = %lock, "Lock attached");
        Ok(state)
    }

    /// Deploy a lock for `entity`, then grant and secure it
    pub async fn deploy(
        &self,
        entity: &EntityRef,
        config: &LockConfig,
        extra_managers: &[Address],
    ) -> Result<ActionResult> {
        let state = self.status(entity).await?;
        if let Some(lock) = state.lock_address {
            return Err(Error::AlreadyDeployed {
                entity: entity.clone(),
                lock,
            });
        }
        let phase = transition(entity, LockPhase::resume_from(&state), LockEvent::Deploy)?;

        let signer = self.backend.signer();
        let mut managers = extra_managers.to_vec();
        managers.extend(self.platform_managers.iter().copied());

        let deployment = match self.backend.deploy_lock(config, signer, &managers).await {
            Ok(deployment) => deployment,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Lock deployment failed");
                transition(entity, phase, LockEvent::Failed)?;
                let outcome = ReconcileOutcome {
                    grant: Some(StepOutcome::failed(e.user_message())),
                    ..Default::default()
                };
                return self.finish(entity, &state, None, None, outcome).await;
            }
        };

        let lock = deployment.lock_address;
        info!(entity = %entity, lock = %lock, tx = %deployment.tx_hash, "Lock deployed, securing");

        let run = self.run_steps(lock, &ALL_STEPS).await;
        self.walk_grant_then_secure(entity, phase, &run.outcome)?;
        self.finish(entity, &state, Some(lock), Some(deployment.tx_hash), run.outcome)
            .await
    }

    /// Ensure the signer and platform managers hold the lock
    pub async fn grant(&self, entity: &EntityRef) -> Result<ActionResult> {
        let (state, lock) = self.require_lock(entity).await?;
        let phase = transition(entity, LockPhase::resume_from(&state), LockEvent::Regrant)?;

        let run = self.run_steps(lock, &[SubStep::Grant]).await;
        transition(entity, phase, settle(&run.outcome, &[SubStep::Grant]))?;
        self.finish(entity, &state, Some(lock), run.last_tx, run.outcome).await
    }

    /// Close purchases and disable transfers
    pub async fn secure(&self, entity: &EntityRef) -> Result<ActionResult> {
        let (state, lock) = self.require_lock(entity).await?;
        let phase = transition(entity, LockPhase::resume_from(&state), LockEvent::Secure)?;

        let run = self.run_steps(lock, &SECURE_STEPS).await;
        transition(entity, phase, settle(&run.outcome, &SECURE_STEPS))?;
        self.finish(entity, &state, Some(lock), run.last_tx, run.outcome).await
    }

    /// Grant and secure in one pass, issuing only the corrections needed
    pub async fn reconcile(&self, entity: &EntityRef) -> Result<ActionResult> {
        let (state, lock) = self.require_lock(entity).await?;
        let phase = transition(entity, LockPhase::resume_from(&state), LockEvent::Regrant)?;

        let run = self.run_steps(lock, &ALL_STEPS).await;
        self.walk_grant_then_secure(entity, phase, &run.outcome)?;
        self.finish(entity, &state, Some(lock), run.last_tx, run.outcome).await
    }

    /// Compare chain to desired state without writing to chain. Persisted
    /// flags are brought in line with what the chain reports.
    pub async fn verify(&self, entity: &EntityRef) -> Result<VerifyReport> {
        let (state, lock) = self.require_lock(entity).await?;
        let desired = self.desired();
        let observed = self.observe(lock, &desired).await?;
        let pending = plan_corrections(&desired, &observed);

        let mut drift: HashMap<SubStep, String> = HashMap::new();
        for correction in &pending {
            note_failure(&mut drift, correction.step(), describe(correction));
        }
        let mut outcome = ReconcileOutcome::default();
        for step in ALL_STEPS {
            outcome.set(step, step_outcome(&mut drift, step));
        }

        let saved = state.fold(Some(lock), &outcome);
        self.store.save(entity, &saved).await?;

        if pending.is_empty() {
            info!(entity = %entity, lock = %lock, "Lock verified secure");
        } else {
            warn!(entity = %entity, lock = %lock, pending = pending.len(), "Lock drifted from desired state");
        }

        Ok(VerifyReport {
            entity: entity.clone(),
            lock_address: lock,
            secure: pending.is_empty(),
            observed,
            pending,
            state: saved,
        })
    }

    async fn require_lock(&self, entity: &EntityRef) -> Result<(PersistedSecurityState, Address)> {
        let state = self.status(entity).await?;
        match state.lock_address {
            Some(lock) => Ok((state, lock)),
            None => Err(Error::NoLock(entity.clone())),
        }
    }

    fn walk_grant_then_secure(
        &self,
        entity: &EntityRef,
        granting: LockPhase,
        outcome: &ReconcileOutcome,
    ) -> Result<LockPhase> {
        let granted = transition(entity, granting, settle(outcome, &[SubStep::Grant]))?;
        let securing = transition(entity, granted, LockEvent::Secure)?;
        transition(entity, securing, settle(outcome, &SECURE_STEPS))
    }

    async fn finish(
        &self,
        entity: &EntityRef,
        previous: &PersistedSecurityState,
        lock: Option<Address>,
        tx: Option<B256>,
        outcome: ReconcileOutcome,
    ) -> Result<ActionResult> {
        let saved = previous.fold(lock, &outcome);
        self.store.save(entity, &saved).await?;
        debug!(entity = %entity, phase = %LockPhase::resume_from(&saved), "Security state persisted");
        Ok(ActionResult::from_outcome(lock, tx, &outcome))
    }

    async fn observe(
        &self,
        lock: Address,
        desired: &DesiredLockState,
    ) -> lockkeeper_chain::Result<ObservedLockState> {
        let managers = futures::future::try_join_all(desired.managers.iter().map(|account| async move {
            self.backend
                .is_lock_manager(lock, *account)
                .await
                .map(|is_manager| (*account, is_manager))
        }));

        let (managers, max_keys, transfer) = futures::try_join!(
            managers,
            self.backend.verify_max_keys_security(lock),
            self.backend.verify_transferability_security(lock),
        )?;

        Ok(ObservedLockState {
            lock,
            managers: managers.into_iter().collect(),
            max_number_of_keys: max_keys.current_value,
            transfer_fee_bps: transfer.current_fee_bps,
        })
    }

    async fn apply_correction(&self, lock: Address, correction: &Correction) -> lockkeeper_chain::Result<B256> {
        match correction {
            Correction::AddManager { account } => self.backend.add_lock_manager(lock, *account).await,
            Correction::ZeroMaxKeys { .. } => {
                let update = self.backend.get_lock_config_for_update(lock).await?;
                self.backend.update_lock_config(lock, &update).await
            }
            Correction::DisableTransfers { .. } => self.backend.disable_transfers(lock).await,
        }
    }

    /// Observe, correct, re-observe. Every requested step gets an outcome.
    async fn run_steps(&self, lock: Address, steps: &[SubStep]) -> StepRun {
        let desired = self.desired();
        let mut failures: HashMap<SubStep, String> = HashMap::new();
        let mut last_tx = None;

        let plan = match self.observe(lock, &desired).await {
            Ok(observed) => plan_corrections(&desired, &observed),
            Err(e) => {
                warn!(lock = %lock, error = %e, "Cannot read lock state");
                let reason = format!("Could not read lock state: {}", e.user_message());
                for step in steps {
                    note_failure(&mut failures, *step, reason.clone());
                }
                Vec::new()
            }
        };

        let mut written: Vec<SubStep> = Vec::new();
        for correction in plan.iter().filter(|c| steps.contains(&c.step())) {
            let step = correction.step();
            if failures.contains_key(&step) {
                continue;
            }
            match self.apply_correction(lock, correction).await {
                Ok(tx) => {
                    info!(lock = %lock, step = %step, tx = %tx, "Correction applied");
                    last_tx = Some(tx);
                    if !written.contains(&step) {
                        written.push(step);
                    }
                }
                Err(e) => {
                    warn!(lock = %lock, step = %step, error = %e, "Correction failed");
                    note_failure(&mut failures, step, e.user_message());
                }
            }
        }

        written.retain(|step| !failures.contains_key(step));
        if !written.is_empty() {
            match self.observe(lock, &desired).await {
                Ok(after) => {
                    for remaining in plan_corrections(&desired, &after) {
                        let step = remaining.step();
                        if written.contains(&step) {
                            warn!(lock = %lock, step = %step, "Correction did not take effect");
                            note_failure(
                                &mut failures,
                                step,
                                format!("Still not secure after update: {}", describe(&remaining)),
                            );
                        }
                    }
                }
                Err(e) => {
                    for step in &written {
                        note_failure(
                            &mut failures,
                            *step,
                            format!("Could not verify {step} after update: {}", e.user_message()),
                        );
                    }
                }
            }
        }

        let mut outcome = ReconcileOutcome::default();
        for step in steps {
            outcome.set(*step, step_outcome(&mut failures, *step));
        }
        StepRun { outcome, last_tx }
    }
}

fn transition(entity: &EntityRef, from: LockPhase, event: LockEvent) -> Result<LockPhase> {
    let to = from.apply(event)?;
    info!(entity = %entity, from = %from, event = %event, to = %to, "Lock phase transition");
    Ok(to)
}

fn settle(outcome: &ReconcileOutcome, steps: &[SubStep]) -> LockEvent {
    let failed = steps
        .iter()
        .filter_map(|step| outcome.step(*step))
        .any(|step| step.failed);
    if failed {
        LockEvent::Failed
    } else {
        LockEvent::Succeeded
    }
}

fn note_failure(failures: &mut HashMap<SubStep, String>, step: SubStep, message: String) {
    failures
        .entry(step)
        .and_modify(|existing| {
            existing.push_str("; ");
            existing.push_str(&message);
        })
        .or_insert(message);
}

fn step_outcome(failures: &mut HashMap<SubStep, String>, step: SubStep) -> StepOutcome {
    failures
        .remove(&step)
        .map(StepOutcome::failed)
        .unwrap_or_else(StepOutcome::ok)
}

fn describe(correction: &Correction) -> String {
    match correction {
        Correction::AddManager { account } => format!("{account} is not a lock manager"),
        Correction::ZeroMaxKeys { current } => format!("maxNumberOfKeys is {current}, expected 0"),
        Correction::DisableTransfers { current_fee_bps } => {
            format!("transfer fee is {current_fee_bps} bps, keys are transferable")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EntityKind;
    use crate::store::MemoryStore;
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use lockkeeper_chain::{
        Deployment, LockConfigUpdate, MaxKeysSecurity, TransferSecurity, NON_TRANSFERABLE_FEE_BPS,
    };
    use std::collections::HashSet;
    use std::sync::Mutex;

    const SIGNER: Address = Address::repeat_byte(0x5e);
    const PLATFORM: Address = Address::repeat_byte(0x99);
    const NEW_LOCK: Address = Address::repeat_byte(0xbb);

    struct FakeLock {
        managers: HashSet<Address>,
        max_keys: U256,
        per_address: U256,
        fee: U256,
    }

    #[derive(Default)]
    struct Faults {
        deploy: Option<String>,
        add_manager: Option<String>,
        update_config: Option<String>,
        disable_transfers: Option<String>,
        ignore_config_update: bool,
    }

    #[derive(Default)]
    struct FakeBackend {
        locks: Mutex<HashMap<Address, FakeLock>>,
        faults: Mutex<Faults>,
        writes: Mutex<Vec<&'static str>>,
    }

    impl FakeBackend {
        fn with_lock(lock: Address, managers: &[Address], max_keys: u64, fee: u64) -> Self {
            let backend = Self::default();
            backend.locks.lock().unwrap().insert(
                lock,
                FakeLock {
                    managers: managers.iter().copied().collect(),
                    max_keys: U256::from(max_keys),
                    per_address: U256::ZERO,
                    fee: U256::from(fee),
                },
            );
            backend
        }

        fn writes(&self) -> Vec<&'static str> {
            self.writes.lock().unwrap().clone()
        }

        fn gated<T>(&self, lock: Address, name: &'static str, f: impl FnOnce(&mut FakeLock) -> T) -> lockkeeper_chain::Result<T> {
            let mut locks = self.locks.lock().unwrap();
            let entry = locks
                .get_mut(&lock)
                .ok_or_else(|| lockkeeper_chain::Error::Contract("no code at address".into()))?;
            if !entry.managers.contains(&SIGNER) {
                return Err(lockkeeper_chain::Error::NotLockManager { lock, account: SIGNER });
            }
            self.writes.lock().unwrap().push(name);
            Ok(f(entry))
        }

        fn read<T>(&self, lock: Address, f: impl FnOnce(&FakeLock) -> T) -> lockkeeper_chain::Result<T> {
            let locks = self.locks.lock().unwrap();
            locks
                .get(&lock)
                .map(f)
                .ok_or_else(|| lockkeeper_chain::Error::Contract("no code at address".into()))
        }
    }

    #[async_trait]
    impl LockBackend for FakeBackend {
        fn signer(&self) -> Address {
            SIGNER
        }

        async fn deploy_lock(
            &self,
            config: &LockConfig,
            manager: Address,
            extra_managers: &[Address],
        ) -> lockkeeper_chain::Result<Deployment> {
            if let Some(message) = &self.faults.lock().unwrap().deploy {
                return Err(lockkeeper_chain::Error::Contract(message.clone()));
            }
            let mut managers: HashSet<Address> = extra_managers.iter().copied().collect();
            managers.insert(manager);
            self.locks.lock().unwrap().insert(
                NEW_LOCK,
                FakeLock {
                    managers,
                    max_keys: config.max_number_of_keys,
                    per_address: U256::ZERO,
                    fee: U256::ZERO,
                },
            );
            self.writes.lock().unwrap().push("deploy");
            Ok(Deployment {
                lock_address: NEW_LOCK,
                tx_hash: B256::repeat_byte(0xd0),
            })
        }

        async fn is_lock_manager(&self, lock: Address, account: Address) -> lockkeeper_chain::Result<bool> {
            self.read(lock, |l| l.managers.contains(&account))
        }

        async fn add_lock_manager(&self, lock: Address, account: Address) -> lockkeeper_chain::Result<B256> {
            if let Some(message) = self.faults.lock().unwrap().add_manager.clone() {
                return Err(lockkeeper_chain::Error::Contract(message));
            }
            self.gated(lock, "add_manager", |l| {
                l.managers.insert(account);
                B256::repeat_byte(0xa1)
            })
        }

        async fn get_lock_config_for_update(&self, lock: Address) -> lockkeeper_chain::Result<LockConfigUpdate> {
            self.read(lock, |l| LockConfigUpdate {
                expiration_duration: U256::MAX,
                max_number_of_keys: U256::ZERO,
                max_keys_per_address: if l.per_address.is_zero() { U256::from(1) } else { l.per_address },
            })
        }

        async fn update_lock_config(
            &self,
            lock: Address,
            update: &LockConfigUpdate,
        ) -> lockkeeper_chain::Result<B256> {
            let (fault, ignore) = {
                let faults = self.faults.lock().unwrap();
                (faults.update_config.clone(), faults.ignore_config_update)
            };
            if let Some(message) = fault {
                return Err(lockkeeper_chain::Error::Contract(message));
            }
            let update = *update;
            self.gated(lock, "update_config", move |l| {
                if !ignore {
                    l.max_keys = update.max_number_of_keys;
                    l.per_address = update.max_keys_per_address;
                }
                B256::repeat_byte(0xc0)
            })
        }

        async fn verify_max_keys_security(&self, lock: Address) -> lockkeeper_chain::Result<MaxKeysSecurity> {
            self.read(lock, |l| MaxKeysSecurity {
                is_secure: l.max_keys.is_zero(),
                current_value: l.max_keys,
            })
        }

        async fn disable_transfers(&self, lock: Address) -> lockkeeper_chain::Result<B256> {
            if let Some(message) = self.faults.lock().unwrap().disable_transfers.clone() {
                return Err(lockkeeper_chain::Error::Contract(message));
            }
            self.gated(lock, "disable_transfers", |l| {
                l.fee = U256::from(NON_TRANSFERABLE_FEE_BPS);
                B256::repeat_byte(0xf0)
            })
        }

        async fn verify_transferability_security(&self, lock: Address) -> lockkeeper_chain::Result<TransferSecurity> {
            self.read(lock, |l| TransferSecurity::from_fee(l.fee))
        }
    }

    fn reconciler(backend: Arc<FakeBackend>) -> (LockReconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = LockReconciler::new(backend, store.clone()).with_platform_managers(vec![PLATFORM]);
        (reconciler, store)
    }

    fn cohort() -> EntityRef {
        EntityRef::new(EntityKind::Cohort, "spring")
    }

    #[tokio::test]
    async fn test_deploy_grants_and_secures() {
        let backend = Arc::new(FakeBackend::default());
        let (reconciler, store) = reconciler(backend.clone());

        let config = LockConfig::grant_based("Spring cohort").with_max_keys(U256::from(100));
        let result = reconciler.deploy(&cohort(), &config, &[]).await.unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.lock_address, Some(NEW_LOCK));
        assert_eq!(result.transaction_hash, Some(B256::repeat_byte(0xd0)));
        assert_eq!(backend.writes(), vec!["deploy", "update_config", "disable_transfers"]);

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(state.is_fully_secured());
        assert_eq!(LockPhase::resume_from(&state), LockPhase::Secured);
    }

    #[tokio::test]
    async fn test_deploy_failure_records_reason_without_lock() {
        let backend = Arc::new(FakeBackend::default());
        backend.faults.lock().unwrap().deploy = Some("execution reverted: not owner".into());
        let (reconciler, store) = reconciler(backend);

        let result = reconciler
            .deploy(&cohort(), &LockConfig::grant_based("x"), &[])
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.lock_address, None);
        assert!(result.error.unwrap().contains("not owner"));

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(!state.lock_manager_granted);
        assert!(state.grant_failure_reason.as_deref().unwrap().contains("not owner"));
        assert!(!state.max_keys_secured);
    }

    #[tokio::test]
    async fn test_config_failure_keeps_grant_and_asks_for_manual_fix() {
        let backend = Arc::new(FakeBackend::default());
        backend.faults.lock().unwrap().update_config = Some("timeout".into());
        let (reconciler, store) = reconciler(backend);

        let config = LockConfig::grant_based("x").with_max_keys(U256::from(5));
        let result = reconciler.deploy(&cohort(), &config, &[]).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.lock_address, Some(NEW_LOCK));
        assert!(result.error.unwrap().contains("manually set maxNumberOfKeys to 0"));

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(state.lock_manager_granted);
        assert!(!state.max_keys_secured);
        assert!(state.max_keys_failure_reason.as_deref().unwrap().contains("timeout"));
        assert!(state.transferability_secured);
        assert!(state.violations().is_empty());
        assert_eq!(LockPhase::resume_from(&state), LockPhase::SecureFailed);
    }

    #[tokio::test]
    async fn test_retry_after_failure_clears_reason() {
        let backend = Arc::new(FakeBackend::default());
        backend.faults.lock().unwrap().disable_transfers = Some("nonce too low".into());
        let (reconciler, store) = reconciler(backend.clone());

        let first = reconciler
            .deploy(&cohort(), &LockConfig::grant_based("x"), &[])
            .await
            .unwrap();
        assert!(!first.success);
        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(!state.transferability_secured);

        backend.faults.lock().unwrap().disable_transfers = None;
        let retry = reconciler.secure(&cohort()).await.unwrap();
        assert!(retry.success);
        assert_eq!(retry.transaction_hash, Some(B256::repeat_byte(0xf0)));

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(state.transferability_secured);
        assert_eq!(state.transferability_failure_reason, None);
        // Secure-only run leaves the earlier grant in place
        assert!(state.lock_manager_granted);
    }

    #[tokio::test]
    async fn test_already_secure_lock_issues_no_writes() {
        let lock = Address::repeat_byte(0x42);
        let backend = Arc::new(FakeBackend::with_lock(lock, &[SIGNER, PLATFORM], 0, 10_000));
        let (reconciler, store) = reconciler(backend.clone());
        reconciler.attach(&cohort(), lock).await.unwrap();

        let result = reconciler.reconcile(&cohort()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.transaction_hash, None);
        assert!(backend.writes().is_empty());
        assert!(store.load(&cohort()).await.unwrap().unwrap().is_fully_secured());
    }

    #[tokio::test]
    async fn test_reconcile_adds_missing_platform_manager() {
        let lock = Address::repeat_byte(0x42);
        let backend = Arc::new(FakeBackend::with_lock(lock, &[SIGNER], 0, 10_000));
        let (reconciler, _store) = reconciler(backend.clone());
        reconciler.attach(&cohort(), lock).await.unwrap();

        let result = reconciler.grant(&cohort()).await.unwrap();
        assert!(result.success);
        assert_eq!(backend.writes(), vec!["add_manager"]);
    }

    #[tokio::test]
    async fn test_grant_failure_does_not_block_secure() {
        let lock = Address::repeat_byte(0x42);
        let backend = Arc::new(FakeBackend::with_lock(lock, &[SIGNER], 10, 0));
        backend.faults.lock().unwrap().add_manager = Some("execution reverted: paused".into());
        let (reconciler, store) = reconciler(backend.clone());
        reconciler.attach(&cohort(), lock).await.unwrap();

        let grant = reconciler.grant(&cohort()).await.unwrap();
        assert!(!grant.success);
        assert_eq!(reconciler.phase(&cohort()).await.unwrap(), LockPhase::GrantFailed);

        let secure = reconciler.secure(&cohort()).await.unwrap();
        assert!(secure.success, "{:?}", secure.error);
        assert_eq!(backend.writes(), vec!["update_config", "disable_transfers"]);

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(state.max_keys_secured && state.transferability_secured);
        assert!(!state.lock_manager_granted);
        assert!(state.grant_failure_reason.as_deref().unwrap().contains("paused"));
        assert!(state.violations().is_empty());
    }

    #[tokio::test]
    async fn test_signer_without_rights_fails_every_step_independently() {
        let lock = Address::repeat_byte(0x42);
        let backend = Arc::new(FakeBackend::with_lock(lock, &[PLATFORM], 10, 0));
        let (reconciler, store) = reconciler(backend.clone());
        reconciler.attach(&cohort(), lock).await.unwrap();

        let result = reconciler.reconcile(&cohort()).await.unwrap();
        assert!(!result.success);
        assert!(backend.writes().is_empty());

        let state = store.load(&cohort()).await.unwrap().unwrap();
        for reason in [
            state.grant_failure_reason,
            state.max_keys_failure_reason,
            state.transferability_failure_reason,
        ] {
            assert!(reason.unwrap().contains("must be lock manager"));
        }
    }

    #[tokio::test]
    async fn test_update_without_effect_is_a_failure() {
        let lock = Address::repeat_byte(0x42);
        let backend = Arc::new(FakeBackend::with_lock(lock, &[SIGNER, PLATFORM], 50, 10_000));
        backend.faults.lock().unwrap().ignore_config_update = true;
        let (reconciler, store) = reconciler(backend.clone());
        reconciler.attach(&cohort(), lock).await.unwrap();

        let result = reconciler.secure(&cohort()).await.unwrap();
        assert!(!result.success);
        assert_eq!(backend.writes(), vec!["update_config"]);

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(!state.max_keys_secured);
        assert!(state.max_keys_failure_reason.as_deref().unwrap().contains("maxNumberOfKeys is 50"));
        assert!(state.transferability_secured);
    }

    #[tokio::test]
    async fn test_verify_detects_drift_and_updates_state() {
        let backend = Arc::new(FakeBackend::default());
        let (reconciler, store) = reconciler(backend.clone());
        reconciler
            .deploy(&cohort(), &LockConfig::grant_based("x"), &[])
            .await
            .unwrap();
        assert!(reconciler.verify(&cohort()).await.unwrap().secure);

        // Someone reopens purchases out of band
        backend.locks.lock().unwrap().get_mut(&NEW_LOCK).unwrap().max_keys = U256::from(5);
        let writes_before = backend.writes().len();

        let report = reconciler.verify(&cohort()).await.unwrap();
        assert!(!report.secure);
        assert_eq!(report.pending, vec![Correction::ZeroMaxKeys { current: U256::from(5) }]);
        assert_eq!(backend.writes().len(), writes_before);

        let state = store.load(&cohort()).await.unwrap().unwrap();
        assert!(!state.max_keys_secured);
        assert!(state.lock_manager_granted);
        assert!(state.transferability_secured);
    }

    #[tokio::test]
    async fn test_actions_need_a_lock() {
        let (reconciler, _store) = reconciler(Arc::new(FakeBackend::default()));
        assert!(matches!(reconciler.secure(&cohort()).await, Err(Error::NoLock(_))));
        assert!(matches!(reconciler.verify(&cohort()).await, Err(Error::NoLock(_))));
    }

    #[tokio::test]
    async fn test_second_deploy_rejected() {
        let (reconciler, _store) = reconciler(Arc::new(FakeBackend::default()));
        reconciler
            .deploy(&cohort(), &LockConfig::grant_based("x"), &[])
            .await
            .unwrap();
        let err = reconciler
            .deploy(&cohort(), &LockConfig::grant_based("x"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyDeployed { lock, .. } if lock == NEW_LOCK));
        assert!(reconciler.attach(&cohort(), Address::repeat_byte(1)).await.is_err());
    }

    #[test]
    fn test_action_result_json() {
        let result = ActionResult {
            success: true,
            transaction_hash: None,
            lock_address: Some(NEW_LOCK),
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("lockAddress").is_some());
        assert!(json.get("transactionHash").is_none());
    }
}
