//! Persisted security state per grant-based entity

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outcome::{ReconcileOutcome, SubStep};
use crate::projection::{
    effective_grant_for_save, effective_max_keys_for_save, effective_transferability_for_save,
};
use crate::Error;

/// Entities that own a grant-based lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BootcampProgram,
    Cohort,
    Milestone,
    Quest,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootcampProgram => "bootcamp_program",
            Self::Cohort => "cohort",
            Self::Milestone => "milestone",
            Self::Quest => "quest",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bootcamp_program" | "bootcamp" | "program" => Ok(Self::BootcampProgram),
            "cohort" => Ok(Self::Cohort),
            "milestone" => Ok(Self::Milestone),
            "quest" => Ok(Self::Quest),
            other => Err(Error::InvalidEntity(format!("unknown entity kind {other:?}"))),
        }
    }
}

/// `kind:id`, e.g. `cohort:spring-2025`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for EntityRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidEntity(format!("expected kind:id, got {s:?}")))?;
        if id.is_empty() {
            return Err(Error::InvalidEntity(format!("empty id in {s:?}")));
        }
        Ok(Self::new(kind.parse()?, id))
    }
}

/// Durable security flags for one entity.
///
/// Only [`PersistedSecurityState::fold`] produces new values; a flag set to
/// `true` never carries a failure reason for the same sub-step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSecurityState {
    #[serde(default)]
    pub lock_address: Option<Address>,
    #[serde(default)]
    pub lock_manager_granted: bool,
    #[serde(default)]
    pub grant_failure_reason: Option<String>,
    #[serde(default)]
    pub max_keys_secured: bool,
    #[serde(default)]
    pub max_keys_failure_reason: Option<String>,
    #[serde(default)]
    pub transferability_secured: bool,
    #[serde(default)]
    pub transferability_failure_reason: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedSecurityState {
    /// Fold a fresh outcome into this state through the projection
    pub fn fold(&self, lock_address: Option<Address>, outcome: &ReconcileOutcome) -> Self {
        let grant = effective_grant_for_save(
            outcome.grant.as_ref(),
            lock_address,
            self.lock_manager_granted,
            self.grant_failure_reason.as_deref(),
        );
        let max_keys = effective_max_keys_for_save(
            outcome.max_keys.as_ref(),
            lock_address,
            self.max_keys_secured,
            self.max_keys_failure_reason.as_deref(),
        );
        let transferability = effective_transferability_for_save(
            outcome.transferability.as_ref(),
            lock_address,
            self.transferability_secured,
            self.transferability_failure_reason.as_deref(),
        );

        Self {
            lock_address,
            lock_manager_granted: grant.value,
            grant_failure_reason: grant.reason,
            max_keys_secured: max_keys.value,
            max_keys_failure_reason: max_keys.reason,
            transferability_secured: transferability.value,
            transferability_failure_reason: transferability.reason,
            updated_at: Some(Utc::now()),
        }
    }

    /// Sub-steps whose flag contradicts the rest of the record
    pub fn violations(&self) -> Vec<SubStep> {
        let no_lock = self.lock_address.is_none();
        [
            (SubStep::Grant, self.lock_manager_granted, &self.grant_failure_reason),
            (SubStep::MaxKeys, self.max_keys_secured, &self.max_keys_failure_reason),
            (
                SubStep::Transferability,
                self.transferability_secured,
                &self.transferability_failure_reason,
            ),
        ]
        .into_iter()
        .filter(|(_, flag, reason)| *flag && (reason.is_some() || no_lock))
        .map(|(step, _, _)| step)
        .collect()
    }

    pub fn is_fully_secured(&self) -> bool {
        self.lock_address.is_some()
            && self.lock_manager_granted
            && self.max_keys_secured
            && self.transferability_secured
            && self.violations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::StepOutcome;

    #[test]
    fn test_entity_ref_roundtrip() {
        let entity: EntityRef = "cohort:spring-2025".parse().unwrap();
        assert_eq!(entity.kind, EntityKind::Cohort);
        assert_eq!(entity.id, "spring-2025");
        assert_eq!(entity.to_string(), "cohort:spring-2025");

        assert!("cohort".parse::<EntityRef>().is_err());
        assert!("cohort:".parse::<EntityRef>().is_err());
        assert!("course:1".parse::<EntityRef>().is_err());
    }

    #[test]
    fn test_fold_outcome_wins() {
        let lock = Some(Address::repeat_byte(1));
        let stale = PersistedSecurityState {
            lock_address: lock,
            lock_manager_granted: false,
            grant_failure_reason: Some("old failure".into()),
            ..Default::default()
        };
        let outcome = ReconcileOutcome {
            grant: Some(StepOutcome::ok()),
            max_keys: Some(StepOutcome::failed("timeout")),
            transferability: None,
        };

        let next = stale.fold(lock, &outcome);
        assert!(next.lock_manager_granted);
        assert_eq!(next.grant_failure_reason, None);
        assert!(!next.max_keys_secured);
        assert!(next.max_keys_failure_reason.as_deref().unwrap().contains("timeout"));
        assert!(next.violations().is_empty());
        assert!(next.updated_at.is_some());
    }

    #[test]
    fn test_violations() {
        let state = PersistedSecurityState {
            lock_address: Some(Address::repeat_byte(1)),
            lock_manager_granted: true,
            grant_failure_reason: Some("reverted".into()),
            max_keys_secured: true,
            transferability_secured: false,
            transferability_failure_reason: Some("timeout".into()),
            ..Default::default()
        };
        assert_eq!(state.violations(), vec![SubStep::Grant]);
        assert!(!state.is_fully_secured());

        let orphan = PersistedSecurityState {
            max_keys_secured: true,
            ..Default::default()
        };
        assert_eq!(orphan.violations(), vec![SubStep::MaxKeys]);
    }

    #[test]
    fn test_persisted_json_field_names() {
        let json = serde_json::json!({
            "lock_address": "0x0101010101010101010101010101010101010101",
            "lock_manager_granted": true,
            "max_keys_secured": true,
            "transferability_secured": true
        });
        let state: PersistedSecurityState = serde_json::from_value(json).unwrap();
        assert!(state.is_fully_secured());
    }
}
