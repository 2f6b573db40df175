//! Per-attempt outcomes and the deployment outcome fold

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GRANT_ERROR: &str = "Failed to grant lock manager role";
pub const DEFAULT_MAX_KEYS_ERROR: &str = "Failed to secure maxNumberOfKeys";
pub const DEFAULT_TRANSFER_ERROR: &str = "Failed to disable key transfers";
pub const DEFAULT_CONFIG_ERROR: &str = "Lock config update failed";

/// The three independently tracked sub-steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStep {
    Grant,
    MaxKeys,
    Transferability,
}

impl fmt::Display for SubStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grant => "grant",
            Self::MaxKeys => "max_keys",
            Self::Transferability => "transferability",
        })
    }
}

/// Result of one sub-step in one attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            failed: true,
            error: Some(error.into()),
        }
    }
}

/// Grant and config results of one deployment-and-securing attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub grant_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_error: Option<String>,
    pub config_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}

/// A [`GrantOutcome`] with transferability tracked separately. `None`
/// means the sub-step did not run in this attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferability: Option<StepOutcome>,
}

impl ReconcileOutcome {
    pub fn step(&self, step: SubStep) -> Option<&StepOutcome> {
        match step {
            SubStep::Grant => self.grant.as_ref(),
            SubStep::MaxKeys => self.max_keys.as_ref(),
            SubStep::Transferability => self.transferability.as_ref(),
        }
    }

    pub fn set(&mut self, step: SubStep, outcome: StepOutcome) {
        match step {
            SubStep::Grant => self.grant = Some(outcome),
            SubStep::MaxKeys => self.max_keys = Some(outcome),
            SubStep::Transferability => self.transferability = Some(outcome),
        }
    }

    pub fn any_failed(&self) -> bool {
        [&self.grant, &self.max_keys, &self.transferability]
            .into_iter()
            .flatten()
            .any(|step| step.failed)
    }

    pub fn as_grant_outcome(&self) -> GrantOutcome {
        let grant = self.grant.clone().unwrap_or_default();
        let config = self.max_keys.clone().unwrap_or_default();
        GrantOutcome {
            grant_failed: grant.failed,
            grant_error: grant.error,
            config_failed: config.failed,
            config_error: config.error,
        }
    }

    /// Operator-facing reason covering every failed sub-step
    pub fn failure_reason(&self) -> Option<String> {
        let mut reason = apply_deployment_outcome(&self.as_grant_outcome()).reason;
        if let Some(transfer) = self.transferability.as_ref().filter(|t| t.failed) {
            let message = format!(
                "Transferability update failed: {}",
                transfer.error.as_deref().unwrap_or(DEFAULT_TRANSFER_ERROR)
            );
            reason = Some(match reason {
                Some(existing) => format!("{existing}; {message}"),
                None => message,
            });
        }
        reason
    }
}

/// Single granted flag and reason derived from a [`GrantOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProjection {
    pub granted: bool,
    pub reason: Option<String>,
    pub last_grant_failed: bool,
    pub last_grant_error: Option<String>,
}

pub fn apply_deployment_outcome(outcome: &GrantOutcome) -> DeploymentProjection {
    let grant_error = || outcome.grant_error.as_deref().unwrap_or(DEFAULT_GRANT_ERROR);
    let config_error = || outcome.config_error.as_deref().unwrap_or(DEFAULT_CONFIG_ERROR);

    match (outcome.grant_failed, outcome.config_failed) {
        (true, true) => {
            let reason = format!("Grant failed: {}; Config update failed: {}", grant_error(), config_error());
            DeploymentProjection {
                granted: false,
                reason: Some(reason.clone()),
                last_grant_failed: true,
                last_grant_error: Some(reason),
            }
        }
        (true, false) => DeploymentProjection {
            granted: false,
            reason: Some(grant_error().to_string()),
            last_grant_failed: true,
            last_grant_error: Some(grant_error().to_string()),
        },
        // The grant stands; the operator zeroes supply by hand
        (false, true) => DeploymentProjection {
            granted: true,
            reason: Some(format!(
                "Lock config update failed: {}. Please manually set maxNumberOfKeys to 0 on the lock.",
                config_error()
            )),
            last_grant_failed: false,
            last_grant_error: None,
        },
        (false, false) => DeploymentProjection {
            granted: true,
            reason: None,
            last_grant_failed: false,
            last_grant_error: None,
        },
    }
}
