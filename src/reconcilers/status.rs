// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for the `CDI` resource.
//!
//! The `CDI` resource reports three conditions, `Available`, `Progressing` and
//! `Degraded`, next to a phase and three versions. Reconcilers never patch status
//! piecemeal: they collect every change in a [`CdiStatusUpdater`] and apply it
//! once, and only when something semantically changed.
//!
//! # Condition Format
//!
//! - `type`: The aspect of the resource being reported (e.g., "Available")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the status last flipped
//! - `lastHeartbeatTime`: RFC3339 timestamp of the last write of the condition
//!
//! # Example
//!
//! ```rust,no_run
//! use cdi_operator::reconcilers::status::create_condition;
//!
//! let condition = create_condition(
//!     "Available",
//!     "True",
//!     "DeployCompleted",
//!     "Deployment Completed"
//! );
//! ```

use crate::cluster::ClusterApi;
use crate::crd::{CDIStatus, Condition, Phase, CDI};
use crate::errors::Result;
use crate::metrics;
use crate::status_reasons::{
    CONDITION_TYPE_AVAILABLE, CONDITION_TYPE_DEGRADED, CONDITION_TYPE_PROGRESSING,
};
use chrono::Utc;
use kube::ResourceExt;
use tracing::debug;

const TRUE: &str = "True";
const FALSE: &str = "False";

/// Create a new Kubernetes condition with the current timestamp.
///
/// Both `lastTransitionTime` and `lastHeartbeatTime` are set to now.
///
/// # Example
///
/// ```rust,no_run
/// # use cdi_operator::reconcilers::status::create_condition;
/// let condition = create_condition("Degraded", "True", "UnwantedCR", "Reconciling to error state");
/// assert_eq!(condition.r#type, "Degraded");
/// assert_eq!(condition.status, "True");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    let now = Utc::now().to_rfc3339();
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(now.clone()),
        last_heartbeat_time: Some(now),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// `lastTransitionTime` is preserved when the status does not flip. The heartbeat
/// only moves when the condition actually changed, otherwise every reconcile would
/// produce a status write.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) else {
        conditions.push(create_condition(condition_type, status, reason, message));
        return;
    };

    let unchanged = existing.status == status
        && existing.reason.as_deref() == Some(reason)
        && existing.message.as_deref() == Some(message);
    if unchanged {
        return;
    }

    let now = Utc::now().to_rfc3339();
    if existing.status != status || existing.last_transition_time.is_none() {
        existing.last_transition_time = Some(now.clone());
    }
    existing.status = status.to_string();
    existing.reason = Some(reason.to_string());
    existing.message = Some(message.to_string());
    existing.last_heartbeat_time = Some(now);
}

/// Compare two condition lists semantically.
///
/// Timestamps are ignored; type, status, reason and message are compared.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        find_condition(current, &new_cond.r#type).is_some_and(|cur| {
            cur.status == new_cond.status
                && cur.reason == new_cond.reason
                && cur.message == new_cond.message
        })
    })
}

/// Collects status changes for one `CDI` resource and writes them once.
///
/// The `mark_*` methods set the three conditions together, the way each step of
/// the install lifecycle reports itself:
///
/// | method | Available | Progressing | Degraded |
/// |---|---|---|---|
/// | [`mark_deploying`](Self::mark_deploying) | False | True | False |
/// | [`mark_healthy`](Self::mark_healthy) | True | False | False |
/// | [`mark_upgrading`](Self::mark_upgrading) | True | True | True |
/// | [`mark_failed`](Self::mark_failed) | False | False | True |
///
/// Reason and message go on the conditions that are `True`, plus `Available`
/// when deploying.
pub struct CdiStatusUpdater {
    name: String,
    current_status: Option<CDIStatus>,
    new_status: CDIStatus,
}

impl CdiStatusUpdater {
    /// Start from the status currently stored on `cdi`.
    #[must_use]
    pub fn new(cdi: &CDI) -> Self {
        let current_status = cdi.status.clone();
        let new_status = current_status.clone().unwrap_or_default();
        Self {
            name: cdi.name_any(),
            current_status,
            new_status,
        }
    }

    /// Update or add a condition (in-memory only, no API call).
    pub fn set_condition(&mut self, condition_type: &str, status: &str, reason: &str, message: &str) {
        update_condition_in_memory(
            &mut self.new_status.conditions,
            condition_type,
            status,
            reason,
            message,
        );
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.new_status.phase = Some(phase);
    }

    pub fn set_operator_version(&mut self, version: &str) {
        self.new_status.operator_version = Some(version.to_string());
    }

    pub fn set_target_version(&mut self, version: &str) {
        self.new_status.target_version = Some(version.to_string());
    }

    pub fn set_observed_version(&mut self, version: &str) {
        self.new_status.observed_version = Some(version.to_string());
    }

    /// Installation is in progress.
    pub fn mark_deploying(&mut self, reason: &str, message: &str) {
        self.set_condition(CONDITION_TYPE_AVAILABLE, FALSE, reason, message);
        self.set_condition(CONDITION_TYPE_PROGRESSING, TRUE, reason, message);
        self.set_condition(CONDITION_TYPE_DEGRADED, FALSE, "", "");
    }

    /// Every component is ready.
    pub fn mark_healthy(&mut self, reason: &str, message: &str) {
        self.set_condition(CONDITION_TYPE_AVAILABLE, TRUE, reason, message);
        self.set_condition(CONDITION_TYPE_PROGRESSING, FALSE, "", "");
        self.set_condition(CONDITION_TYPE_DEGRADED, FALSE, "", "");
    }

    /// An upgrade started; the previous version keeps serving meanwhile.
    ///
    /// `Degraded` is intentionally `True` with the same reason for the whole
    /// upgrade, as KubeVirt operators report it; only `mark_healthy` clears it.
    pub fn mark_upgrading(&mut self, reason: &str, message: &str) {
        self.set_condition(CONDITION_TYPE_AVAILABLE, TRUE, "", "");
        self.set_condition(CONDITION_TYPE_PROGRESSING, TRUE, reason, message);
        self.set_condition(CONDITION_TYPE_DEGRADED, TRUE, reason, message);
    }

    /// The installation cannot proceed until someone intervenes.
    pub fn mark_failed(&mut self, reason: &str, message: &str) {
        self.set_condition(CONDITION_TYPE_AVAILABLE, FALSE, reason, message);
        self.set_condition(CONDITION_TYPE_PROGRESSING, FALSE, "", "");
        self.set_condition(CONDITION_TYPE_DEGRADED, TRUE, reason, message);
    }

    /// Set only `Degraded`, leaving the other conditions alone.
    pub fn set_degraded(&mut self, degraded: bool, reason: &str, message: &str) {
        let status = if degraded { TRUE } else { FALSE };
        self.set_condition(CONDITION_TYPE_DEGRADED, status, reason, message);
    }

    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.new_status.phase
    }

    #[must_use]
    pub fn observed_version(&self) -> &str {
        self.new_status.observed_version.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn target_version(&self) -> &str {
        self.new_status.target_version.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn operator_version(&self) -> &str {
        self.new_status.operator_version.as_deref().unwrap_or_default()
    }

    /// An upgrade is in flight: the installation was deployed once and has not
    /// yet reached the version it targets.
    #[must_use]
    pub fn is_upgrading(&self) -> bool {
        let observed = self.observed_version();
        !observed.is_empty() && observed != self.target_version()
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.new_status.conditions
    }

    /// The status as it will be written.
    #[must_use]
    pub fn status(&self) -> &CDIStatus {
        &self.new_status
    }

    /// Whether applying would change anything on the server.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current_status {
            None => true,
            Some(current) => {
                current.phase != self.new_status.phase
                    || current.operator_version != self.new_status.operator_version
                    || current.target_version != self.new_status.target_version
                    || current.observed_version != self.new_status.observed_version
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
            }
        }
    }

    /// Write the collected status if it changed.
    ///
    /// After a successful write the updater treats the written status as current,
    /// so it can keep collecting changes for a later apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes API call fails.
    pub async fn apply(&mut self, cluster: &dyn ClusterApi) -> Result<bool> {
        if !self.has_changes() {
            debug!(cdi = %self.name, "CDI status unchanged, skipping update");
            return Ok(false);
        }

        cluster
            .patch_instance_status(&self.name, &self.new_status)
            .await?;
        if let Some(phase) = self.new_status.phase {
            metrics::record_phase(&phase.to_string());
        }
        debug!(
            cdi = %self.name,
            phase = ?self.new_status.phase,
            conditions = self.new_status.conditions.len(),
            "Updated CDI status"
        );
        self.current_status = Some(self.new_status.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
