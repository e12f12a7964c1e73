// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::cluster::fake::FakeClusterApi;
    use crate::crd::CDISpec;
    use crate::status_reasons::{
        MESSAGE_DEPLOY_COMPLETED, MESSAGE_DEPLOY_STARTED, REASON_DEPLOY_COMPLETED,
        REASON_DEPLOY_STARTED, REASON_UNWANTED_CR, REASON_UPGRADE_STARTED,
    };

    fn status_of<'a>(conditions: &'a [Condition], t: &str) -> &'a str {
        find_condition(conditions, t).map_or("", |c| c.status.as_str())
    }

    #[test]
    fn test_create_condition() {
        let condition = create_condition("Available", "True", "DeployCompleted", "done");
        assert_eq!(condition.r#type, "Available");
        assert_eq!(condition.status, "True");
        assert_eq!(condition.reason.as_deref(), Some("DeployCompleted"));
        assert_eq!(condition.message.as_deref(), Some("done"));
        assert!(condition.last_transition_time.is_some());
        assert_eq!(condition.last_transition_time, condition.last_heartbeat_time);
    }

    #[test]
    fn test_update_condition_preserves_transition_time() {
        let mut conditions = vec![Condition {
            r#type: "Degraded".to_string(),
            status: "False".to_string(),
            reason: Some("A".to_string()),
            message: Some("a".to_string()),
            last_transition_time: Some("2024-01-01T00:00:00+00:00".to_string()),
            last_heartbeat_time: Some("2024-01-01T00:00:00+00:00".to_string()),
        }];

        // Same status, new message: transition time stays, heartbeat moves.
        update_condition_in_memory(&mut conditions, "Degraded", "False", "B", "b");
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert_ne!(
            conditions[0].last_heartbeat_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );

        update_condition_in_memory(&mut conditions, "Degraded", "True", "B", "b");
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00+00:00")
        );
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_update_condition_noop_keeps_heartbeat() {
        let mut conditions = vec![create_condition("Available", "True", "R", "m")];
        let before = conditions.clone();
        update_condition_in_memory(&mut conditions, "Available", "True", "R", "m");
        assert_eq!(conditions, before);
    }

    #[test]
    fn test_conditions_equal_ignores_timestamps() {
        let a = vec![create_condition("Available", "True", "R", "m")];
        let mut b = a.clone();
        b[0].last_transition_time = Some("earlier".to_string());
        assert!(conditions_equal(&a, &b));

        b[0].reason = Some("Other".to_string());
        assert!(!conditions_equal(&a, &b));
        assert!(!conditions_equal(&a, &[]));
    }

    #[test]
    fn test_mark_helpers_set_all_three_conditions() {
        let cdi = CDI::new("cdi", CDISpec::default());
        let mut updater = CdiStatusUpdater::new(&cdi);

        updater.mark_deploying(REASON_DEPLOY_STARTED, MESSAGE_DEPLOY_STARTED);
        let c = updater.conditions();
        assert_eq!(status_of(c, CONDITION_TYPE_AVAILABLE), "False");
        assert_eq!(status_of(c, CONDITION_TYPE_PROGRESSING), "True");
        assert_eq!(status_of(c, CONDITION_TYPE_DEGRADED), "False");
        assert_eq!(
            find_condition(c, CONDITION_TYPE_PROGRESSING)
                .and_then(|c| c.message.as_deref()),
            Some(MESSAGE_DEPLOY_STARTED)
        );

        updater.mark_healthy(REASON_DEPLOY_COMPLETED, MESSAGE_DEPLOY_COMPLETED);
        let c = updater.conditions();
        assert_eq!(status_of(c, CONDITION_TYPE_AVAILABLE), "True");
        assert_eq!(status_of(c, CONDITION_TYPE_PROGRESSING), "False");
        assert_eq!(status_of(c, CONDITION_TYPE_DEGRADED), "False");

        updater.mark_failed(REASON_UNWANTED_CR, "no");
        let c = updater.conditions();
        assert_eq!(status_of(c, CONDITION_TYPE_AVAILABLE), "False");
        assert_eq!(status_of(c, CONDITION_TYPE_DEGRADED), "True");
        assert_eq!(
            find_condition(c, CONDITION_TYPE_DEGRADED).and_then(|c| c.reason.as_deref()),
            Some(REASON_UNWANTED_CR)
        );
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_mark_upgrading_reports_degraded_until_healthy() {
        let cdi = CDI::new("cdi", CDISpec::default());
        let mut updater = CdiStatusUpdater::new(&cdi);

        updater.mark_upgrading(REASON_UPGRADE_STARTED, "Started upgrade to version v1.5.0");
        let c = updater.conditions();
        assert_eq!(status_of(c, CONDITION_TYPE_AVAILABLE), "True");
        assert_eq!(status_of(c, CONDITION_TYPE_PROGRESSING), "True");
        assert_eq!(status_of(c, CONDITION_TYPE_DEGRADED), "True");
        assert_eq!(
            find_condition(c, CONDITION_TYPE_DEGRADED).and_then(|c| c.reason.as_deref()),
            Some(REASON_UPGRADE_STARTED)
        );

        updater.mark_healthy(REASON_DEPLOY_COMPLETED, MESSAGE_DEPLOY_COMPLETED);
        assert_eq!(status_of(updater.conditions(), CONDITION_TYPE_DEGRADED), "False");
    }

    #[test]
    fn test_is_upgrading() {
        let cdi = CDI::new("cdi", CDISpec::default());
        let mut updater = CdiStatusUpdater::new(&cdi);
        updater.set_target_version("v1.5.0");
        assert!(!updater.is_upgrading(), "fresh install is not an upgrade");

        updater.set_observed_version("v1.4.0");
        assert!(updater.is_upgrading());

        updater.set_observed_version("v1.5.0");
        assert!(!updater.is_upgrading());
    }

    #[tokio::test]
    async fn test_apply_writes_only_on_change() {
        let cluster = FakeClusterApi::new();
        cluster.add_instance(CDI::new("cdi", CDISpec::default()));
        let cdi = cluster.instance("cdi").unwrap();

        let mut updater = CdiStatusUpdater::new(&cdi);
        updater.set_phase(Phase::Deploying);
        updater.mark_deploying(REASON_DEPLOY_STARTED, MESSAGE_DEPLOY_STARTED);
        assert!(updater.apply(&cluster).await.unwrap());
        assert_eq!(cluster.instance_writes(), 1);

        // Re-applying the same content is free.
        updater.mark_deploying(REASON_DEPLOY_STARTED, MESSAGE_DEPLOY_STARTED);
        assert!(!updater.apply(&cluster).await.unwrap());

        // A fresh updater over the stored resource sees no change either.
        let stored = cluster.instance("cdi").unwrap();
        let mut updater = CdiStatusUpdater::new(&stored);
        updater.mark_deploying(REASON_DEPLOY_STARTED, MESSAGE_DEPLOY_STARTED);
        assert!(!updater.has_changes());

        updater.set_phase(Phase::Deployed);
        assert!(updater.apply(&cluster).await.unwrap());
        assert_eq!(cluster.phases(), vec![Phase::Deploying, Phase::Deployed]);
    }
}
