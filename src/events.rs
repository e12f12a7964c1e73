// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes Event recording for the CDI operator.
//!
//! Events are published on the `CDI` resource for every create, update and delete the
//! operator performs, and for user route updates and blocked uninstalls. Reasons are
//! defined in [`crate::status_reasons`].
//!
//! Events are fire-and-forget: a failed publish is logged and never fails a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event on `resource_ref`.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    #[must_use]
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// An event captured by [`RecordingEventPublisher`].
#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Publisher that keeps every event in memory so tests can assert on them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    /// All events published so far, oldest first.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Reasons of all events published so far.
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                warning: matches!(type_, EventType::Warning),
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status_reasons::{ACTION_CREATE, EVENT_CREATE_RESOURCE_SUCCESS};

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
        assert_send_sync::<KubeEventPublisher>();
    }

    #[tokio::test]
    async fn recording_publisher_keeps_order() {
        let publisher = RecordingEventPublisher::default();
        let obj_ref = ObjectReference::default();
        publisher
            .publish(&obj_ref, EventType::Normal, EVENT_CREATE_RESOURCE_SUCCESS, ACTION_CREATE, None)
            .await;
        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                "Other",
                ACTION_CREATE,
                Some("note".to_string()),
            )
            .await;

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, EVENT_CREATE_RESOURCE_SUCCESS);
        assert!(!events[0].warning);
        assert!(events[1].warning);
        assert_eq!(events[1].note.as_deref(), Some("note"));
    }
}
