//! Kubernetes Events for remote entity lifecycle changes
//!
//! Creates, adoptions, resolved conflicts, remote deletes and parent loss
//! show up in `kubectl describe`. Publishing never fails a pass: errors are
//! logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use tracing::warn;

/// Sink for Kubernetes Events about gantry objects
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `reason` (one of [`reasons`]) for `action` on `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as `controller_name`, one per controller
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
            warn!(reason, action, error = %e, "dropping Kubernetes event");
        }
    }
}

/// Discards every event
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

/// Event reasons (the REASON column)
pub mod reasons {
    // Remote entity lifecycle
    /// A new remote entity was created
    pub const REMOTE_CREATED: &str = "RemoteCreated";
    /// A pre-existing remote entity was adopted on request
    pub const REMOTE_ADOPTED: &str = "RemoteAdopted";
    /// A creation conflict was resolved onto the entity carrying our tag
    pub const CONFLICT_RESOLVED: &str = "ConflictResolved";
    /// The remote entity was deleted during cleanup
    pub const REMOTE_DELETED: &str = "RemoteDeleted";
    /// The control plane the entity was programmed against is gone
    pub const CONTROL_PLANE_LOST: &str = "ControlPlaneLost";
    /// The remote service rejected the declared spec
    pub const REMOTE_REJECTED: &str = "RemoteRejected";

    // Derived resources
    /// A derived plugin binding was created
    pub const BINDING_CREATED: &str = "PluginBindingCreated";
    /// A derived plugin binding was deleted
    pub const BINDING_DELETED: &str = "PluginBindingDeleted";
    /// A cross-namespace plugin annotation is not permitted by any grant
    pub const REFERENCE_NOT_PERMITTED: &str = "ReferenceNotPermitted";
}

/// Event actions
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating a remote entity
    pub const CREATE: &str = "Create";
    /// Adopting a remote entity
    pub const ADOPT: &str = "Adopt";
    /// Deleting a remote entity or derived object
    pub const DELETE: &str = "Delete";
}
