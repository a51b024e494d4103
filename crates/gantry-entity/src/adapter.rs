//! The per-kind contract the generic reconciler is written against
//!
//! Every remote-backed resource implements [`ManagedEntity`]: where its
//! status lives, which objects it depends on, and how its spec becomes a
//! remote payload. Everything else (ordering, conflicts, adoption, cleanup)
//! is shared.

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use gantry_common::crd::{
    condition_types, AdoptOptions, ControlPlaneRef, EntityStatus, GantryPluginSpec, NamespacedRef,
};
use gantry_remote::kind::{PARENT_CERTIFICATE, PARENT_CONSUMER, PARENT_UPSTREAM};
use gantry_remote::EntityKind;

/// Kind name of the control plane resource
pub const CONTROL_PLANE_KIND: &str = "GantryControlPlane";
/// Kind name of the auth configuration resource
pub const AUTH_CONFIGURATION_KIND: &str = "GantryAuthConfiguration";
/// Kind name of the plugin definition resource
pub const PLUGIN_KIND: &str = "GantryPlugin";

/// Remote-backed parent a resource can depend on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParentRole {
    /// GantryService
    Service,
    /// GantryRoute
    Route,
    /// GantryConsumer
    Consumer,
    /// GantryConsumerGroup
    ConsumerGroup,
    /// GantryUpstream
    Upstream,
    /// GantryCertificate
    Certificate,
    /// GantryKeySet
    KeySet,
}

impl ParentRole {
    /// Kubernetes kind of the parent resource
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service => "GantryService",
            Self::Route => "GantryRoute",
            Self::Consumer => "GantryConsumer",
            Self::ConsumerGroup => "GantryConsumerGroup",
            Self::Upstream => "GantryUpstream",
            Self::Certificate => "GantryCertificate",
            Self::KeySet => "GantryKeySet",
        }
    }

    /// Condition reporting whether this parent resolved
    pub fn condition_type(&self) -> &'static str {
        match self {
            Self::Service => condition_types::SERVICE_REF_VALID,
            Self::Route => condition_types::ROUTE_REF_VALID,
            Self::Consumer => condition_types::CONSUMER_REF_VALID,
            Self::ConsumerGroup => condition_types::CONSUMER_GROUP_REF_VALID,
            Self::Upstream => condition_types::UPSTREAM_REF_VALID,
            Self::Certificate => condition_types::CERTIFICATE_REF_VALID,
            Self::KeySet => condition_types::KEY_SET_REF_VALID,
        }
    }

    /// Remote scope key when a child is addressed under this parent
    pub fn scope_key(&self) -> Option<&'static str> {
        match self {
            Self::Upstream => Some(PARENT_UPSTREAM),
            Self::Certificate => Some(PARENT_CERTIFICATE),
            Self::Consumer => Some(PARENT_CONSUMER),
            _ => None,
        }
    }
}

/// Declared reference to a parent in the same namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    /// What the parent is
    pub role: ParentRole,
    /// Parent object name
    pub name: String,
    /// Whether the child takes its control plane from this parent
    pub inherits_control_plane: bool,
}

impl ParentRef {
    /// Parent that only contributes its remote id
    pub fn new(role: ParentRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            inherits_control_plane: false,
        }
    }

    /// Parent the child also takes its control plane from
    pub fn inheriting(role: ParentRole, name: impl Into<String>) -> Self {
        Self {
            inherits_control_plane: true,
            ..Self::new(role, name)
        }
    }
}

/// A parent that resolved to a programmed remote entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedParent {
    /// What the parent is
    pub role: ParentRole,
    /// Parent object name
    pub name: String,
    /// Parent remote id
    pub remote_id: String,
}

/// Everything resolution produced that a payload may need
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedParents {
    /// Control plane id, for control-plane scoped kinds
    pub control_plane_id: Option<String>,
    /// Organization id, when known
    pub org_id: Option<String>,
    /// Resolved parents in declaration order
    pub parents: Vec<ResolvedParent>,
    /// Plugin definition, for plugin bindings
    pub plugin: Option<GantryPluginSpec>,
}

impl ResolvedParents {
    /// Remote id of the first parent with `role`
    pub fn remote_id(&self, role: ParentRole) -> Option<&str> {
        self.parents
            .iter()
            .find(|p| p.role == role)
            .map(|p| p.remote_id.as_str())
    }

    /// Remote ids of every parent with `role`
    pub fn remote_ids(&self, role: ParentRole) -> Vec<&str> {
        self.parents
            .iter()
            .filter(|p| p.role == role)
            .map(|p| p.remote_id.as_str())
            .collect()
    }
}

/// `{"id": ...}` foreign key, or null when absent
pub fn id_ref(id: Option<&str>) -> Value {
    match id {
        Some(id) => serde_json::json!({ "id": id }),
        None => Value::Null,
    }
}

/// Drop null top-level fields so the remote applies its defaults
pub fn compact(mut payload: Value) -> Value {
    if let Some(map) = payload.as_object_mut() {
        map.retain(|_, v| !v.is_null());
    }
    payload
}

/// A declared resource the engine programs as one remote entity
pub trait ManagedEntity:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Remote kind this resource is programmed as
    const REMOTE_KIND: EntityKind;

    /// Kinds of parent this resource can reference, for watch wiring
    const PARENT_ROLES: &'static [ParentRole] = &[];

    /// Current status, if any
    fn entity_status(&self) -> Option<&EntityStatus>;

    /// Replace the status in memory
    fn set_entity_status(&mut self, status: EntityStatus);

    /// Adoption request from the spec
    fn adopt_options(&self) -> Option<&AdoptOptions>;

    /// Build the full remote payload from the spec and resolved parents
    fn build_payload(&self, parents: &ResolvedParents) -> gantry_common::Result<Value>;

    /// Explicit control plane reference
    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        None
    }

    /// Auth configuration, for organization-scoped kinds
    fn auth_ref(&self) -> Option<&NamespacedRef> {
        None
    }

    /// Parents this resource depends on
    fn parent_refs(&self) -> Vec<ParentRef> {
        Vec::new()
    }

    /// Plugin definition, for plugin bindings
    fn plugin_ref(&self) -> Option<&NamespacedRef> {
        None
    }

    /// Extra remote tags declared on the spec
    fn user_tags(&self) -> &[String] {
        &[]
    }

    /// Spec checks that need no lookups
    fn validate(&self) -> gantry_common::Result<()> {
        Ok(())
    }

    /// Remote id recorded on the status
    fn remote_id(&self) -> Option<&str> {
        self.entity_status().and_then(EntityStatus::remote_id)
    }

    /// Consumer groups the remote entity must belong to, by remote id.
    ///
    /// `None` means the kind has no group memberships. `Some` with an empty
    /// list removes every membership.
    fn group_memberships(&self, _parents: &ResolvedParents) -> Option<Vec<String>> {
        None
    }

    /// Conditions this resource reports once programmed
    fn required_conditions(&self) -> Vec<&'static str> {
        let mut conditions = vec![condition_types::PROGRAMMED, condition_types::RESOLVED_REFS];
        if Self::REMOTE_KIND.is_control_plane_scoped() {
            conditions.push(condition_types::CONTROL_PLANE_REF_VALID);
        } else {
            conditions.push(condition_types::AUTH_REF_VALID);
        }
        if self.plugin_ref().is_some() {
            conditions.push(condition_types::PLUGIN_REF_VALID);
        }
        for parent in self.parent_refs() {
            let condition = parent.role.condition_type();
            if !conditions.contains(&condition) {
                conditions.push(condition);
            }
        }
        if self.adopt_options().is_some() {
            conditions.push(condition_types::ADOPTED);
        }
        conditions
    }

    /// Whether this resource refers to the object `kind` `namespace/name`
    fn references(&self, kind: &str, namespace: &str, name: &str) -> bool {
        let own_namespace = self.namespace().unwrap_or_default();
        let matches =
            |r: &NamespacedRef| r.name == name && r.resolve_namespace(&own_namespace) == namespace;
        match kind {
            CONTROL_PLANE_KIND => self
                .control_plane_ref()
                .and_then(|r| r.namespaced_ref.as_ref())
                .is_some_and(matches),
            AUTH_CONFIGURATION_KIND => {
                self.auth_ref().is_some_and(matches)
                    || self
                        .control_plane_ref()
                        .and_then(|r| r.auth_ref.as_ref())
                        .is_some_and(matches)
            }
            PLUGIN_KIND => self.plugin_ref().is_some_and(matches),
            _ => {
                own_namespace == namespace
                    && self
                        .parent_refs()
                        .iter()
                        .any(|p| p.role.kind() == kind && p.name == name)
            }
        }
    }
}
