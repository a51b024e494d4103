//! Supporting types shared by every gantry CRD
//!
//! Conditions, the remote entity reference stored in status, and the
//! reference types used to point at parents (control planes, auth
//! configurations, owning entities).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Condition types and reasons
// =============================================================================

/// Condition types written by the entity reconciler
pub mod condition_types {
    /// Entity is synchronized with the remote service
    pub const PROGRAMMED: &str = "Programmed";
    /// All references resolve
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    /// Control plane reference is valid
    pub const CONTROL_PLANE_REF_VALID: &str = "ControlPlaneRefValid";
    /// Auth configuration reference is valid
    pub const AUTH_REF_VALID: &str = "AuthRefValid";
    /// Adoption of a pre-existing remote entity succeeded
    pub const ADOPTED: &str = "Adopted";
    /// Owning service reference is valid
    pub const SERVICE_REF_VALID: &str = "ServiceRefValid";
    /// Route reference is valid
    pub const ROUTE_REF_VALID: &str = "RouteRefValid";
    /// Owning consumer reference is valid
    pub const CONSUMER_REF_VALID: &str = "ConsumerRefValid";
    /// Consumer group references are valid
    pub const CONSUMER_GROUP_REF_VALID: &str = "ConsumerGroupRefValid";
    /// Owning upstream reference is valid
    pub const UPSTREAM_REF_VALID: &str = "UpstreamRefValid";
    /// Owning certificate reference is valid
    pub const CERTIFICATE_REF_VALID: &str = "CertificateRefValid";
    /// Key set reference is valid
    pub const KEY_SET_REF_VALID: &str = "KeySetRefValid";
    /// Plugin definition reference is valid
    pub const PLUGIN_REF_VALID: &str = "PluginRefValid";
}

/// Stable condition reasons
pub mod reasons {
    /// Entity is programmed remotely
    pub const PROGRAMMED: &str = "Programmed";
    /// All references resolved
    pub const RESOLVED: &str = "Resolved";
    /// A parent object does not exist or has no remote id yet
    pub const MISSING_DEPENDENCY: &str = "MissingDependency";
    /// The referenced control plane does not exist
    pub const CONTROL_PLANE_MISSING: &str = "ControlPlaneMissing";
    /// The referenced control plane has no remote id yet
    pub const CONTROL_PLANE_NOT_PROGRAMMED: &str = "ControlPlaneNotProgrammed";
    /// The control plane the entity was programmed against went away
    pub const CONTROL_PLANE_LOST: &str = "ControlPlaneLost";
    /// The control plane is externally managed
    pub const CONTROL_PLANE_READ_ONLY: &str = "ControlPlaneReadOnly";
    /// A parent lives in a different control plane than the entity
    pub const CONTROL_PLANE_MISMATCH: &str = "ControlPlaneMismatch";
    /// The auth configuration does not exist or is unusable
    pub const AUTH_CONFIGURATION_MISSING: &str = "AuthConfigurationMissing";
    /// A cross-namespace reference is not permitted by any grant
    pub const REFERENCE_NOT_PERMITTED: &str = "ReferenceNotPermitted";
    /// The declared spec cannot be turned into a remote payload
    pub const INVALID_SPEC: &str = "InvalidSpec";
    /// The remote service rejected the request
    pub const REMOTE_REJECTED: &str = "RemoteRejected";
    /// The remote service failed transiently
    pub const REMOTE_TRANSIENT_ERROR: &str = "RemoteTransientError";
    /// A creation conflict could not be resolved via the uniqueness tag
    pub const CONFLICT_UNRESOLVED: &str = "ConflictUnresolved";
    /// More than one remote entity carries the uniqueness tag
    pub const AMBIGUOUS_UNIQUENESS_TAG: &str = "AmbiguousUniquenessTag";
    /// The adoption target does not exist remotely
    pub const ADOPTION_TARGET_NOT_FOUND: &str = "AdoptionTargetNotFound";
    /// Adoption succeeded
    pub const ADOPTED: &str = "Adopted";
}

// =============================================================================
// Conditions
// =============================================================================

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Map a boolean onto True/False
    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// `observed_generation` is the spec generation that produced the condition;
/// a condition whose generation lags the object's is stale.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Programmed, ResolvedRefs)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Generation of the spec this condition was computed from
    #[serde(default)]
    pub observed_generation: i64,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }

    /// Whether this condition is true
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Whether this condition was computed from the given generation
    pub fn is_current(&self, generation: i64) -> bool {
        self.observed_generation == generation
    }

    /// Equal in everything except the transition timestamp
    pub fn same_as(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or replace a condition by type
///
/// The transition timestamp is kept when the status did not change, so
/// repeated writes of the same outcome do not churn the object.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

// =============================================================================
// Remote entity reference
// =============================================================================

/// Identity of the remote entity a declared object is programmed as
///
/// Presence of this block on a status means a remote entity is believed to
/// exist. All fields serialize even when empty so a merge patch of the
/// status replaces stale values.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    /// Remote entity id
    pub id: String,
    /// Server URL of the remote API the entity lives in
    #[serde(default)]
    pub server_url: String,
    /// Organization id, when known
    #[serde(default)]
    pub org_id: Option<String>,
    /// Control plane id for control-plane scoped entities
    #[serde(default)]
    pub control_plane_id: Option<String>,
    /// Remote ids of nested parents (service, consumer, upstream, ...)
    #[serde(default)]
    pub parent_ids: std::collections::BTreeMap<String, String>,
    /// Auth configuration the entity was programmed with; used for cleanup
    #[serde(default)]
    pub auth_ref: Option<NamespacedRef>,
}

/// Shared status of every remote-backed gantry resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    /// Remote entity reference; null until the entity is programmed
    #[serde(default)]
    pub remote: Option<RemoteRef>,

    /// Status conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Generation last processed by the reconciler
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl EntityStatus {
    /// Remote id, when one is known
    pub fn remote_id(&self) -> Option<&str> {
        self.remote
            .as_ref()
            .map(|r| r.id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        find_condition(&self.conditions, type_)
    }

    /// Whether Programmed is True for the given generation
    pub fn is_programmed(&self, generation: i64) -> bool {
        self.condition(condition_types::PROGRAMMED)
            .map(|c| c.is_true() && c.is_current(generation))
            .unwrap_or(false)
    }
}

// =============================================================================
// References
// =============================================================================

/// Reference to an object in the same namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct LocalRef {
    /// Object name
    pub name: String,
}

/// Reference to an object, optionally in another namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedRef {
    /// Object name
    pub name: String,
    /// Namespace (defaults to the referencing object's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl NamespacedRef {
    /// Create a reference without an explicit namespace
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    /// Resolve namespace using a default
    pub fn resolve_namespace<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}

/// Discriminator of a [`ControlPlaneRef`]
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ControlPlaneRefType {
    /// Reference to a GantryControlPlane object
    #[default]
    NamespacedRef,
    /// Remote id of a control plane managed elsewhere
    RemoteId,
    /// Remote id of a control plane owned by an ingress controller (read-only)
    ExternallyManaged,
}

/// Control plane reference as declared on a resource
///
/// Serialized with a `type` discriminator and per-variant fields; use
/// [`ControlPlaneRef::target`] to get the checked form.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneRef {
    /// Which variant this reference is
    #[serde(rename = "type", default)]
    pub type_: ControlPlaneRefType,
    /// Set when type is NamespacedRef
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaced_ref: Option<NamespacedRef>,
    /// Set when type is RemoteId or ExternallyManaged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Auth configuration used with a remote id reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_ref: Option<NamespacedRef>,
}

/// Checked form of a [`ControlPlaneRef`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlPlaneTarget {
    /// A GantryControlPlane object
    NamespacedRef(NamespacedRef),
    /// A control plane known only by its remote id
    RemoteId {
        /// Remote control plane id
        id: String,
        /// Auth configuration to reach it
        auth_ref: NamespacedRef,
    },
    /// An externally managed control plane; mutations are not permitted
    ExternallyManaged {
        /// Remote control plane id
        id: String,
        /// Auth configuration to reach it
        auth_ref: Option<NamespacedRef>,
    },
}

impl ControlPlaneRef {
    /// Reference to a GantryControlPlane object
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            type_: ControlPlaneRefType::NamespacedRef,
            namespaced_ref: Some(NamespacedRef::local(name)),
            ..Default::default()
        }
    }

    /// Validate the per-variant fields and convert to a [`ControlPlaneTarget`]
    pub fn target(&self) -> crate::Result<ControlPlaneTarget> {
        match self.type_ {
            ControlPlaneRefType::NamespacedRef => self
                .namespaced_ref
                .clone()
                .map(ControlPlaneTarget::NamespacedRef)
                .ok_or_else(|| {
                    crate::Error::validation("controlPlaneRef type NamespacedRef requires namespacedRef")
                }),
            ControlPlaneRefType::RemoteId => {
                let id = self.non_empty_id()?;
                let auth_ref = self.auth_ref.clone().ok_or_else(|| {
                    crate::Error::validation("controlPlaneRef type RemoteId requires authRef")
                })?;
                Ok(ControlPlaneTarget::RemoteId { id, auth_ref })
            }
            ControlPlaneRefType::ExternallyManaged => Ok(ControlPlaneTarget::ExternallyManaged {
                id: self.non_empty_id()?,
                auth_ref: self.auth_ref.clone(),
            }),
        }
    }

    fn non_empty_id(&self) -> crate::Result<String> {
        self.remote_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| crate::Error::validation("controlPlaneRef requires a non-empty remoteId"))
    }
}

/// Adoption mode
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AdoptMode {
    /// Take ownership and overwrite remote fields with the declared spec
    #[default]
    Override,
}

/// Request to take ownership of a pre-existing remote entity
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdoptOptions {
    /// Adoption mode
    #[serde(default)]
    pub mode: AdoptMode,
    /// Remote id of the entity to adopt
    pub id: String,
}
