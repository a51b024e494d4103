//! Cross-namespace reference grants
//!
//! `ReferenceGrant` is the user-authored Gateway API resource (consumed,
//! never written). `GantryReferenceGrant` is the narrow grant derived from
//! it that the engine checks before following a cross-namespace reference.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Spec for a Gateway API ReferenceGrant
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "ReferenceGrant",
    plural = "referencegrants",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantSpec {
    /// Namespaces and kinds allowed to refer to objects in this namespace
    pub from: Vec<ReferenceGrantFrom>,
    /// Objects in this namespace that may be referred to
    pub to: Vec<ReferenceGrantTo>,
}

/// A permitted referrer
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ReferenceGrantFrom {
    /// API group of the referrer
    pub group: String,
    /// Kind of the referrer
    pub kind: String,
    /// Namespace of the referrer
    pub namespace: String,
}

/// A permitted referent
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ReferenceGrantTo {
    /// API group of the referent
    pub group: String,
    /// Kind of the referent
    pub kind: String,
    /// Name of the referent; all objects of the kind when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Spec for a GantryReferenceGrant
///
/// Lives in the referent's namespace and permits exactly one
/// `{kind, namespace} -> {kind, name?}` edge.
#[derive(
    CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord,
)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryReferenceGrant",
    plural = "gantryreferencegrants",
    shortname = "grg",
    namespaced,
    printcolumn = r#"{"name":"From","type":"string","jsonPath":".spec.from.kind"}"#,
    printcolumn = r#"{"name":"FromNamespace","type":"string","jsonPath":".spec.from.namespace"}"#,
    printcolumn = r#"{"name":"To","type":"string","jsonPath":".spec.to.kind"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryReferenceGrantSpec {
    /// Permitted referrer
    pub from: GrantFrom,
    /// Permitted referent
    pub to: GrantTo,
}

/// Referrer of a derived grant
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantFrom {
    /// Kind of the referrer
    pub kind: String,
    /// Namespace of the referrer
    pub namespace: String,
}

/// Referent of a derived grant
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantTo {
    /// Kind of the referent
    pub kind: String,
    /// Name of the referent; all objects of the kind when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GantryReferenceGrantSpec {
    /// Whether this grant permits the given edge
    pub fn permits(&self, from_kind: &str, from_namespace: &str, to_kind: &str, to_name: &str) -> bool {
        self.from.kind == from_kind
            && self.from.namespace == from_namespace
            && self.to.kind == to_kind
            && self.to.name.as_deref().map_or(true, |n| n == to_name)
    }
}
