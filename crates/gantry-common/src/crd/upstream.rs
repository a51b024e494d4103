//! Load-balancing CRDs: GantryUpstream and GantryTarget

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef};

fn default_weight() -> u32 {
    100
}

/// Spec for a GantryUpstream
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryUpstream",
    plural = "gantryupstreams",
    shortname = "gup",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryUpstreamSpec {
    /// Control plane the upstream is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Upstream hostname, referenced by services
    pub name: String,

    /// Load-balancing algorithm (round-robin, consistent-hashing, least-connections)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    /// Number of slots in the balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,

    /// Host header to use when proxying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_header: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing upstream instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryTarget, nested under an upstream
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryTarget",
    plural = "gantrytargets",
    shortname = "gtgt",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryTargetSpec {
    /// Upstream the target belongs to
    pub upstream_ref: LocalRef,

    /// `host:port` of the target
    pub target: String,

    /// Balancer weight
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing target instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}
