//! Proxy CRDs: GantryService and GantryRoute

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef};

fn default_protocol() -> String {
    "http".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_true() -> bool {
    true
}

/// Spec for a GantryService (an upstream API proxied by the gateway)
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryService",
    plural = "gantryservices",
    shortname = "gsvc",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryServiceSpec {
    /// Control plane the service is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Upstream host
    pub host: String,

    /// Upstream port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream protocol
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Path prefix on the upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Retry count on upstream failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Connect timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u32>,

    /// Read timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u32>,

    /// Write timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u32>,

    /// Whether the service is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing service instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryRoute
///
/// A route either names a service (and inherits its control plane) or a
/// control plane directly.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryRoute",
    plural = "gantryroutes",
    shortname = "grt",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryRouteSpec {
    /// Control plane, when the route is not attached to a service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ControlPlaneRef>,

    /// Service the route forwards to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<LocalRef>,

    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Matched protocols
    #[serde(default)]
    pub protocols: Vec<String>,

    /// Matched HTTP methods
    #[serde(default)]
    pub methods: Vec<String>,

    /// Matched hosts
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Matched paths
    #[serde(default)]
    pub paths: Vec<String>,

    /// Matched headers
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,

    /// Strip the matched path prefix before proxying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,

    /// Forward the client's Host header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing route instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}
