//! Consumer CRDs: consumers, consumer groups and their credentials

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef};

/// Spec for a GantryConsumer
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryConsumer",
    plural = "gantryconsumers",
    shortname = "gcon",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryConsumerSpec {
    /// Control plane the consumer is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Remote username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Remote custom id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,

    /// Names of GantryConsumerGroups in the same namespace this consumer belongs to
    #[serde(default)]
    pub consumer_groups: Vec<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing consumer instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryConsumerGroup
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryConsumerGroup",
    plural = "gantryconsumergroups",
    shortname = "gcg",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryConsumerGroupSpec {
    /// Control plane the group is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing group instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryCredentialBasicAuth, nested under a consumer
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryCredentialBasicAuth",
    plural = "gantrycredentialbasicauths",
    shortname = "gbasic",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryCredentialBasicAuthSpec {
    /// Consumer owning the credential
    pub consumer_ref: LocalRef,

    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing credential instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryCredentialApiKey, nested under a consumer
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryCredentialApiKey",
    plural = "gantrycredentialapikeys",
    shortname = "gapikey",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryCredentialApiKeySpec {
    /// Consumer owning the credential
    pub consumer_ref: LocalRef,

    /// Key value; generated remotely when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing credential instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}
