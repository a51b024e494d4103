//! Key material CRDs: GantryKey, GantryKeySet and GantryVault

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::plugin::preserve_unknown_fields;
use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef};

/// PEM-encoded key pair
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PemKeyPair {
    /// Public key
    pub public_key: String,
    /// Private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

/// Spec for a GantryKey
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryKey",
    plural = "gantrykeys",
    shortname = "gkey",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryKeySpec {
    /// Control plane the key is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Key id
    pub kid: String,

    /// Remote name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// JSON Web Key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<String>,

    /// PEM key pair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pem: Option<PemKeyPair>,

    /// Key set this key belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_set_ref: Option<LocalRef>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing key instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryKeySet
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryKeySet",
    plural = "gantrykeysets",
    shortname = "gks",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryKeySetSpec {
    /// Control plane the key set is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing key set instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryVault
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryVault",
    plural = "gantryvaults",
    shortname = "gvault",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryVaultSpec {
    /// Control plane the vault is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// Vault backend (env, aws, gcp, hcv, ...)
    pub backend: String,

    /// Prefix used in vault references
    pub prefix: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Backend configuration
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: serde_json::Value,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing vault instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}
