//! TLS CRDs: certificates, CA certificates, SNIs and data plane client certificates

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef};

/// Spec for a GantryCertificate
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryCertificate",
    plural = "gantrycertificates",
    shortname = "gcert",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryCertificateSpec {
    /// Control plane the certificate is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// PEM certificate chain
    pub cert: String,

    /// PEM private key
    pub key: String,

    /// Alternate PEM certificate (other key algorithm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_alt: Option<String>,

    /// Alternate PEM private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alt: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing certificate instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryCACertificate
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryCACertificate",
    plural = "gantrycacertificates",
    shortname = "gcacert",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryCACertificateSpec {
    /// Control plane the CA certificate is programmed in
    pub control_plane_ref: ControlPlaneRef,

    /// PEM CA certificate
    pub cert: String,

    /// SHA-256 digest of the certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_digest: Option<String>,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing CA certificate instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantrySni, nested under a certificate
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantrySni",
    plural = "gantrysnis",
    shortname = "gsni",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantrySniSpec {
    /// Certificate served for this name
    pub certificate_ref: LocalRef,

    /// Server name
    pub name: String,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing SNI instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryDataPlaneCertificate
///
/// The remote side keeps no tags for these, so creation conflicts cannot be
/// resolved automatically.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryDataPlaneCertificate",
    plural = "gantrydataplanecertificates",
    shortname = "gdpcert",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryDataPlaneCertificateSpec {
    /// Control plane trusting the certificate
    pub control_plane_ref: ControlPlaneRef,

    /// PEM client certificate
    pub cert: String,

    /// Adopt an existing certificate instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}
