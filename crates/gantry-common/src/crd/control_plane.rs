//! Organization-scoped CRDs: GantryControlPlane and GantryCloudNetwork

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, EntityStatus, NamespacedRef};

/// Kind of control plane
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ClusterType {
    /// Self-managed hybrid control plane
    #[default]
    ControlPlane,
    /// Control plane populated by an ingress controller; read-only for gantry
    KubernetesIngressController,
    /// Control plane for cloud gateways
    CloudGateway,
    /// Serverless control plane
    Serverless,
}

impl ClusterType {
    /// Value used by the remote API
    pub fn as_remote_str(&self) -> &'static str {
        match self {
            Self::ControlPlane => "CLUSTER_TYPE_CONTROL_PLANE",
            Self::KubernetesIngressController => "CLUSTER_TYPE_K8S_INGRESS_CONTROLLER",
            Self::CloudGateway => "CLUSTER_TYPE_CLOUD_GATEWAY",
            Self::Serverless => "CLUSTER_TYPE_SERVERLESS",
        }
    }

    /// Whether entities under this control plane are managed by someone else
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::KubernetesIngressController)
    }
}

/// Spec for a GantryControlPlane
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryControlPlane",
    plural = "gantrycontrolplanes",
    shortname = "gcpl",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryControlPlaneSpec {
    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Control plane kind
    #[serde(default)]
    pub cluster_type: ClusterType,

    /// Auth configuration used to reach the remote API
    pub auth_ref: NamespacedRef,

    /// Remote labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Adopt an existing control plane instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

/// Spec for a GantryCloudNetwork
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryCloudNetwork",
    plural = "gantrycloudnetworks",
    shortname = "gnet",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryCloudNetworkSpec {
    /// Remote name (defaults to the object name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Cloud provider account the network lives in
    pub cloud_gateway_provider_account_id: String,

    /// Provider region
    pub region: String,

    /// Availability zones
    #[serde(default)]
    pub availability_zones: Vec<String>,

    /// Network CIDR block
    pub cidr_block: String,

    /// Auth configuration used to reach the remote API
    pub auth_ref: NamespacedRef,

    /// Remote labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Adopt an existing network instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ingress_controller_planes_are_read_only() {
        assert!(ClusterType::KubernetesIngressController.is_read_only());
        assert!(!ClusterType::ControlPlane.is_read_only());
        assert!(!ClusterType::CloudGateway.is_read_only());
    }

    #[test]
    fn cluster_type_defaults_to_control_plane() {
        let spec: GantryControlPlaneSpec = serde_json::from_value(serde_json::json!({
            "authRef": {"name": "auth"}
        }))
        .unwrap();
        assert_eq!(spec.cluster_type, ClusterType::ControlPlane);
        assert_eq!(spec.cluster_type.as_remote_str(), "CLUSTER_TYPE_CONTROL_PLANE");
    }
}
