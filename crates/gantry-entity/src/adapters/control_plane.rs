//! Organization-scoped kinds: control planes and cloud gateway networks

use serde_json::{json, Value};

use gantry_common::crd::{GantryCloudNetwork, GantryControlPlane, NamespacedRef};
use gantry_remote::EntityKind;

use super::remote_name;
use crate::adapter::{compact, ManagedEntity, ResolvedParents};

impl ManagedEntity for GantryControlPlane {
    const REMOTE_KIND: EntityKind = EntityKind::ControlPlane;

    impl_entity_basics!();

    fn auth_ref(&self) -> Option<&NamespacedRef> {
        Some(&self.spec.auth_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "name": remote_name(self.spec.name.as_ref(), self),
            "description": self.spec.description,
            "cluster_type": self.spec.cluster_type.as_remote_str(),
            "labels": self.spec.labels,
        })))
    }
}

impl ManagedEntity for GantryCloudNetwork {
    const REMOTE_KIND: EntityKind = EntityKind::CloudNetwork;

    impl_entity_basics!();

    fn auth_ref(&self) -> Option<&NamespacedRef> {
        Some(&self.spec.auth_ref)
    }

    fn validate(&self) -> gantry_common::Result<()> {
        if self.spec.availability_zones.is_empty() {
            return Err(gantry_common::Error::validation_for_field(
                gantry_common::kube_utils::object_key(self),
                "spec.availabilityZones",
                "at least one availability zone is required",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "name": remote_name(self.spec.name.as_ref(), self),
            "cloud_gateway_provider_account_id": self.spec.cloud_gateway_provider_account_id,
            "region": self.spec.region,
            "availability_zones": self.spec.availability_zones,
            "cidr_block": self.spec.cidr_block,
            "labels": self.spec.labels,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::crd::{ClusterType, GantryControlPlaneSpec};

    fn control_plane() -> GantryControlPlane {
        let mut cp = GantryControlPlane::new(
            "prod",
            GantryControlPlaneSpec {
                name: None,
                description: Some("production gateways".to_string()),
                cluster_type: ClusterType::ControlPlane,
                auth_ref: NamespacedRef::local("hosted-api"),
                labels: [("team".to_string(), "edge".to_string())].into(),
                adopt: None,
            },
        );
        cp.metadata.namespace = Some("platform".to_string());
        cp
    }

    #[test]
    fn control_plane_payload_uses_object_name() {
        let payload = control_plane()
            .build_payload(&ResolvedParents::default())
            .unwrap();
        assert_eq!(payload["name"], "prod");
        assert_eq!(payload["cluster_type"], "CLUSTER_TYPE_CONTROL_PLANE");
        assert_eq!(payload["labels"]["team"], "edge");
    }

    #[test]
    fn control_plane_is_organization_scoped() {
        let cp = control_plane();
        assert_eq!(cp.auth_ref(), Some(&NamespacedRef::local("hosted-api")));
        assert!(cp
            .required_conditions()
            .contains(&gantry_common::crd::condition_types::AUTH_REF_VALID));
        assert!(cp.references("GantryAuthConfiguration", "platform", "hosted-api"));
        assert!(!cp.references("GantryAuthConfiguration", "team-a", "hosted-api"));
    }
}
