//! Load-balancing kinds: upstreams and their targets

use serde_json::{json, Value};

use gantry_common::crd::{ControlPlaneRef, GantryTarget, GantryUpstream};
use gantry_common::kube_utils::object_key;
use gantry_remote::EntityKind;

use crate::adapter::{compact, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryUpstream {
    const REMOTE_KIND: EntityKind = EntityKind::Upstream;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "name": self.spec.name,
            "algorithm": self.spec.algorithm,
            "slots": self.spec.slots,
            "host_header": self.spec.host_header,
        })))
    }
}

impl ManagedEntity for GantryTarget {
    const REMOTE_KIND: EntityKind = EntityKind::Target;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::Upstream];

    impl_entity_basics!(tags);

    fn parent_refs(&self) -> Vec<ParentRef> {
        vec![ParentRef::inheriting(
            ParentRole::Upstream,
            &self.spec.upstream_ref.name,
        )]
    }

    fn validate(&self) -> gantry_common::Result<()> {
        if self.spec.weight > 65535 {
            return Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.weight",
                "weight must be between 0 and 65535",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({
            "target": self.spec.target,
            "weight": self.spec.weight,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::crd::{GantryTargetSpec, GantryUpstreamSpec, LocalRef};

    fn target(weight: u32) -> GantryTarget {
        GantryTarget::new(
            "orders-a",
            GantryTargetSpec {
                upstream_ref: LocalRef {
                    name: "orders".to_string(),
                },
                target: "10.0.0.7:8080".to_string(),
                weight,
                tags: vec![],
                adopt: None,
            },
        )
    }

    #[test]
    fn upstream_payload_omits_unset_balancer_fields() {
        let upstream = GantryUpstream::new(
            "orders",
            GantryUpstreamSpec {
                control_plane_ref: ControlPlaneRef::named("prod"),
                name: "orders.internal".to_string(),
                algorithm: Some("least-connections".to_string()),
                slots: None,
                host_header: None,
                tags: vec![],
                adopt: None,
            },
        );
        let payload = upstream
            .build_payload(&ResolvedParents::default())
            .unwrap();
        assert_eq!(
            payload,
            json!({ "name": "orders.internal", "algorithm": "least-connections" })
        );
        let control_plane = upstream
            .control_plane_ref()
            .and_then(|r| r.namespaced_ref.as_ref());
        assert_eq!(control_plane.map(|r| r.name.as_str()), Some("prod"));
    }

    #[test]
    fn target_weight_is_bounded() {
        assert!(target(100).validate().is_ok());
        assert!(target(70_000).validate().is_err());
    }

    #[test]
    fn target_is_nested_under_upstream() {
        let parents = target(100).parent_refs();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].role, ParentRole::Upstream);
        assert!(parents[0].inherits_control_plane);
        let payload = target(100)
            .build_payload(&ResolvedParents::default())
            .unwrap();
        assert_eq!(payload, json!({ "target": "10.0.0.7:8080", "weight": 100 }));
    }
}
