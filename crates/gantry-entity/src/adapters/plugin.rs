//! Plugin bindings: one plugin instance attached to a target combination

use serde_json::{json, Value};

use gantry_common::crd::{ControlPlaneRef, GantryPluginBinding, NamespacedRef};
use gantry_remote::EntityKind;

use crate::adapter::{compact, id_ref, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryPluginBinding {
    const REMOTE_KIND: EntityKind = EntityKind::Plugin;
    const PARENT_ROLES: &'static [ParentRole] = &[
        ParentRole::Service,
        ParentRole::Route,
        ParentRole::Consumer,
        ParentRole::ConsumerGroup,
    ];

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        self.spec.control_plane_ref.as_ref()
    }

    fn plugin_ref(&self) -> Option<&NamespacedRef> {
        Some(&self.spec.plugin_ref)
    }

    /// Targets in canonical order; without an explicit control plane the
    /// first target supplies it
    fn parent_refs(&self) -> Vec<ParentRef> {
        let targets = &self.spec.targets;
        let declared = [
            (ParentRole::Service, &targets.service_ref),
            (ParentRole::Route, &targets.route_ref),
            (ParentRole::Consumer, &targets.consumer_ref),
            (ParentRole::ConsumerGroup, &targets.consumer_group_ref),
        ];
        let mut inherit = self.spec.control_plane_ref.is_none();
        declared
            .into_iter()
            .filter_map(|(role, target)| target.as_ref().map(|t| (role, t)))
            .map(|(role, target)| {
                if std::mem::take(&mut inherit) {
                    ParentRef::inheriting(role, &target.name)
                } else {
                    ParentRef::new(role, &target.name)
                }
            })
            .collect()
    }

    fn validate(&self) -> gantry_common::Result<()> {
        self.spec.validate()
    }

    fn build_payload(&self, parents: &ResolvedParents) -> gantry_common::Result<Value> {
        let plugin = parents.plugin.as_ref().ok_or_else(|| {
            gantry_common::Error::internal_with_context(
                "build_payload",
                "plugin definition was not resolved",
            )
        })?;
        let config = if plugin.config.is_null() {
            json!({})
        } else {
            plugin.config.clone()
        };
        let protocols = (!plugin.protocols.is_empty()).then(|| plugin.protocols.clone());
        Ok(compact(json!({
            "name": plugin.plugin_name,
            "config": config,
            "protocols": protocols,
            "enabled": plugin.enabled,
            "service": id_ref(parents.remote_id(ParentRole::Service)),
            "route": id_ref(parents.remote_id(ParentRole::Route)),
            "consumer": id_ref(parents.remote_id(ParentRole::Consumer)),
            "consumer_group": id_ref(parents.remote_id(ParentRole::ConsumerGroup)),
        })))
    }
}
