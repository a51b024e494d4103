//! Proxy kinds: services and routes

use serde_json::{json, Value};

use gantry_common::crd::{ControlPlaneRef, GantryRoute, GantryService};
use gantry_common::kube_utils::object_key;
use gantry_remote::EntityKind;

use super::remote_name;
use crate::adapter::{compact, id_ref, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryService {
    const REMOTE_KIND: EntityKind = EntityKind::Service;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn validate(&self) -> gantry_common::Result<()> {
        if self.spec.host.is_empty() {
            return Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.host",
                "host must not be empty",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        let spec = &self.spec;
        Ok(compact(json!({
            "name": remote_name(spec.name.as_ref(), self),
            "host": spec.host,
            "port": spec.port,
            "protocol": spec.protocol,
            "path": spec.path,
            "retries": spec.retries,
            "connect_timeout": spec.connect_timeout,
            "read_timeout": spec.read_timeout,
            "write_timeout": spec.write_timeout,
            "enabled": spec.enabled,
        })))
    }
}

impl ManagedEntity for GantryRoute {
    const REMOTE_KIND: EntityKind = EntityKind::Route;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::Service];

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        self.spec.control_plane_ref.as_ref()
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        let Some(service) = &self.spec.service_ref else {
            return Vec::new();
        };
        if self.spec.control_plane_ref.is_some() {
            vec![ParentRef::new(ParentRole::Service, &service.name)]
        } else {
            vec![ParentRef::inheriting(ParentRole::Service, &service.name)]
        }
    }

    fn validate(&self) -> gantry_common::Result<()> {
        if self.spec.control_plane_ref.is_none() && self.spec.service_ref.is_none() {
            return Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.controlPlaneRef",
                "route needs either controlPlaneRef or serviceRef",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, parents: &ResolvedParents) -> gantry_common::Result<Value> {
        let spec = &self.spec;
        Ok(compact(json!({
            "name": remote_name(spec.name.as_ref(), self),
            "protocols": spec.protocols,
            "methods": spec.methods,
            "hosts": spec.hosts,
            "paths": spec.paths,
            "headers": spec.headers,
            "strip_path": spec.strip_path,
            "preserve_host": spec.preserve_host,
            "service": id_ref(parents.remote_id(ParentRole::Service)),
        })))
    }
}
