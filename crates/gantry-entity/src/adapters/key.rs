//! Key material kinds: keys, key sets and vaults

use serde_json::{json, Value};

use gantry_common::crd::{ControlPlaneRef, GantryKey, GantryKeySet, GantryVault};
use gantry_common::kube_utils::object_key;
use gantry_remote::EntityKind;

use super::remote_name;
use crate::adapter::{compact, id_ref, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryKey {
    const REMOTE_KIND: EntityKind = EntityKind::Key;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::KeySet];

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .key_set_ref
            .iter()
            .map(|set| ParentRef::new(ParentRole::KeySet, &set.name))
            .collect()
    }

    fn validate(&self) -> gantry_common::Result<()> {
        match (&self.spec.jwk, &self.spec.pem) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.jwk",
                "exactly one of jwk or pem must be set",
            )),
        }
    }

    fn build_payload(&self, parents: &ResolvedParents) -> gantry_common::Result<Value> {
        let spec = &self.spec;
        let pem = spec.pem.as_ref().map(|pem| {
            compact(json!({
                "public_key": pem.public_key,
                "private_key": pem.private_key,
            }))
        });
        Ok(compact(json!({
            "kid": spec.kid,
            "name": remote_name(spec.name.as_ref(), self),
            "jwk": spec.jwk,
            "pem": pem,
            "set": id_ref(parents.remote_id(ParentRole::KeySet)),
        })))
    }
}

impl ManagedEntity for GantryKeySet {
    const REMOTE_KIND: EntityKind = EntityKind::KeySet;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({ "name": remote_name(self.spec.name.as_ref(), self) }))
    }
}

impl ManagedEntity for GantryVault {
    const REMOTE_KIND: EntityKind = EntityKind::Vault;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn validate(&self) -> gantry_common::Result<()> {
        if !(self.spec.config.is_object() || self.spec.config.is_null()) {
            return Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.config",
                "vault config must be an object",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "name": self.spec.backend,
            "prefix": self.spec.prefix,
            "description": self.spec.description,
            "config": self.spec.config,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ResolvedParent;
    use gantry_common::crd::{GantryKeySpec, LocalRef, PemKeyPair};

    fn key(jwk: Option<&str>, pem: Option<PemKeyPair>, set: Option<&str>) -> GantryKey {
        GantryKey::new(
            "signing",
            GantryKeySpec {
                control_plane_ref: ControlPlaneRef::named("prod"),
                kid: "kid-1".to_string(),
                name: None,
                jwk: jwk.map(str::to_string),
                pem,
                key_set_ref: set.map(|name| LocalRef {
                    name: name.to_string(),
                }),
                tags: vec![],
                adopt: None,
            },
        )
    }

    #[test]
    fn key_needs_exactly_one_format() {
        assert!(key(None, None, None).validate().is_err());
        assert!(key(Some("{}"), None, None).validate().is_ok());
        let pem = PemKeyPair {
            public_key: "pub".to_string(),
            private_key: None,
        };
        assert!(key(Some("{}"), Some(pem), None).validate().is_err());
    }

    #[test]
    fn key_payload_uses_snake_case_pem_and_set_id() {
        let pem = PemKeyPair {
            public_key: "pub".to_string(),
            private_key: None,
        };
        let resolved = ResolvedParents {
            parents: vec![ResolvedParent {
                role: ParentRole::KeySet,
                name: "jwks".to_string(),
                remote_id: "key_set-1".to_string(),
            }],
            ..Default::default()
        };
        let payload = key(None, Some(pem), Some("jwks"))
            .build_payload(&resolved)
            .unwrap();
        assert_eq!(payload["pem"], json!({ "public_key": "pub" }));
        assert_eq!(payload["set"]["id"], "key_set-1");
        assert!(payload.get("jwk").is_none());
    }
}
