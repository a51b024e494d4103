//! Consumer kinds: consumers, consumer groups and their credentials

use serde_json::{json, Value};

use gantry_common::crd::{
    ControlPlaneRef, GantryConsumer, GantryConsumerGroup, GantryCredentialApiKey,
    GantryCredentialBasicAuth,
};
use gantry_common::kube_utils::object_key;
use gantry_remote::EntityKind;

use super::remote_name;
use crate::adapter::{compact, ManagedEntity, ParentRef, ParentRole, ResolvedParents};

impl ManagedEntity for GantryConsumer {
    const REMOTE_KIND: EntityKind = EntityKind::Consumer;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::ConsumerGroup];

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.spec
            .consumer_groups
            .iter()
            .map(|group| ParentRef::new(ParentRole::ConsumerGroup, group))
            .collect()
    }

    fn validate(&self) -> gantry_common::Result<()> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        if blank(&self.spec.username) && blank(&self.spec.custom_id) {
            return Err(gantry_common::Error::validation_for_field(
                object_key(self),
                "spec.username",
                "consumer needs a username or a customId",
            ));
        }
        Ok(())
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({
            "username": self.spec.username,
            "custom_id": self.spec.custom_id,
        })))
    }

    // Membership lives on the group, not in the consumer payload.
    fn group_memberships(&self, parents: &ResolvedParents) -> Option<Vec<String>> {
        Some(
            parents
                .remote_ids(ParentRole::ConsumerGroup)
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl ManagedEntity for GantryConsumerGroup {
    const REMOTE_KIND: EntityKind = EntityKind::ConsumerGroup;

    impl_entity_basics!(tags);

    fn control_plane_ref(&self) -> Option<&ControlPlaneRef> {
        Some(&self.spec.control_plane_ref)
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({ "name": remote_name(self.spec.name.as_ref(), self) }))
    }
}

impl ManagedEntity for GantryCredentialBasicAuth {
    const REMOTE_KIND: EntityKind = EntityKind::BasicAuth;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::Consumer];

    impl_entity_basics!(tags);

    fn parent_refs(&self) -> Vec<ParentRef> {
        vec![ParentRef::inheriting(
            ParentRole::Consumer,
            &self.spec.consumer_ref.name,
        )]
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(json!({
            "username": self.spec.username,
            "password": self.spec.password,
        }))
    }
}

impl ManagedEntity for GantryCredentialApiKey {
    const REMOTE_KIND: EntityKind = EntityKind::ApiKey;
    const PARENT_ROLES: &'static [ParentRole] = &[ParentRole::Consumer];

    impl_entity_basics!(tags);

    fn parent_refs(&self) -> Vec<ParentRef> {
        vec![ParentRef::inheriting(
            ParentRole::Consumer,
            &self.spec.consumer_ref.name,
        )]
    }

    fn build_payload(&self, _parents: &ResolvedParents) -> gantry_common::Result<Value> {
        Ok(compact(json!({ "key": self.spec.key })))
    }
}
