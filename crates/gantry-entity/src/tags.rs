//! Remote tags identifying which declared object owns a remote entity
//!
//! The uniqueness tag is the conflict-resolution lookup key: it is derived
//! only from the object's stable identity, so every pass (and every replica)
//! computes the same value.

use kube::ResourceExt;
use serde_json::{Map, Value};

use gantry_common::deterministic_hash;
use gantry_remote::{EntityKind, TagStyle};

use crate::ManagedEntity;

/// Prefix of the uniqueness tag
pub const UNIQUENESS_TAG_PREFIX: &str = "gantry-uid";

/// Uniqueness tag for the object `kind` `namespace/name` with `uid`.
///
/// # Arguments
///
/// * `kind` - Kubernetes kind of the declared object
/// * `namespace` - Object namespace
/// * `name` - Object name
/// * `uid` - Object uid, so a recreated object gets a new tag
pub fn uniqueness_tag(kind: &str, namespace: &str, name: &str, uid: &str) -> String {
    let hash = deterministic_hash(&format!("{kind}/{namespace}/{name}/{uid}"));
    format!("{UNIQUENESS_TAG_PREFIX}:{hash}")
}

/// Uniqueness tag of a declared object
pub fn object_uniqueness_tag<E: ManagedEntity>(obj: &E) -> String {
    uniqueness_tag(
        &E::kind(&()),
        &obj.namespace().unwrap_or_default(),
        &obj.name_any(),
        obj.uid().as_deref().unwrap_or_default(),
    )
}

/// Every tag attached to the remote entity: uniqueness, informational, user
pub fn entity_tags<E: ManagedEntity>(obj: &E) -> Vec<String> {
    let mut tags = vec![
        object_uniqueness_tag(obj),
        format!("k8s-kind:{}", E::kind(&())),
        format!("k8s-namespace:{}", obj.namespace().unwrap_or_default()),
        format!("k8s-name:{}", obj.name_any()),
    ];
    if let Some(uid) = obj.uid() {
        tags.push(format!("k8s-uid:{uid}"));
    }
    for tag in obj.user_tags() {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Attach `tags` to a payload the way `kind` stores them
///
/// Label-style kinds get each `key:value` tag as a label, merged over the
/// declared labels; kinds without tag support are left untouched.
pub fn apply_tags(kind: EntityKind, payload: &mut Value, tags: &[String]) {
    let Some(map) = payload.as_object_mut() else {
        return;
    };
    match kind.tag_style() {
        TagStyle::Tags => {
            map.insert("tags".to_string(), Value::from(tags.to_vec()));
        }
        TagStyle::Labels => {
            let labels = map
                .entry("labels")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(labels) = labels.as_object_mut() {
                for (key, value) in tags.iter().filter_map(|t| t.split_once(':')) {
                    labels.insert(key.to_string(), Value::from(value));
                }
            }
        }
        TagStyle::Unsupported => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_common::crd::{ControlPlaneRef, GantryService, GantryServiceSpec};
    use serde_json::json;

    fn service(uid: &str, tags: Vec<String>) -> GantryService {
        let mut svc = GantryService::new(
            "svc-a",
            GantryServiceSpec {
                control_plane_ref: ControlPlaneRef::named("prod"),
                name: None,
                host: "a.default.svc".to_string(),
                port: 80,
                protocol: "http".to_string(),
                path: None,
                retries: None,
                connect_timeout: None,
                read_timeout: None,
                write_timeout: None,
                enabled: true,
                tags,
                adopt: None,
            },
        );
        svc.metadata.namespace = Some("default".to_string());
        svc.metadata.uid = Some(uid.to_string());
        svc
    }

    #[test]
    fn uniqueness_tag_is_stable_and_identity_bound() {
        let a = object_uniqueness_tag(&service("uid-1", vec![]));
        assert_eq!(a, object_uniqueness_tag(&service("uid-1", vec!["x".into()])));
        assert_ne!(a, object_uniqueness_tag(&service("uid-2", vec![])));
        assert!(a.starts_with("gantry-uid:"));
        assert_eq!(a.len(), "gantry-uid:".len() + 16);
    }

    #[test]
    fn entity_tags_keep_user_tags_once() {
        let svc = service("uid-1", vec!["team:shop".into(), "k8s-name:svc-a".into()]);
        let tags = entity_tags(&svc);
        assert_eq!(tags[0], object_uniqueness_tag(&svc));
        assert!(tags.contains(&"k8s-kind:GantryService".to_string()));
        assert!(tags.contains(&"k8s-uid:uid-1".to_string()));
        assert!(tags.contains(&"team:shop".to_string()));
        assert_eq!(tags.iter().filter(|t| *t == "k8s-name:svc-a").count(), 1);
    }

    #[test]
    fn tags_land_where_the_kind_keeps_them() {
        let tags = vec!["gantry-uid:abc".to_string(), "k8s-name:prod".to_string()];

        let mut service = json!({ "name": "svc" });
        apply_tags(EntityKind::Service, &mut service, &tags);
        assert_eq!(service["tags"], json!(["gantry-uid:abc", "k8s-name:prod"]));

        let mut control_plane = json!({ "name": "prod", "labels": { "team": "edge" } });
        apply_tags(EntityKind::ControlPlane, &mut control_plane, &tags);
        assert_eq!(control_plane["labels"]["gantry-uid"], "abc");
        assert_eq!(control_plane["labels"]["team"], "edge");
        assert!(control_plane.get("tags").is_none());

        let mut dp_cert = json!({ "cert": "pem" });
        apply_tags(EntityKind::DataPlaneCertificate, &mut dp_cert, &tags);
        assert_eq!(dp_cert, json!({ "cert": "pem" }));
    }
}
