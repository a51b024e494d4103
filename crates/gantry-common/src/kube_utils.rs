//! Kubernetes helpers shared by gantry controllers
//!
//! Finalizer management, status patching, secret lookup and deterministic
//! naming.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::Error;

/// Maximum length of a Kubernetes object name
pub const MAX_NAME_LEN: usize = 253;

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
///
/// Uses truncated SHA-256 so the value is stable across toolchain versions;
/// use it whenever the hash is persisted (tags, labels, derived names).
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Build a deterministic object name `<prefix>-<hash of parts>`
///
/// The prefix is truncated so the result stays a valid object name.
pub fn derived_name(prefix: &str, parts: &[&str]) -> String {
    let hash = deterministic_hash(&parts.join("/"));
    let max_prefix = MAX_NAME_LEN - hash.len() - 1;
    let prefix = prefix
        .get(..prefix.len().min(max_prefix))
        .unwrap_or(prefix)
        .trim_end_matches('-');
    format!("{prefix}-{hash}")
}

/// `namespace/name` of an object, for logs and error context
pub fn object_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.name_any()
    )
}

/// Whether the object has a deletion timestamp
pub fn is_terminating<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// Whether the object carries the given finalizer
pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// Add a finalizer to a namespaced object.
///
/// Reads the current finalizer list and merge-patches the full list back.
/// No-op when the finalizer is already present.
///
/// # Arguments
///
/// * `client` - Kubernetes client
/// * `name` - Object name
/// * `namespace` - Object namespace
/// * `finalizer` - Finalizer to add
/// * `field_manager` - Field manager recorded on the patch
pub async fn add_finalizer<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    finalizer: &str,
    field_manager: &str,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let obj = api.get(name).await?;
    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    if finalizers.iter().any(|f| f == finalizer) {
        return Ok(());
    }
    finalizers.push(finalizer.to_string());
    patch_finalizers(&api, name, finalizers, field_manager).await
}

/// Remove a finalizer from a namespaced object
///
/// Missing objects are treated as already released.
pub async fn remove_finalizer<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    finalizer: &str,
    field_manager: &str,
) -> Result<(), Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let obj = match api.get_opt(name).await? {
        Some(obj) => obj,
        None => return Ok(()),
    };
    let current = obj.meta().finalizers.clone().unwrap_or_default();
    if !current.iter().any(|f| f == finalizer) {
        return Ok(());
    }
    let finalizers: Vec<String> = current.into_iter().filter(|f| f != finalizer).collect();
    patch_finalizers(&api, name, finalizers, field_manager).await
}

async fn patch_finalizers<K>(
    api: &Api<K>,
    name: &str,
    finalizers: Vec<String>,
    field_manager: &str,
) -> Result<(), Error>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Patch the status sub-resource of a namespaced Kubernetes resource.
///
/// Serializes `status` into `{ "status": <status> }` and applies it via
/// merge-patch.
pub async fn patch_resource_status<K>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Read one key of a Secret as UTF-8.
///
/// A missing key or a non-UTF-8 value is reported with the Secret and key name.
pub async fn get_secret_string(
    client: &Client,
    name: &str,
    namespace: &str,
    key: &str,
) -> Result<String, Error> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets.get(name).await?;

    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .ok_or_else(|| {
            Error::internal_with_context(
                "get_secret_string",
                format!("secret {namespace}/{name} missing key {key}"),
            )
        })?;

    String::from_utf8(data.0.clone()).map_err(|e| {
        Error::internal_with_context(
            "get_secret_string",
            format!("secret {namespace}/{name} key {key} is not UTF-8: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GantryPlugin, GantryPluginSpec};
    use kube::api::ObjectMeta;

    fn plugin(finalizers: Option<Vec<&str>>) -> GantryPlugin {
        let mut p = GantryPlugin::new(
            "rate-limit",
            GantryPluginSpec {
                plugin_name: "rate-limiting".to_string(),
                config: serde_json::json!({}),
                protocols: vec![],
                enabled: true,
            },
        );
        p.metadata = ObjectMeta {
            name: Some("rate-limit".to_string()),
            namespace: Some("team-a".to_string()),
            finalizers: finalizers.map(|f| f.into_iter().map(String::from).collect()),
            ..Default::default()
        };
        p
    }

    #[test]
    fn deterministic_hash_is_stable() {
        let a = deterministic_hash("GantryService/team-a/svc-a/uid-1");
        let b = deterministic_hash("GantryService/team-a/svc-a/uid-1");
        let c = deterministic_hash("GantryService/team-a/svc-a/uid-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn derived_names_fit_object_name_limit() {
        let long = "x".repeat(400);
        let name = derived_name(&long, &["a", "b"]);
        assert!(name.len() <= MAX_NAME_LEN);
        assert_eq!(derived_name("plugin", &["a", "b"]), derived_name("plugin", &["a", "b"]));
        assert_ne!(derived_name("plugin", &["a", "b"]), derived_name("plugin", &["a", "c"]));
    }

    #[test]
    fn finalizer_presence() {
        assert!(has_finalizer(
            &plugin(Some(vec!["gantry.dev/plugin-in-use"])),
            "gantry.dev/plugin-in-use"
        ));
        assert!(!has_finalizer(&plugin(Some(vec!["other"])), "gantry.dev/plugin-in-use"));
        assert!(!has_finalizer(&plugin(None), "gantry.dev/plugin-in-use"));
    }

    #[test]
    fn object_key_includes_namespace() {
        assert_eq!(object_key(&plugin(None)), "team-a/rate-limit");
        assert!(!is_terminating(&plugin(None)));
    }
}
