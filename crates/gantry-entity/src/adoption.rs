//! Adoption of a pre-existing remote entity
//!
//! Adoption fixes identity only. The target is looked up by id here; the
//! reconciler then overwrites it with the declared payload like any other
//! tracked entity. A missing target never falls back to create.

use tracing::debug;

use gantry_common::crd::{AdoptMode, AdoptOptions};
use gantry_remote::{EntityKind, RemoteApi, RemoteError, RemoteScope};

/// Id of the entity `options` names, or `None` when it does not exist
pub async fn adoption_target(
    client: &dyn RemoteApi,
    kind: EntityKind,
    scope: &RemoteScope,
    options: &AdoptOptions,
) -> Result<Option<String>, RemoteError> {
    match options.mode {
        AdoptMode::Override => {
            let found = client.get(kind, scope, &options.id).await?.is_some();
            debug!(%kind, id = %options.id, found, "looked up adoption target");
            Ok(found.then(|| options.id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_remote::{InMemoryRemote, RemoteOp};
    use serde_json::json;

    fn options(id: &str) -> AdoptOptions {
        AdoptOptions {
            mode: AdoptMode::Override,
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn existing_target_is_found_without_writes() {
        let remote = InMemoryRemote::new();
        let scope = RemoteScope::control_plane("cp-1");
        remote
            .insert(
                EntityKind::Service,
                &scope,
                "legacy-7",
                json!({ "name": "orders", "host": "old.example" }),
            )
            .unwrap();

        let target = adoption_target(&remote, EntityKind::Service, &scope, &options("legacy-7"))
            .await
            .unwrap();

        assert_eq!(target.as_deref(), Some("legacy-7"));
        assert_eq!(remote.call_count(RemoteOp::Create), 0);
        assert_eq!(remote.call_count(RemoteOp::Upsert), 0);
        assert_eq!(
            remote.entities(EntityKind::Service, &scope)["legacy-7"]["host"],
            "old.example"
        );
    }

    #[tokio::test]
    async fn missing_target_is_reported() {
        let remote = InMemoryRemote::new();
        let scope = RemoteScope::control_plane("cp-1");
        let target = adoption_target(&remote, EntityKind::Service, &scope, &options("gone"))
            .await
            .unwrap();

        assert_eq!(target, None);
        assert_eq!(remote.call_count(RemoteOp::Create), 0);
        assert!(remote.entities(EntityKind::Service, &scope).is_empty());
    }

    #[tokio::test]
    async fn lookup_failures_propagate() {
        let remote = InMemoryRemote::new();
        remote.fail_next(RemoteOp::Get, RemoteError::transient("502"));
        let err = adoption_target(
            &remote,
            EntityKind::Service,
            &RemoteScope::control_plane("cp-1"),
            &options("legacy-7"),
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());
    }
}
