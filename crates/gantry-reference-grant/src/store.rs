//! Kubernetes access needed by the derivator

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use gantry_common::crd::{GantryReferenceGrant, ReferenceGrant};
use gantry_common::{Error, FIELD_MANAGER};

use crate::derive::source_label_value;
use crate::SOURCE_LABEL;

/// Reads authored grants and writes derived ones
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Derived grants of the authored grant `namespace/source`
    async fn derived(&self, namespace: &str, source: &str) -> Result<Vec<GantryReferenceGrant>, Error>;

    /// Create or update a derived grant
    async fn apply(&self, grant: &GantryReferenceGrant) -> Result<(), Error>;

    /// Delete a derived grant; missing grants are already deleted
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Uid of the authored grant, or `None` when it does not exist
    async fn source_uid(&self, namespace: &str, name: &str) -> Result<Option<String>, Error>;
}

/// Store backed by the Kubernetes API
pub struct KubeGrantStore {
    client: Client,
}

impl KubeGrantStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GrantStore for KubeGrantStore {
    async fn derived(&self, namespace: &str, source: &str) -> Result<Vec<GantryReferenceGrant>, Error> {
        let api: Api<GantryReferenceGrant> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{SOURCE_LABEL}={}", source_label_value(source));
        Ok(api.list(&ListParams::default().labels(&selector)).await?.items)
    }

    async fn apply(&self, grant: &GantryReferenceGrant) -> Result<(), Error> {
        let namespace = grant.namespace().ok_or_else(|| {
            Error::internal_with_context("apply_grant", "derived grant has no namespace")
        })?;
        let api: Api<GantryReferenceGrant> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &grant.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(grant),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<GantryReferenceGrant> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn source_uid(&self, namespace: &str, name: &str) -> Result<Option<String>, Error> {
        let api: Api<ReferenceGrant> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.and_then(|grant| grant.uid()))
    }
}
