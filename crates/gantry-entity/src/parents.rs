//! Reads of the objects an entity depends on
//!
//! The resolver only needs a few facts about each referenced object: its
//! remote id, which control plane it lives in and whether it is going
//! away. [`ParentLookup`] returns those facts; [`KubeParentLookup`] reads
//! them from the API server.

use async_trait::async_trait;
use kube::{Api, Client, ResourceExt};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use gantry_common::crd::{
    ControlPlaneRef, GantryAuthConfiguration, GantryCertificate, GantryConsumer,
    GantryConsumerGroup, GantryControlPlane, GantryKeySet, GantryPlugin, GantryPluginSpec,
    GantryRoute, GantryService, GantryUpstream, NamespacedRef, TokenSource,
};
use gantry_common::kube_utils::{get_secret_string, is_terminating};
use gantry_common::Error;
use gantry_remote::RemoteAuth;

use crate::adapter::{ManagedEntity, ParentRef, ParentRole};

/// What the resolver needs to know about a control plane
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlPlaneState {
    /// Remote id, once programmed
    pub remote_id: Option<String>,
    /// Organization id recorded on its status
    pub org_id: Option<String>,
    /// Mutations are not accepted (KIC clusters)
    pub read_only: bool,
    /// Auth configuration, namespace already resolved
    pub auth_ref: NamespacedRef,
    /// Deletion timestamp is set
    pub deleting: bool,
}

impl ControlPlaneState {
    /// Facts about a control plane object
    pub fn of(cp: &GantryControlPlane) -> Self {
        let namespace = cp.namespace().unwrap_or_default();
        Self {
            remote_id: cp.remote_id().map(String::from),
            org_id: cp
                .entity_status()
                .and_then(|s| s.remote.as_ref())
                .and_then(|r| r.org_id.clone()),
            read_only: cp.spec.cluster_type.is_read_only(),
            auth_ref: NamespacedRef {
                name: cp.spec.auth_ref.name.clone(),
                namespace: Some(cp.spec.auth_ref.resolve_namespace(&namespace).to_string()),
            },
            deleting: is_terminating(cp),
        }
    }
}

/// What the resolver needs to know about a parent entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentState {
    /// Namespace of the parent
    pub namespace: String,
    /// Remote id, once programmed
    pub remote_id: Option<String>,
    /// Control plane id it was programmed into
    pub control_plane_id: Option<String>,
    /// Its own explicit control plane reference
    pub control_plane_ref: Option<ControlPlaneRef>,
    /// The parent it inherits its control plane from
    pub inherits_from: Option<ParentRef>,
    /// Deletion timestamp is set
    pub deleting: bool,
}

impl ParentState {
    /// Facts about any managed entity acting as a parent
    pub fn of<E: ManagedEntity>(obj: &E) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            remote_id: obj.remote_id().map(String::from),
            control_plane_id: obj
                .entity_status()
                .and_then(|s| s.remote.as_ref())
                .and_then(|r| r.control_plane_id.clone()),
            control_plane_ref: obj.control_plane_ref().cloned(),
            inherits_from: obj
                .parent_refs()
                .into_iter()
                .find(|p| p.inherits_control_plane),
            deleting: is_terminating(obj),
        }
    }
}

/// A plugin definition and whether it is going away
#[derive(Clone, Debug, PartialEq)]
pub struct PluginState {
    /// Plugin definition
    pub spec: GantryPluginSpec,
    /// Deletion timestamp is set
    pub deleting: bool,
}

/// Lookup of referenced objects
///
/// `Ok(None)` means the object does not exist.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ParentLookup: Send + Sync {
    /// A GantryControlPlane
    async fn control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ControlPlaneState>, Error>;

    /// Credentials from a GantryAuthConfiguration
    ///
    /// A configuration whose token cannot be read is a validation error.
    async fn auth(&self, namespace: &str, name: &str) -> Result<Option<RemoteAuth>, Error>;

    /// A parent entity
    async fn parent(
        &self,
        role: ParentRole,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ParentState>, Error>;

    /// A GantryPlugin
    async fn plugin(&self, namespace: &str, name: &str) -> Result<Option<PluginState>, Error>;
}

/// [`ParentLookup`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeParentLookup {
    client: Client,
}

impl KubeParentLookup {
    /// Create a lookup using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn entity<E: ManagedEntity>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ParentState>, Error> {
        let api: Api<E> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.as_ref().map(ParentState::of))
    }
}

#[async_trait]
impl ParentLookup for KubeParentLookup {
    async fn control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ControlPlaneState>, Error> {
        let api: Api<GantryControlPlane> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.as_ref().map(ControlPlaneState::of))
    }

    async fn auth(&self, namespace: &str, name: &str) -> Result<Option<RemoteAuth>, Error> {
        let api: Api<GantryAuthConfiguration> = Api::namespaced(self.client.clone(), namespace);
        let Some(config) = api.get_opt(name).await? else {
            return Ok(None);
        };
        let token = match config.spec.token_source()? {
            TokenSource::Inline(token) => token.to_string(),
            TokenSource::Secret(secret) => {
                get_secret_string(&self.client, &secret.name, namespace, &secret.key)
                    .await
                    .map_err(|e| {
                        if e.is_not_found() {
                            Error::validation_for(
                                format!("{namespace}/{name}"),
                                format!("token secret {} not found", secret.name),
                            )
                        } else {
                            e
                        }
                    })?
            }
        };
        Ok(Some(RemoteAuth {
            server_url: config.spec.server_url.clone(),
            token,
        }))
    }

    async fn parent(
        &self,
        role: ParentRole,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ParentState>, Error> {
        match role {
            ParentRole::Service => self.entity::<GantryService>(namespace, name).await,
            ParentRole::Route => self.entity::<GantryRoute>(namespace, name).await,
            ParentRole::Consumer => self.entity::<GantryConsumer>(namespace, name).await,
            ParentRole::ConsumerGroup => self.entity::<GantryConsumerGroup>(namespace, name).await,
            ParentRole::Upstream => self.entity::<GantryUpstream>(namespace, name).await,
            ParentRole::Certificate => self.entity::<GantryCertificate>(namespace, name).await,
            ParentRole::KeySet => self.entity::<GantryKeySet>(namespace, name).await,
        }
    }

    async fn plugin(&self, namespace: &str, name: &str) -> Result<Option<PluginState>, Error> {
        let api: Api<GantryPlugin> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|p| PluginState {
            deleting: is_terminating(&p),
            spec: p.spec,
        }))
    }
}
