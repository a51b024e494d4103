//! Writes the reconciler makes to its own objects

use async_trait::async_trait;
use kube::{Client, ResourceExt};

use gantry_common::crd::EntityStatus;
use gantry_common::kube_utils::{add_finalizer, patch_resource_status, remove_finalizer};
use gantry_common::{Error, FIELD_MANAGER, REMOTE_CLEANUP_FINALIZER};

use crate::ManagedEntity;

/// Status and finalizer writes for one kind
#[async_trait]
pub trait EntityStore<E: ManagedEntity>: Send + Sync {
    /// Replace the status sub-resource
    async fn patch_status(&self, obj: &E, status: &EntityStatus) -> Result<(), Error>;

    /// Add the remote cleanup finalizer
    async fn add_finalizer(&self, obj: &E) -> Result<(), Error>;

    /// Remove the remote cleanup finalizer
    async fn remove_finalizer(&self, obj: &E) -> Result<(), Error>;
}

/// [`EntityStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeEntityStore {
    client: Client,
}

impl KubeEntityStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn namespace_of<E: ManagedEntity>(obj: &E) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::validation_for(obj.name_any(), "object has no namespace"))
}

#[async_trait]
impl<E: ManagedEntity> EntityStore<E> for KubeEntityStore {
    async fn patch_status(&self, obj: &E, status: &EntityStatus) -> Result<(), Error> {
        let namespace = namespace_of(obj)?;
        patch_resource_status::<E>(&self.client, &obj.name_any(), &namespace, status, FIELD_MANAGER)
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, obj: &E) -> Result<(), Error> {
        let namespace = namespace_of(obj)?;
        add_finalizer::<E>(
            &self.client,
            &obj.name_any(),
            &namespace,
            REMOTE_CLEANUP_FINALIZER,
            FIELD_MANAGER,
        )
        .await
    }

    async fn remove_finalizer(&self, obj: &E) -> Result<(), Error> {
        let namespace = namespace_of(obj)?;
        remove_finalizer::<E>(
            &self.client,
            &obj.name_any(),
            &namespace,
            REMOTE_CLEANUP_FINALIZER,
            FIELD_MANAGER,
        )
        .await
    }
}
