//! Kubernetes access needed by the binding manager

use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use gantry_common::crd::{
    GantryConsumer, GantryConsumerGroup, GantryPlugin, GantryPluginBinding, GantryRoute,
    GantryService,
};
use gantry_common::kube_utils::{add_finalizer, is_terminating, remove_finalizer};
use gantry_common::{
    Error, FIELD_MANAGER, MANAGED_BY_LABEL, PLUGIN_ANNOTATION, PLUGIN_IN_USE_FINALIZER,
};

use crate::annotation::{plugin_of, BindableKind, PluginKey};
use crate::combination::Annotated;
use crate::MANAGER_NAME;

/// Label selector matching the derived bindings of `plugin`
pub fn derived_selector(plugin: &PluginKey) -> String {
    format!(
        "{MANAGED_BY_LABEL}={MANAGER_NAME},{PLUGIN_ANNOTATION}={}",
        plugin.label_value()
    )
}

/// Reads annotated objects and writes derived bindings
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Every bindable object carrying a valid plugin annotation
    async fn annotated(&self) -> Result<Vec<Annotated>, Error>;

    /// Derived bindings labelled for `plugin`, in every namespace
    async fn derived_bindings(&self, plugin: &PluginKey) -> Result<Vec<GantryPluginBinding>, Error>;

    /// Create or update a derived binding
    async fn apply_binding(&self, binding: &GantryPluginBinding) -> Result<(), Error>;

    /// Delete a derived binding; missing bindings are already deleted
    async fn delete_binding(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Add the in-use finalizer to the plugin definition
    async fn add_in_use(&self, plugin: &PluginKey) -> Result<(), Error>;

    /// Remove the in-use finalizer from the plugin definition
    async fn remove_in_use(&self, plugin: &PluginKey) -> Result<(), Error>;
}

/// Store backed by the Kubernetes API
pub struct KubeBindingStore {
    client: Client,
}

impl KubeBindingStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_annotated<K>(
        &self,
        kind: BindableKind,
        service_of: fn(&K) -> Option<String>,
    ) -> Result<Vec<Annotated>, Error>
    where
        K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug,
    {
        let api: Api<K> = Api::all(self.client.clone());
        let objects = api.list(&ListParams::default()).await?;
        Ok(objects
            .items
            .iter()
            .filter_map(|obj| {
                let plugin = plugin_of(obj)?;
                Some(Annotated {
                    kind,
                    namespace: obj.namespace().unwrap_or_default(),
                    name: obj.name_any(),
                    service: service_of(obj),
                    plugin,
                    terminating: is_terminating(obj),
                    reference: obj.object_ref(&()),
                })
            })
            .collect())
    }
}

#[async_trait]
impl BindingStore for KubeBindingStore {
    async fn annotated(&self) -> Result<Vec<Annotated>, Error> {
        let mut annotated = self
            .list_annotated::<GantryService>(BindableKind::Service, |_| None)
            .await?;
        annotated.extend(
            self.list_annotated::<GantryRoute>(BindableKind::Route, |route| {
                route.spec.service_ref.as_ref().map(|s| s.name.clone())
            })
            .await?,
        );
        annotated.extend(
            self.list_annotated::<GantryConsumer>(BindableKind::Consumer, |_| None)
                .await?,
        );
        annotated.extend(
            self.list_annotated::<GantryConsumerGroup>(BindableKind::ConsumerGroup, |_| None)
                .await?,
        );
        Ok(annotated)
    }

    async fn derived_bindings(&self, plugin: &PluginKey) -> Result<Vec<GantryPluginBinding>, Error> {
        let api: Api<GantryPluginBinding> = Api::all(self.client.clone());
        let bindings = api
            .list(&ListParams::default().labels(&derived_selector(plugin)))
            .await?;
        Ok(bindings.items)
    }

    async fn apply_binding(&self, binding: &GantryPluginBinding) -> Result<(), Error> {
        let namespace = binding.namespace().ok_or_else(|| {
            Error::internal_with_context("apply_binding", "derived binding has no namespace")
        })?;
        let api: Api<GantryPluginBinding> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &binding.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(binding),
        )
        .await?;
        Ok(())
    }

    async fn delete_binding(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<GantryPluginBinding> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_in_use(&self, plugin: &PluginKey) -> Result<(), Error> {
        add_finalizer::<GantryPlugin>(
            &self.client,
            &plugin.name,
            &plugin.namespace,
            PLUGIN_IN_USE_FINALIZER,
            FIELD_MANAGER,
        )
        .await
    }

    async fn remove_in_use(&self, plugin: &PluginKey) -> Result<(), Error> {
        remove_finalizer::<GantryPlugin>(
            &self.client,
            &plugin.name,
            &plugin.namespace,
            PLUGIN_IN_USE_FINALIZER,
            FIELD_MANAGER,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_names_manager_and_plugin_hash() {
        let plugin = PluginKey {
            namespace: "platform".to_string(),
            name: "rate-limit".to_string(),
        };
        assert_eq!(
            derived_selector(&plugin),
            format!(
                "gantry.dev/managed-by=plugin-binding-manager,gantry.dev/plugin={}",
                plugin.label_value()
            )
        );
    }
}
