//! In-memory binding store for controller tests

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use gantry_common::crd::{GantryPlugin, GantryPluginBinding, GantryPluginSpec};
use gantry_common::Error;

use crate::annotation::{parse, BindableKind, PluginKey};
use crate::combination::Annotated;
use crate::store::BindingStore;

#[derive(Default)]
pub struct MemoryBindingStore {
    annotated: Mutex<Vec<Annotated>>,
    bindings: Mutex<BTreeMap<(String, String), GantryPluginBinding>>,
    in_use: Mutex<BTreeSet<PluginKey>>,
    hold_deletes: AtomicBool,
    applies: AtomicUsize,
    deletes: AtomicUsize,
}

impl MemoryBindingStore {
    pub fn annotate(&self, obj: Annotated) {
        self.unannotate(obj.kind, &obj.namespace, &obj.name);
        self.annotated.lock().unwrap().push(obj);
    }

    pub fn unannotate(&self, kind: BindableKind, namespace: &str, name: &str) {
        self.annotated
            .lock()
            .unwrap()
            .retain(|a| !(a.kind == kind && a.namespace == namespace && a.name == name));
    }

    pub fn bindings(&self) -> Vec<GantryPluginBinding> {
        self.bindings.lock().unwrap().values().cloned().collect()
    }

    pub fn in_use(&self, plugin: &PluginKey) -> bool {
        self.in_use.lock().unwrap().contains(plugin)
    }

    /// Deleted bindings linger as terminating instead of vanishing
    pub fn hold_deletes(&self) {
        self.hold_deletes.store(true, Ordering::SeqCst);
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn annotated(&self) -> Result<Vec<Annotated>, Error> {
        Ok(self.annotated.lock().unwrap().clone())
    }

    async fn derived_bindings(&self, plugin: &PluginKey) -> Result<Vec<GantryPluginBinding>, Error> {
        let label = plugin.label_value();
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .values()
            .filter(|b| b.labels().get(gantry_common::PLUGIN_ANNOTATION) == Some(&label))
            .cloned()
            .collect())
    }

    async fn apply_binding(&self, binding: &GantryPluginBinding) -> Result<(), Error> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.bindings.lock().unwrap().insert(
            (binding.namespace().unwrap_or_default(), binding.name_any()),
            binding.clone(),
        );
        Ok(())
    }

    async fn delete_binding(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let key = (namespace.to_string(), name.to_string());
        let mut bindings = self.bindings.lock().unwrap();
        if self.hold_deletes.load(Ordering::SeqCst) {
            if let Some(binding) = bindings.get_mut(&key) {
                binding.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
        } else {
            bindings.remove(&key);
        }
        Ok(())
    }

    async fn add_in_use(&self, plugin: &PluginKey) -> Result<(), Error> {
        self.in_use.lock().unwrap().insert(plugin.clone());
        Ok(())
    }

    async fn remove_in_use(&self, plugin: &PluginKey) -> Result<(), Error> {
        self.in_use.lock().unwrap().remove(plugin);
        Ok(())
    }
}

/// Plugin definition `namespace/name` with a uid so it can own bindings
pub fn plugin(namespace: &str, name: &str) -> GantryPlugin {
    let mut plugin = GantryPlugin::new(
        name,
        GantryPluginSpec {
            plugin_name: "rate-limiting".to_string(),
            config: serde_json::json!({ "minute": 10 }),
            protocols: vec![],
            enabled: true,
        },
    );
    plugin.metadata.namespace = Some(namespace.to_string());
    plugin.metadata.uid = Some(format!("uid-{name}"));
    plugin
}

/// Annotated object whose annotation value is `value`
pub fn annotated(kind: BindableKind, namespace: &str, name: &str, value: &str) -> Annotated {
    let plugin = parse(value, namespace).unwrap();
    Annotated {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        service: None,
        plugin,
        terminating: false,
        reference: ObjectReference {
            kind: Some(kind.kind().to_string()),
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
    }
}
