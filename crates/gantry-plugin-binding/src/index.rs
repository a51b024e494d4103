//! Process-local memory of which plugin each bindable object last named
//!
//! When an annotation changes or disappears, the watch event only carries
//! the new value. The index supplies the old one so the previously named
//! plugin is reconciled too and can prune its binding. It is a hint: a
//! restarted process starts empty and the periodic resync covers the gap.

use dashmap::DashMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::reflector::ObjectRef;

use gantry_common::crd::GantryPlugin;

use crate::annotation::{annotated_plugin, BindableKind, PluginKey};

type ObjectKey = (BindableKind, String, String);

/// Last plugin named by each bindable object
#[derive(Default)]
pub struct AnnotationIndex {
    last: DashMap<ObjectKey, PluginKey>,
}

impl AnnotationIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the object's current annotation and return the plugins to reconcile.
    ///
    /// Objects being deleted are dropped from the index; their plugins are
    /// still returned so the bindings they required get pruned.
    pub fn observe(&self, kind: BindableKind, meta: &ObjectMeta) -> Vec<ObjectRef<GantryPlugin>> {
        let key = (
            kind,
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        );
        let current = annotated_plugin(meta);
        let previous = match &current {
            Some(plugin) if meta.deletion_timestamp.is_none() => {
                self.last.insert(key, plugin.clone())
            }
            _ => self.last.remove(&key).map(|(_, plugin)| plugin),
        };

        let mut plugins: Vec<PluginKey> = current.into_iter().chain(previous).collect();
        plugins.dedup();
        plugins
            .into_iter()
            .map(|p| ObjectRef::new(&p.name).within(&p.namespace))
            .collect()
    }

    /// Number of objects currently tracked
    pub fn len(&self) -> usize {
        self.last.len()
    }

    /// Whether no object is tracked
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}
