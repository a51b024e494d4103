//! In-memory grant store and fixtures for tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kube::ResourceExt;

use gantry_common::crd::{
    GantryReferenceGrant, ReferenceGrant, ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo,
};
use gantry_common::Error;

use crate::derive::source_label_value;
use crate::store::GrantStore;
use crate::SOURCE_LABEL;

type Key = (String, String);

#[derive(Default)]
pub struct MemoryGrantStore {
    derived: Mutex<BTreeMap<Key, GantryReferenceGrant>>,
    sources: Mutex<BTreeMap<Key, String>>,
}

impl MemoryGrantStore {
    pub fn add_source(&self, grant: &ReferenceGrant) {
        self.sources.lock().unwrap().insert(
            (grant.namespace().unwrap_or_default(), grant.name_any()),
            grant.uid().unwrap_or_default(),
        );
    }

    pub fn remove_source(&self, namespace: &str, name: &str) {
        self.sources
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn insert(&self, grant: GantryReferenceGrant) {
        self.derived
            .lock()
            .unwrap()
            .insert((grant.namespace().unwrap_or_default(), grant.name_any()), grant);
    }

    pub fn grants(&self) -> Vec<GantryReferenceGrant> {
        self.derived.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn derived(&self, namespace: &str, source: &str) -> Result<Vec<GantryReferenceGrant>, Error> {
        let label = source_label_value(source);
        Ok(self
            .derived
            .lock()
            .unwrap()
            .values()
            .filter(|g| {
                g.namespace().as_deref() == Some(namespace)
                    && g.labels().get(SOURCE_LABEL) == Some(&label)
            })
            .cloned()
            .collect())
    }

    async fn apply(&self, grant: &GantryReferenceGrant) -> Result<(), Error> {
        self.insert(grant.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.derived
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }

    async fn source_uid(&self, namespace: &str, name: &str) -> Result<Option<String>, Error> {
        Ok(self
            .sources
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

/// Authored grant `namespace/name` with uid `uid-<name>`
pub fn authored(
    namespace: &str,
    name: &str,
    from: Vec<ReferenceGrantFrom>,
    to: Vec<ReferenceGrantTo>,
) -> ReferenceGrant {
    let mut grant = ReferenceGrant::new(name, ReferenceGrantSpec { from, to });
    grant.metadata.namespace = Some(namespace.to_string());
    grant.metadata.uid = Some(format!("uid-{name}"));
    grant
}
