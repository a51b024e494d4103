//! In-memory fakes and fixtures shared by the reconciler tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use gantry_common::crd::{
    BindingScope, BindingTargets, ControlPlaneRef, EntityStatus, GantryConsumer,
    GantryConsumerSpec, GantryPluginBinding, GantryPluginBindingSpec, GantryPluginSpec,
    GantryRoute, GantryRouteSpec, GantryService, GantryServiceSpec, GantryTarget,
    GantryTargetSpec, LocalRef, NamespacedRef,
};
use gantry_common::kube_utils::object_key;
use gantry_common::{Error, REMOTE_CLEANUP_FINALIZER};
use gantry_remote::RemoteAuth;

use crate::adapter::{ManagedEntity, ParentRef, ParentRole};
use crate::parents::{ControlPlaneState, ParentLookup, ParentState, PluginState};
use crate::store::EntityStore;

/// Objects keyed by `namespace/name`, with API-server finalizer semantics
pub struct MemoryStore<E> {
    objects: Mutex<HashMap<String, E>>,
}

impl<E: ManagedEntity> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, obj: E) {
        self.objects.lock().unwrap().insert(object_key(&obj), obj);
    }

    pub fn get(&self, key: &str) -> Option<E> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Set the deletion timestamp, or drop the object when nothing holds it
    pub fn delete(&self, key: &str) {
        let mut objects = self.objects.lock().unwrap();
        let Some(obj) = objects.get_mut(key) else {
            return;
        };
        if obj.finalizers().is_empty() {
            objects.remove(key);
        } else {
            obj.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
        }
    }

    fn update(&self, obj: &E, f: impl FnOnce(&mut E)) -> Result<(), Error> {
        let key = object_key(obj);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get_mut(&key).ok_or_else(|| {
            Error::internal_with_context("memory-store", format!("{key} not found"))
        })?;
        f(stored);
        if stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl<E: ManagedEntity> EntityStore<E> for MemoryStore<E> {
    async fn patch_status(&self, obj: &E, status: &EntityStatus) -> Result<(), Error> {
        let status = status.clone();
        self.update(obj, |stored| stored.set_entity_status(status))
    }

    async fn add_finalizer(&self, obj: &E) -> Result<(), Error> {
        self.update(obj, |stored| {
            let finalizers = stored.finalizers_mut();
            if !finalizers.iter().any(|f| f == REMOTE_CLEANUP_FINALIZER) {
                finalizers.push(REMOTE_CLEANUP_FINALIZER.to_string());
            }
        })
    }

    async fn remove_finalizer(&self, obj: &E) -> Result<(), Error> {
        self.update(obj, |stored| {
            stored.finalizers_mut().retain(|f| f != REMOTE_CLEANUP_FINALIZER)
        })
    }
}

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Referenced objects held in maps
#[derive(Default)]
pub struct MemoryParents {
    control_planes: Mutex<HashMap<Key, ControlPlaneState>>,
    auths: Mutex<HashMap<Key, RemoteAuth>>,
    parents: Mutex<HashMap<(ParentRole, String, String), ParentState>>,
    plugins: Mutex<HashMap<Key, PluginState>>,
}

impl MemoryParents {
    /// A programmed control plane `namespace/name` and its auth configuration
    pub fn with_control_plane(namespace: &str, name: &str, id: &str) -> Self {
        let parents = Self::default();
        parents.set_control_plane(namespace, name, control_plane_state(namespace, id));
        parents.auths.lock().unwrap().insert(
            key(namespace, "auth"),
            RemoteAuth {
                server_url: "https://api.gantry.test".to_string(),
                token: "token".to_string(),
            },
        );
        parents
    }

    pub fn set_control_plane(&self, namespace: &str, name: &str, state: ControlPlaneState) {
        self.control_planes
            .lock()
            .unwrap()
            .insert(key(namespace, name), state);
    }

    pub fn remove_control_plane(&self, namespace: &str, name: &str) {
        self.control_planes.lock().unwrap().remove(&key(namespace, name));
    }

    pub fn remove_auth(&self, namespace: &str, name: &str) {
        self.auths.lock().unwrap().remove(&key(namespace, name));
    }

    pub fn set_parent(&self, role: ParentRole, namespace: &str, name: &str, state: ParentState) {
        self.parents
            .lock()
            .unwrap()
            .insert((role, namespace.to_string(), name.to_string()), state);
    }

    pub fn set_plugin(&self, namespace: &str, name: &str, spec: GantryPluginSpec) {
        self.plugins.lock().unwrap().insert(
            key(namespace, name),
            PluginState {
                spec,
                deleting: false,
            },
        );
    }
}

#[async_trait]
impl ParentLookup for MemoryParents {
    async fn control_plane(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ControlPlaneState>, Error> {
        Ok(self.control_planes.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn auth(&self, namespace: &str, name: &str) -> Result<Option<RemoteAuth>, Error> {
        Ok(self.auths.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn parent(
        &self,
        role: ParentRole,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ParentState>, Error> {
        Ok(self
            .parents
            .lock()
            .unwrap()
            .get(&(role, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn plugin(&self, namespace: &str, name: &str) -> Result<Option<PluginState>, Error> {
        Ok(self.plugins.lock().unwrap().get(&key(namespace, name)).cloned())
    }
}

pub fn control_plane_state(namespace: &str, id: &str) -> ControlPlaneState {
    ControlPlaneState {
        remote_id: Some(id.to_string()),
        org_id: Some("org-1".to_string()),
        read_only: false,
        auth_ref: NamespacedRef {
            name: "auth".to_string(),
            namespace: Some(namespace.to_string()),
        },
        deleting: false,
    }
}

/// Parent state; `control_plane` names the control plane it references
pub fn parent_state(
    namespace: &str,
    remote_id: Option<&str>,
    control_plane_id: Option<&str>,
    control_plane: Option<&str>,
) -> ParentState {
    ParentState {
        namespace: namespace.to_string(),
        remote_id: remote_id.map(String::from),
        control_plane_id: control_plane_id.map(String::from),
        control_plane_ref: control_plane.map(ControlPlaneRef::named),
        inherits_from: None,
        deleting: false,
    }
}

/// Same as [`parent_state`] for a parent that inherits from another
pub fn inheriting_parent_state(
    namespace: &str,
    remote_id: &str,
    control_plane_id: &str,
    from: ParentRef,
) -> ParentState {
    ParentState {
        inherits_from: Some(from),
        ..parent_state(namespace, Some(remote_id), Some(control_plane_id), None)
    }
}

fn place<E: ManagedEntity>(mut obj: E) -> E {
    obj.meta_mut().namespace = Some("team-a".to_string());
    obj.meta_mut().uid = Some(format!("uid-{}", obj.name_any()));
    obj.meta_mut().generation = Some(1);
    obj
}

pub fn service(name: &str, control_plane: &str) -> GantryService {
    place(GantryService::new(
        name,
        GantryServiceSpec {
            control_plane_ref: ControlPlaneRef::named(control_plane),
            name: None,
            host: format!("{name}.team-a.svc"),
            port: 80,
            protocol: "http".to_string(),
            path: None,
            retries: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            enabled: true,
            tags: vec![],
            adopt: None,
        },
    ))
}

pub fn consumer(name: &str, control_plane: &str, groups: &[&str]) -> GantryConsumer {
    place(GantryConsumer::new(
        name,
        GantryConsumerSpec {
            control_plane_ref: ControlPlaneRef::named(control_plane),
            username: Some(name.to_string()),
            custom_id: None,
            consumer_groups: groups.iter().map(|g| g.to_string()).collect(),
            tags: vec![],
            adopt: None,
        },
    ))
}

pub fn route(name: &str, service: &str) -> GantryRoute {
    place(GantryRoute::new(
        name,
        GantryRouteSpec {
            control_plane_ref: None,
            service_ref: Some(LocalRef {
                name: service.to_string(),
            }),
            name: None,
            protocols: vec!["https".to_string()],
            methods: vec![],
            hosts: vec![],
            paths: vec![format!("/{name}")],
            headers: Default::default(),
            strip_path: None,
            preserve_host: None,
            tags: vec![],
            adopt: None,
        },
    ))
}

pub fn target(upstream: &str, address: &str) -> GantryTarget {
    place(GantryTarget::new(
        &address.replace([':', '.'], "-"),
        GantryTargetSpec {
            upstream_ref: LocalRef {
                name: upstream.to_string(),
            },
            target: address.to_string(),
            weight: 100,
            tags: vec![],
            adopt: None,
        },
    ))
}

pub fn binding(name: &str, plugin: &str, service: &str) -> GantryPluginBinding {
    place(GantryPluginBinding::new(
        name,
        GantryPluginBindingSpec {
            plugin_ref: NamespacedRef::local(plugin),
            targets: BindingTargets {
                service_ref: Some(LocalRef {
                    name: service.to_string(),
                }),
                route_ref: None,
                consumer_ref: None,
                consumer_group_ref: None,
            },
            control_plane_ref: None,
            scope: BindingScope::OnlyTargets,
            tags: vec![],
            adopt: None,
        },
    ))
}

pub fn plugin_spec() -> GantryPluginSpec {
    GantryPluginSpec {
        plugin_name: "rate-limiting".to_string(),
        config: serde_json::json!({ "minute": 10 }),
        protocols: vec![],
        enabled: true,
    }
}
