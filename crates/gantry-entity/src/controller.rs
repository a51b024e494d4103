//! Controller wiring for entity kinds
//!
//! Every kind is reconciled by the same loop; what differs is which other
//! objects can unblock it. A kind is re-queued when its control plane, its
//! auth configuration, any parent it declares or its plugin definition
//! changes. Dependents are found in the controller's own reflector cache.

use std::fmt::Debug;
use std::sync::Arc;

use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use gantry_common::crd::{
    GantryAuthConfiguration, GantryCertificate, GantryConsumer, GantryConsumerGroup,
    GantryControlPlane, GantryKeySet, GantryPlugin, GantryRoute, GantryService, GantryUpstream,
};
use gantry_remote::EntityKind;

use crate::adapter::{ManagedEntity, ParentRole};

/// Default watcher timeout (seconds); must stay below the client read
/// timeout (30s) so the API server closes idle watches first.
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Watch settings shared by a kind's controller and its related watches
#[derive(Clone, Copy, Debug)]
pub struct WatchSettings {
    /// Server-side watch timeout (seconds)
    pub timeout_secs: u32,
    /// Concurrent reconciles
    pub concurrency: u16,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: WATCH_TIMEOUT_SECS,
            concurrency: 4,
        }
    }
}

struct Wiring<'a, E: ManagedEntity> {
    client: &'a Client,
    store: Store<E>,
    timeout_secs: u32,
}

impl<E: ManagedEntity> Wiring<'_, E> {
    fn watch<P>(&self, controller: Controller<E>) -> Controller<E>
    where
        P: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        watch_referenced::<E, P>(controller, self.client, self.store.clone(), self.timeout_secs)
    }
}

/// Controller for `E`, also triggered by changes to what `E` references
///
/// The caller attaches the shutdown trigger and runs it with
/// [`crate::reconcile`] and [`crate::error_policy`].
pub fn entity_controller<E: ManagedEntity>(client: Client, settings: WatchSettings) -> Controller<E> {
    let mut controller = Controller::new(
        Api::<E>::all(client.clone()),
        WatcherConfig::default().timeout(settings.timeout_secs),
    )
    .with_config(ControllerConfig::default().concurrency(settings.concurrency));
    let wiring = Wiring {
        client: &client,
        store: controller.store(),
        timeout_secs: settings.timeout_secs,
    };

    if E::REMOTE_KIND.is_control_plane_scoped() {
        controller = wiring.watch::<GantryControlPlane>(controller);
    }
    controller = wiring.watch::<GantryAuthConfiguration>(controller);
    for role in E::PARENT_ROLES {
        controller = match role {
            ParentRole::Service => wiring.watch::<GantryService>(controller),
            ParentRole::Route => wiring.watch::<GantryRoute>(controller),
            ParentRole::Consumer => wiring.watch::<GantryConsumer>(controller),
            ParentRole::ConsumerGroup => wiring.watch::<GantryConsumerGroup>(controller),
            ParentRole::Upstream => wiring.watch::<GantryUpstream>(controller),
            ParentRole::Certificate => wiring.watch::<GantryCertificate>(controller),
            ParentRole::KeySet => wiring.watch::<GantryKeySet>(controller),
        };
    }
    if E::REMOTE_KIND == EntityKind::Plugin {
        controller = wiring.watch::<GantryPlugin>(controller);
    }
    controller
}

fn watch_referenced<E, P>(
    controller: Controller<E>,
    client: &Client,
    store: Store<E>,
    timeout_secs: u32,
) -> Controller<E>
where
    E: ManagedEntity,
    P: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    let kind = P::kind(&()).to_string();
    controller.watches(
        Api::<P>::all(client.clone()),
        WatcherConfig::default().timeout(timeout_secs),
        move |referenced: P| {
            let namespace = referenced.namespace().unwrap_or_default();
            let name = referenced.name_any();
            let affected = dependents(&store.state(), &kind, &namespace, &name);
            if !affected.is_empty() {
                debug!(
                    %kind,
                    %namespace,
                    %name,
                    affected = affected.len(),
                    "re-queueing dependents"
                );
            }
            affected
        },
    )
}

/// Objects among `objects` that reference `kind` `namespace/name`
pub fn dependents<E: ManagedEntity>(
    objects: &[Arc<E>],
    kind: &str,
    namespace: &str,
    name: &str,
) -> Vec<ObjectRef<E>> {
    objects
        .iter()
        .filter(|obj| obj.references(kind, namespace, name))
        .map(|obj| ObjectRef::from_obj(obj.as_ref()))
        .collect()
}
