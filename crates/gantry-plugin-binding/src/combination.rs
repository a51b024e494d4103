//! Which bindings a set of annotated objects calls for
//!
//! Pure computation: the controller feeds it the objects that ask for one
//! plugin and gets back the exact target combinations to bind.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::ObjectReference;

use gantry_common::crd::{BindingTargets, LocalRef};

use crate::annotation::{BindableKind, PluginKey};

/// A bindable object carrying the plugin annotation
#[derive(Clone, Debug, PartialEq)]
pub struct Annotated {
    /// What the object is
    pub kind: BindableKind,
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
    /// For routes, the service they belong to
    pub service: Option<String>,
    /// Plugin the annotation names
    pub plugin: PluginKey,
    /// Whether the object is being deleted
    pub terminating: bool,
    /// Reference used for events on the object
    pub reference: ObjectReference,
}

/// One binding the annotations call for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredBinding {
    /// Namespace of the binding, shared with its targets
    pub namespace: String,
    /// Exact target combination
    pub targets: BindingTargets,
}

fn local(name: &str) -> Option<LocalRef> {
    Some(LocalRef {
        name: name.to_string(),
    })
}

/// Target combinations for `annotated`, grouped by namespace
///
/// Within a namespace, routes are joined with their service when that
/// service is annotated too; remaining services stand alone. Consumers and
/// consumer groups form the other side. With both sides present every
/// entity combination is crossed with every consumer one.
pub fn combinations(annotated: &[&Annotated]) -> Vec<DesiredBinding> {
    let mut by_namespace: BTreeMap<&str, Vec<&Annotated>> = BTreeMap::new();
    for obj in annotated {
        by_namespace.entry(&obj.namespace).or_default().push(obj);
    }

    let mut desired = Vec::new();
    for (namespace, objects) in by_namespace {
        let of_kind = |kind: BindableKind| -> BTreeSet<&str> {
            objects
                .iter()
                .filter(|o| o.kind == kind)
                .map(|o| o.name.as_str())
                .collect()
        };
        let services = of_kind(BindableKind::Service);

        let mut routes: Vec<&Annotated> = objects
            .iter()
            .copied()
            .filter(|o| o.kind == BindableKind::Route)
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        routes.dedup_by(|a, b| a.name == b.name);

        let mut joined = BTreeSet::new();
        let mut entity_side = Vec::new();
        for route in routes {
            let service = route
                .service
                .as_deref()
                .filter(|service| services.contains(service));
            if let Some(service) = service {
                joined.insert(service);
            }
            entity_side.push(BindingTargets {
                service_ref: service.and_then(local),
                route_ref: local(&route.name),
                ..Default::default()
            });
        }
        entity_side.extend(
            services
                .iter()
                .filter(|service| !joined.contains(*service))
                .map(|service| BindingTargets {
                    service_ref: local(service),
                    ..Default::default()
                }),
        );

        let consumer_side: Vec<BindingTargets> = of_kind(BindableKind::Consumer)
            .into_iter()
            .map(|consumer| BindingTargets {
                consumer_ref: local(consumer),
                ..Default::default()
            })
            .chain(
                of_kind(BindableKind::ConsumerGroup)
                    .into_iter()
                    .map(|group| BindingTargets {
                        consumer_group_ref: local(group),
                        ..Default::default()
                    }),
            )
            .collect();

        let targets: Vec<BindingTargets> = match (entity_side.is_empty(), consumer_side.is_empty()) {
            (false, false) => entity_side
                .iter()
                .flat_map(|entity| {
                    consumer_side.iter().map(move |consumer| BindingTargets {
                        service_ref: entity.service_ref.clone(),
                        route_ref: entity.route_ref.clone(),
                        consumer_ref: consumer.consumer_ref.clone(),
                        consumer_group_ref: consumer.consumer_group_ref.clone(),
                    })
                })
                .collect(),
            (false, true) => entity_side,
            _ => consumer_side,
        };
        desired.extend(targets.into_iter().map(|targets| DesiredBinding {
            namespace: namespace.to_string(),
            targets,
        }));
    }
    desired
}
