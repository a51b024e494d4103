//! Narrow grants implied by an authored ReferenceGrant

use std::collections::{BTreeMap, BTreeSet};

use kube::{Resource, ResourceExt};

use gantry_common::crd::{
    GantryReferenceGrant, GantryReferenceGrantSpec, GrantFrom, GrantTo, ReferenceGrant,
};
use gantry_common::kube_utils::derived_name;
use gantry_common::{deterministic_hash, GANTRY_GROUP};

use crate::{Error, SOURCE_LABEL};

/// Kinds whose plugin annotation is served by a derived GantryPluginBinding
const BINDABLE_KINDS: [&str; 4] = [
    "GantryService",
    "GantryRoute",
    "GantryConsumer",
    "GantryConsumerGroup",
];
const PLUGIN_KIND: &str = "GantryPlugin";
const PLUGIN_BINDING_KIND: &str = "GantryPluginBinding";

/// Every `{from} -> {to}` edge the authored grant permits for gantry kinds
///
/// Entries of other API groups are ignored. Permission for a bindable kind
/// to reach a plugin also covers the binding derived on its behalf.
pub fn derive_specs(authored: &ReferenceGrant) -> BTreeSet<GantryReferenceGrantSpec> {
    let from: Vec<_> = authored
        .spec
        .from
        .iter()
        .filter(|f| f.group == GANTRY_GROUP)
        .collect();
    let to: Vec<_> = authored
        .spec
        .to
        .iter()
        .filter(|t| t.group == GANTRY_GROUP)
        .collect();

    let mut specs = BTreeSet::new();
    for f in &from {
        for t in &to {
            let target = GrantTo {
                kind: t.kind.clone(),
                name: t.name.clone(),
            };
            specs.insert(GantryReferenceGrantSpec {
                from: GrantFrom {
                    kind: f.kind.clone(),
                    namespace: f.namespace.clone(),
                },
                to: target.clone(),
            });
            if t.kind == PLUGIN_KIND && BINDABLE_KINDS.contains(&f.kind.as_str()) {
                specs.insert(GantryReferenceGrantSpec {
                    from: GrantFrom {
                        kind: PLUGIN_BINDING_KIND.to_string(),
                        namespace: f.namespace.clone(),
                    },
                    to: target,
                });
            }
        }
    }
    specs
}

/// Label value identifying derived grants of the authored grant `name`
pub fn source_label_value(name: &str) -> String {
    deterministic_hash(name)
}

/// Derived grant object for one edge, living next to the authored grant.
///
/// The object is owned by the authored grant and labelled with its name
/// hash, so both garbage collection and orphan sweeps can find it.
pub fn derived_grant(
    authored: &ReferenceGrant,
    spec: GantryReferenceGrantSpec,
) -> Result<GantryReferenceGrant, Error> {
    let namespace = authored
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(authored.name_any()))?;
    let source = authored.name_any();
    let name = derived_name(
        &source,
        &[
            &spec.from.kind,
            &spec.from.namespace,
            &spec.to.kind,
            spec.to.name.as_deref().unwrap_or("*"),
        ],
    );
    let mut grant = GantryReferenceGrant::new(&name, spec);
    let meta = grant.meta_mut();
    meta.namespace = Some(namespace);
    meta.labels = Some(BTreeMap::from([(
        SOURCE_LABEL.to_string(),
        source_label_value(&source),
    )]));
    meta.owner_references = authored.controller_owner_ref(&()).map(|owner| vec![owner]);
    Ok(grant)
}
