//! Plugin CRDs: GantryPlugin (definition) and GantryPluginBinding

use kube::CustomResource;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{AdoptOptions, ControlPlaneRef, EntityStatus, LocalRef, NamespacedRef};

/// Schema for free-form configuration objects
pub(crate) fn preserve_unknown_fields(_: &mut schemars::gen::SchemaGenerator) -> Schema {
    let mut schema = SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

fn default_true() -> bool {
    true
}

/// Spec for a GantryPlugin
///
/// A plugin definition is not programmed by itself; bindings attach it to
/// services, routes, consumers and consumer groups.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryPlugin",
    plural = "gantryplugins",
    shortname = "gplug",
    namespaced,
    printcolumn = r#"{"name":"Plugin","type":"string","jsonPath":".spec.pluginName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryPluginSpec {
    /// Name of the gateway plugin (e.g. `rate-limiting`)
    pub plugin_name: String,

    /// Plugin configuration
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: serde_json::Value,

    /// Protocols the plugin runs on
    #[serde(default)]
    pub protocols: Vec<String>,

    /// Whether the plugin is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Entities a binding attaches its plugin to
///
/// All references are local to the binding's namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct BindingTargets {
    /// Service target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<LocalRef>,
    /// Route target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_ref: Option<LocalRef>,
    /// Consumer target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<LocalRef>,
    /// Consumer group target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group_ref: Option<LocalRef>,
}

impl BindingTargets {
    /// Whether no target is set
    pub fn is_empty(&self) -> bool {
        self.service_ref.is_none()
            && self.route_ref.is_none()
            && self.consumer_ref.is_none()
            && self.consumer_group_ref.is_none()
    }

    /// Canonical `kind=name` pairs of the set targets, in fixed order
    pub fn key(&self) -> String {
        [
            ("service", &self.service_ref),
            ("route", &self.route_ref),
            ("consumer", &self.consumer_ref),
            ("consumergroup", &self.consumer_group_ref),
        ]
        .iter()
        .filter_map(|(kind, r)| r.as_ref().map(|r| format!("{kind}={}", r.name)))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Where a binding applies
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BindingScope {
    /// Only the listed targets
    #[default]
    OnlyTargets,
    /// Every request in the control plane (requires no targets)
    GlobalInControlPlane,
}

/// Spec for a GantryPluginBinding
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gantry.dev",
    version = "v1alpha1",
    kind = "GantryPluginBinding",
    plural = "gantrypluginbindings",
    shortname = "gpb",
    namespaced,
    status = "EntityStatus",
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type==\"Programmed\")].status"}"#,
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.remote.id"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GantryPluginBindingSpec {
    /// Plugin definition to bind
    pub plugin_ref: NamespacedRef,

    /// Entities the plugin applies to
    #[serde(default)]
    pub targets: BindingTargets,

    /// Control plane, required for global bindings; otherwise inherited from targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_ref: Option<ControlPlaneRef>,

    /// Scope of the binding
    #[serde(default)]
    pub scope: BindingScope,

    /// Extra remote tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// Adopt an existing plugin instance instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopt: Option<AdoptOptions>,
}

impl GantryPluginBindingSpec {
    /// Check the scope against the targets
    pub fn validate(&self) -> crate::Result<()> {
        match (self.scope, self.targets.is_empty()) {
            (BindingScope::OnlyTargets, true) => Err(crate::Error::validation(
                "scope OnlyTargets requires at least one target",
            )),
            (BindingScope::GlobalInControlPlane, false) => Err(crate::Error::validation(
                "scope GlobalInControlPlane does not accept targets",
            )),
            (BindingScope::GlobalInControlPlane, true) if self.control_plane_ref.is_none() => Err(
                crate::Error::validation("scope GlobalInControlPlane requires controlPlaneRef"),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(service: Option<&str>, route: Option<&str>, consumer: Option<&str>) -> BindingTargets {
        let local = |n: &str| LocalRef {
            name: n.to_string(),
        };
        BindingTargets {
            service_ref: service.map(local),
            route_ref: route.map(local),
            consumer_ref: consumer.map(local),
            consumer_group_ref: None,
        }
    }

    #[test]
    fn target_key_is_canonical() {
        assert_eq!(
            targets(Some("svc"), Some("rt"), None).key(),
            "service=svc,route=rt"
        );
        assert_eq!(targets(None, None, Some("c")).key(), "consumer=c");
        assert_eq!(targets(None, None, None).key(), "");
    }

    #[test]
    fn scope_and_targets_must_agree() {
        let mut spec = GantryPluginBindingSpec {
            plugin_ref: NamespacedRef::local("rate-limit"),
            targets: BindingTargets::default(),
            control_plane_ref: None,
            scope: BindingScope::OnlyTargets,
            tags: vec![],
            adopt: None,
        };
        assert!(spec.validate().is_err());

        spec.targets = targets(Some("svc"), None, None);
        assert!(spec.validate().is_ok());

        spec.scope = BindingScope::GlobalInControlPlane;
        assert!(spec.validate().is_err());

        spec.targets = BindingTargets::default();
        assert!(spec.validate().is_err());
        spec.control_plane_ref = Some(ControlPlaneRef::named("cp"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn config_schema_preserves_unknown_fields() {
        let crd = serde_json::to_value(<GantryPlugin as kube::CustomResourceExt>::crd()).unwrap();
        let config = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
            ["properties"]["config"];
        assert_eq!(config["x-kubernetes-preserve-unknown-fields"], true);
    }
}
