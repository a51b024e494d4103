//! The plugin annotation on bindable resources
//!
//! `gantry.dev/plugin: <name>` binds the plugin definition `<name>` from the
//! object's own namespace; `gantry.dev/plugin: <namespace>:<name>` binds one
//! from another namespace, subject to a reference grant.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use gantry_common::crd::GantryPlugin;
use gantry_common::{deterministic_hash, PLUGIN_ANNOTATION};

use crate::Error;

/// Resources that can carry the plugin annotation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindableKind {
    /// GantryService
    Service,
    /// GantryRoute
    Route,
    /// GantryConsumer
    Consumer,
    /// GantryConsumerGroup
    ConsumerGroup,
}

impl BindableKind {
    /// Kubernetes kind name
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service => "GantryService",
            Self::Route => "GantryRoute",
            Self::Consumer => "GantryConsumer",
            Self::ConsumerGroup => "GantryConsumerGroup",
        }
    }
}

/// Namespace and name of a plugin definition
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    /// Namespace of the GantryPlugin
    pub namespace: String,
    /// Name of the GantryPlugin
    pub name: String,
}

impl PluginKey {
    /// Key of an existing plugin definition
    pub fn of(plugin: &GantryPlugin) -> Result<Self, Error> {
        let namespace = plugin
            .namespace()
            .ok_or_else(|| Error::MissingNamespace(plugin.name_any()))?;
        Ok(Self {
            namespace,
            name: plugin.name_any(),
        })
    }

    /// Value of the plugin label on derived bindings
    ///
    /// Hashed because `namespace/name` is not a valid label value.
    pub fn label_value(&self) -> String {
        deterministic_hash(&self.to_string())
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Parse an annotation value, resolving a bare name against `default_namespace`
///
/// Returns `None` for empty, list-shaped or otherwise malformed values.
pub fn parse(value: &str, default_namespace: &str) -> Option<PluginKey> {
    let value = value.trim();
    if value.is_empty() || value.contains(',') || value.contains(char::is_whitespace) {
        return None;
    }
    let (namespace, name) = match value.split_once(':') {
        Some((namespace, name)) => (namespace, name),
        None => (default_namespace, value),
    };
    if namespace.is_empty() || name.is_empty() || name.contains(':') {
        return None;
    }
    Some(PluginKey {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}

/// Plugin the object's annotation names, if any
pub fn annotated_plugin(meta: &ObjectMeta) -> Option<PluginKey> {
    let value = meta.annotations.as_ref()?.get(PLUGIN_ANNOTATION)?;
    parse(value, meta.namespace.as_deref().unwrap_or_default())
}

/// Same as [`annotated_plugin`] for a typed resource
pub fn plugin_of<K: Resource>(obj: &K) -> Option<PluginKey> {
    annotated_plugin(obj.meta())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn key(namespace: &str, name: &str) -> PluginKey {
        PluginKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[rstest]
    #[case("rate-limit", Some(key("team-a", "rate-limit")))]
    #[case(" rate-limit ", Some(key("team-a", "rate-limit")))]
    #[case("platform:rate-limit", Some(key("platform", "rate-limit")))]
    #[case("", None)]
    #[case("a,b", None)]
    #[case("platform:", None)]
    #[case(":rate-limit", None)]
    #[case("a:b:c", None)]
    #[case("rate limit", None)]
    fn parses_annotation_values(#[case] value: &str, #[case] expected: Option<PluginKey>) {
        assert_eq!(parse(value, "team-a"), expected);
    }

    #[test]
    fn reads_annotation_from_metadata() {
        let mut meta = ObjectMeta {
            name: Some("orders".to_string()),
            namespace: Some("team-a".to_string()),
            ..Default::default()
        };
        assert_eq!(annotated_plugin(&meta), None);

        meta.annotations = Some(
            [(PLUGIN_ANNOTATION.to_string(), "cors".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(annotated_plugin(&meta), Some(key("team-a", "cors")));
    }

    #[test]
    fn label_value_is_stable_and_label_safe() {
        let value = key("platform", "rate-limit").label_value();
        assert_eq!(value, key("platform", "rate-limit").label_value());
        assert_ne!(value, key("team-a", "rate-limit").label_value());
        assert_eq!(value.len(), 16);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
