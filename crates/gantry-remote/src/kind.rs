//! Remote entity kinds and their REST collections

use crate::{RemoteError, RemoteScope};

/// How a kind stores the uniqueness tag remotely
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagStyle {
    /// `tags` string array, filtered with `?tags=`
    Tags,
    /// `labels` map, filtered with `filter[labels][eq]=key:value`
    Labels,
    /// No tag support
    Unsupported,
}

/// Scope key of the nested upstream parent
pub const PARENT_UPSTREAM: &str = "upstream";
/// Scope key of the nested certificate parent
pub const PARENT_CERTIFICATE: &str = "certificate";
/// Scope key of the nested consumer parent
pub const PARENT_CONSUMER: &str = "consumer";

/// Every kind of remote entity the engine manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// Control plane (organization scope)
    ControlPlane,
    /// Cloud gateway network (organization scope)
    CloudNetwork,
    /// Gateway service
    Service,
    /// Route
    Route,
    /// Consumer
    Consumer,
    /// Consumer group
    ConsumerGroup,
    /// Basic-auth credential, nested under a consumer
    BasicAuth,
    /// API-key credential, nested under a consumer
    ApiKey,
    /// Plugin instance
    Plugin,
    /// Upstream
    Upstream,
    /// Upstream target, nested under an upstream
    Target,
    /// Certificate
    Certificate,
    /// CA certificate
    CaCertificate,
    /// SNI, nested under a certificate
    Sni,
    /// Key
    Key,
    /// Key set
    KeySet,
    /// Vault
    Vault,
    /// Data plane client certificate
    DataPlaneCertificate,
}

impl EntityKind {
    /// Every kind, in a stable order
    pub const ALL: [EntityKind; 18] = [
        Self::ControlPlane,
        Self::CloudNetwork,
        Self::Service,
        Self::Route,
        Self::Consumer,
        Self::ConsumerGroup,
        Self::BasicAuth,
        Self::ApiKey,
        Self::Plugin,
        Self::Upstream,
        Self::Target,
        Self::Certificate,
        Self::CaCertificate,
        Self::Sni,
        Self::Key,
        Self::KeySet,
        Self::Vault,
        Self::DataPlaneCertificate,
    ];

    /// Short name for logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ControlPlane => "control_plane",
            Self::CloudNetwork => "cloud_network",
            Self::Service => "service",
            Self::Route => "route",
            Self::Consumer => "consumer",
            Self::ConsumerGroup => "consumer_group",
            Self::BasicAuth => "basic_auth",
            Self::ApiKey => "api_key",
            Self::Plugin => "plugin",
            Self::Upstream => "upstream",
            Self::Target => "target",
            Self::Certificate => "certificate",
            Self::CaCertificate => "ca_certificate",
            Self::Sni => "sni",
            Self::Key => "key",
            Self::KeySet => "key_set",
            Self::Vault => "vault",
            Self::DataPlaneCertificate => "dp_certificate",
        }
    }

    /// Where the uniqueness tag lives on this kind
    pub fn tag_style(&self) -> TagStyle {
        match self {
            Self::ControlPlane | Self::CloudNetwork => TagStyle::Labels,
            Self::DataPlaneCertificate => TagStyle::Unsupported,
            _ => TagStyle::Tags,
        }
    }

    /// Whether entities of this kind live inside a control plane
    pub fn is_control_plane_scoped(&self) -> bool {
        !matches!(self, Self::ControlPlane | Self::CloudNetwork)
    }

    /// Scope key of the nested parent, for kinds addressed under another entity
    pub fn nested_parent(&self) -> Option<&'static str> {
        match self {
            Self::Target => Some(PARENT_UPSTREAM),
            Self::Sni => Some(PARENT_CERTIFICATE),
            Self::BasicAuth | Self::ApiKey => Some(PARENT_CONSUMER),
            _ => None,
        }
    }

    /// Collection path of this kind within `scope`
    pub fn collection_path(&self, scope: &RemoteScope) -> Result<String, RemoteError> {
        let core = |collection: &str| -> Result<String, RemoteError> {
            Ok(format!(
                "/v2/control-planes/{}/core-entities/{collection}",
                self.control_plane(scope)?
            ))
        };
        match self {
            Self::ControlPlane => Ok("/v2/control-planes".to_string()),
            Self::CloudNetwork => Ok("/v2/cloud-gateways/networks".to_string()),
            Self::Service => core("services"),
            Self::Route => core("routes"),
            Self::Consumer => core("consumers"),
            Self::ConsumerGroup => core("consumer_groups"),
            Self::Plugin => core("plugins"),
            Self::Upstream => core("upstreams"),
            Self::Certificate => core("certificates"),
            Self::CaCertificate => core("ca_certificates"),
            Self::Key => core("keys"),
            Self::KeySet => core("key-sets"),
            Self::Vault => core("vaults"),
            Self::Target => core(&format!("upstreams/{}/targets", self.parent(scope)?)),
            Self::Sni => core(&format!("certificates/{}/snis", self.parent(scope)?)),
            Self::BasicAuth => core(&format!("consumers/{}/basic-auth", self.parent(scope)?)),
            Self::ApiKey => core(&format!("consumers/{}/key-auth", self.parent(scope)?)),
            Self::DataPlaneCertificate => Ok(format!(
                "/v2/control-planes/{}/dp-client-certificates",
                self.control_plane(scope)?
            )),
        }
    }

    /// Path of one entity within `scope`
    pub fn entity_path(&self, scope: &RemoteScope, id: &str) -> Result<String, RemoteError> {
        Ok(format!("{}/{id}", self.collection_path(scope)?))
    }

    fn control_plane<'a>(&self, scope: &'a RemoteScope) -> Result<&'a str, RemoteError> {
        scope.control_plane_id.as_deref().ok_or_else(|| {
            RemoteError::terminal(format!("{} requires a control plane id", self.as_str()))
        })
    }

    fn parent<'a>(&self, scope: &'a RemoteScope) -> Result<&'a str, RemoteError> {
        let key = self.nested_parent().unwrap_or_default();
        scope.parent(key).ok_or_else(|| {
            RemoteError::terminal(format!("{} requires a {key} id", self.as_str()))
        })
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
