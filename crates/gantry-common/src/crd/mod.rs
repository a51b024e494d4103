//! Custom Resource Definitions for gantry
//!
//! Remote-backed kinds share [`EntityStatus`]. The auth configuration,
//! plugin definition and reference grants are read by the engine but never
//! programmed remotely.

mod auth;
mod certificate;
mod consumer;
mod control_plane;
mod key;
mod plugin;
mod reference_grant;
mod service;
mod types;
mod upstream;

pub use auth::{
    GantryAuthConfiguration, GantryAuthConfigurationSpec, SecretKeyRef, TokenSource,
};
pub use certificate::{
    GantryCACertificate, GantryCACertificateSpec, GantryCertificate, GantryCertificateSpec,
    GantryDataPlaneCertificate, GantryDataPlaneCertificateSpec, GantrySni, GantrySniSpec,
};
pub use consumer::{
    GantryConsumer, GantryConsumerGroup, GantryConsumerGroupSpec, GantryConsumerSpec,
    GantryCredentialApiKey, GantryCredentialApiKeySpec, GantryCredentialBasicAuth,
    GantryCredentialBasicAuthSpec,
};
pub use control_plane::{
    ClusterType, GantryCloudNetwork, GantryCloudNetworkSpec, GantryControlPlane,
    GantryControlPlaneSpec,
};
pub use key::{
    GantryKey, GantryKeySet, GantryKeySetSpec, GantryKeySpec, GantryVault, GantryVaultSpec,
    PemKeyPair,
};
pub use plugin::{
    BindingScope, BindingTargets, GantryPlugin, GantryPluginBinding, GantryPluginBindingSpec,
    GantryPluginSpec,
};
pub use reference_grant::{
    GantryReferenceGrant, GantryReferenceGrantSpec, GrantFrom, GrantTo, ReferenceGrant,
    ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo,
};
pub use service::{GantryRoute, GantryRouteSpec, GantryService, GantryServiceSpec};
pub use types::{
    condition_types, find_condition, reasons, set_condition, AdoptMode, AdoptOptions, Condition,
    ConditionStatus, ControlPlaneRef, ControlPlaneRefType, ControlPlaneTarget, EntityStatus,
    LocalRef, NamespacedRef, RemoteRef,
};
pub use upstream::{GantryTarget, GantryTargetSpec, GantryUpstream, GantryUpstreamSpec};
