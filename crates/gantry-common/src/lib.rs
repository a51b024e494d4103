//! Common types for gantry: CRDs, errors, and Kubernetes utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod grants;
pub mod kube_utils;
pub mod metrics;
pub mod retry;
pub mod telemetry;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use grants::{GrantLookup, GrantRequest, KubeGrantLookup};
#[cfg(any(test, feature = "mock"))]
pub use grants::MockGrantLookup;
#[cfg(any(test, feature = "mock"))]
pub use events::MockEventPublisher;
pub use kube_utils::deterministic_hash;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every gantry custom resource
pub const GANTRY_GROUP: &str = "gantry.dev";

/// Field manager used for every server-side write made by gantry controllers
pub const FIELD_MANAGER: &str = "gantry-operator";

/// Finalizer guarding remote cleanup of a remote-backed entity
pub const REMOTE_CLEANUP_FINALIZER: &str = "gantry.dev/remote-cleanup";

/// Finalizer kept on a plugin definition while derived bindings reference it
pub const PLUGIN_IN_USE_FINALIZER: &str = "gantry.dev/plugin-in-use";

/// Annotation on bindable kinds naming the plugin definition to bind
pub const PLUGIN_ANNOTATION: &str = "gantry.dev/plugin";

/// Label identifying the component that created a derived object
pub const MANAGED_BY_LABEL: &str = "gantry.dev/managed-by";
