//! Derived plugin bindings for gantry
//!
//! Services, routes, consumers and consumer groups annotated with
//! `gantry.dev/plugin` get one GantryPluginBinding per exact target
//! combination. The bindings are labelled, owned by the manager and
//! deleted once no annotation asks for them; the plugin definition keeps
//! an in-use finalizer while any exist.

#![deny(missing_docs)]

pub mod annotation;
pub mod combination;
pub mod controller;
pub mod error;
pub mod index;
pub mod store;

#[cfg(test)]
mod testing;

pub use annotation::{BindableKind, PluginKey};
pub use controller::{error_policy, plugin_binding_controller, reconcile, PluginBindingContext};
pub use error::Error;
pub use index::AnnotationIndex;
pub use store::{BindingStore, KubeBindingStore};

/// Value of the managed-by label on derived bindings
pub const MANAGER_NAME: &str = "plugin-binding-manager";
