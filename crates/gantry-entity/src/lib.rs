//! Generic reconciliation engine for remote-backed gantry resources
//!
//! One reconcile loop ([`reconcile`]) drives every kind. Kinds plug in
//! through [`ManagedEntity`], implemented in [`adapters`].

#![deny(missing_docs)]

pub mod adapter;
pub mod adapters;
pub mod adoption;
pub mod conflict;
pub mod controller;
pub mod error;
pub mod parents;
pub mod reconciler;
pub mod resolve;
pub mod status;
pub mod store;
pub mod tags;

#[cfg(test)]
mod testing;

pub use adapter::{ManagedEntity, ParentRef, ParentRole, ResolvedParents};
pub use controller::{entity_controller, WatchSettings, WATCH_TIMEOUT_SECS};
pub use error::ReconcileError;
pub use parents::{KubeParentLookup, ParentLookup};
#[cfg(any(test, feature = "mock"))]
pub use parents::MockParentLookup;
pub use reconciler::{
    error_policy, reconcile, reconcile_entity, EngineSettings, EntityContext, PassOutcome,
};
pub use store::{EntityStore, KubeEntityStore};
pub use tags::uniqueness_tag;
