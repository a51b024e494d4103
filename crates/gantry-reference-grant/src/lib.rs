//! Derived reference grants for gantry
//!
//! Users author Gateway API `ReferenceGrant`s. The engine only trusts the
//! narrow `GantryReferenceGrant`s derived from them, one per permitted
//! `{from kind, namespace} -> {to kind, name}` edge.

#![deny(missing_docs)]

pub mod controller;
pub mod derive;
pub mod error;
pub mod store;

#[cfg(test)]
mod testing;

pub use controller::{
    error_policy, orphan_controller, reconcile, reconcile_derived, reference_grant_controller,
    GrantContext,
};
pub use error::Error;
pub use store::{GrantStore, KubeGrantStore};

/// Label on derived grants carrying the hashed name of their source grant
pub const SOURCE_LABEL: &str = "gantry.dev/reference-grant";
