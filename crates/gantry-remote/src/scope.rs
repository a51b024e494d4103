//! Addressing scope of a remote call

use std::collections::BTreeMap;

/// Where an entity lives remotely: organization, control plane, nested parent
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RemoteScope {
    /// Control plane id, for control-plane scoped kinds
    pub control_plane_id: Option<String>,
    /// Remote ids of nested parents keyed by role (see [`crate::kind`])
    pub parents: BTreeMap<String, String>,
}

impl RemoteScope {
    /// Organization-level scope
    pub fn organization() -> Self {
        Self::default()
    }

    /// Scope inside one control plane
    pub fn control_plane(id: impl Into<String>) -> Self {
        Self {
            control_plane_id: Some(id.into()),
            parents: BTreeMap::new(),
        }
    }

    /// Add a nested parent id
    pub fn with_parent(mut self, role: impl Into<String>, id: impl Into<String>) -> Self {
        self.parents.insert(role.into(), id.into());
        self
    }

    /// Remote id of a nested parent
    pub fn parent(&self, role: &str) -> Option<&str> {
        self.parents.get(role).map(String::as_str)
    }
}
