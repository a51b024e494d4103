//! Cross-namespace reference permission checks
//!
//! A reference from one namespace to an object in another is followed only
//! when a [`GantryReferenceGrant`] in the target namespace permits the exact
//! `{from kind, from namespace} -> {to kind, to name}` edge.

use async_trait::async_trait;
use kube::api::ListParams;
use kube::{Api, Client};

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::crd::GantryReferenceGrant;
use crate::Error;

/// One reference edge to check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantRequest {
    /// Kind of the referring object
    pub from_kind: String,
    /// Namespace of the referring object
    pub from_namespace: String,
    /// Kind of the referenced object
    pub to_kind: String,
    /// Namespace of the referenced object
    pub to_namespace: String,
    /// Name of the referenced object
    pub to_name: String,
}

impl GrantRequest {
    /// Build a request for one reference edge
    pub fn new(
        from_kind: &str,
        from_namespace: &str,
        to_kind: &str,
        to_namespace: &str,
        to_name: &str,
    ) -> Self {
        Self {
            from_kind: from_kind.to_string(),
            from_namespace: from_namespace.to_string(),
            to_kind: to_kind.to_string(),
            to_namespace: to_namespace.to_string(),
            to_name: to_name.to_string(),
        }
    }

    /// Same-namespace references never need a grant
    pub fn is_cross_namespace(&self) -> bool {
        self.from_namespace != self.to_namespace
    }
}

/// Answers whether a reference edge is permitted
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait GrantLookup: Send + Sync {
    /// Whether the edge is permitted
    async fn permits(&self, request: &GrantRequest) -> Result<bool, Error>;
}

/// Grant lookup backed by the Kubernetes API
pub struct KubeGrantLookup {
    client: Client,
}

impl KubeGrantLookup {
    /// Create a lookup using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GrantLookup for KubeGrantLookup {
    async fn permits(&self, request: &GrantRequest) -> Result<bool, Error> {
        if !request.is_cross_namespace() {
            return Ok(true);
        }
        let api: Api<GantryReferenceGrant> =
            Api::namespaced(self.client.clone(), &request.to_namespace);
        let grants = api.list(&ListParams::default()).await?;
        Ok(grants.items.iter().any(|g| {
            g.spec.permits(
                &request.from_kind,
                &request.from_namespace,
                &request.to_kind,
                &request.to_name,
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_namespace_is_not_cross_namespace() {
        let request = GrantRequest::new("GantryService", "team-a", "GantryControlPlane", "team-a", "cp");
        assert!(!request.is_cross_namespace());
        assert!(GrantRequest {
            to_namespace: "platform".to_string(),
            ..request
        }
        .is_cross_namespace());
    }

    #[tokio::test]
    async fn mocked_lookup_denies() {
        let mut mock = MockGrantLookup::new();
        mock.expect_permits().returning(|_| Ok(false));
        let request =
            GrantRequest::new("GantryService", "team-a", "GantryControlPlane", "platform", "cp");
        assert!(!mock.permits(&request).await.unwrap());
    }
}
