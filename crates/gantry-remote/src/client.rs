//! The remote client contract and client construction
//!
//! The engine only talks to the remote service through [`RemoteApi`].
//! Clients are obtained per credentials from a [`RemoteClientFactory`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use crate::http::HttpRemote;
use crate::{EntityKind, RemoteError, RemoteScope};

/// Operations the engine needs from the remote service
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create an entity and return its remote id
    async fn create(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        payload: Value,
    ) -> Result<String, RemoteError>;

    /// Overwrite the entity with `id` with the full payload
    async fn upsert(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
        payload: Value,
    ) -> Result<(), RemoteError>;

    /// Delete the entity with `id`; a missing entity counts as deleted
    async fn delete(&self, kind: EntityKind, scope: &RemoteScope, id: &str)
        -> Result<(), RemoteError>;

    /// Ids of entities of `kind` in `scope` carrying `tag`
    async fn list_by_tag(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        tag: &str,
    ) -> Result<Vec<String>, RemoteError>;

    /// Fetch one entity; `None` when it does not exist
    async fn get(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
    ) -> Result<Option<Value>, RemoteError>;

    /// Ids of the consumer groups `consumer_id` belongs to.
    async fn consumer_groups_of(
        &self,
        scope: &RemoteScope,
        consumer_id: &str,
    ) -> Result<Vec<String>, RemoteError>;

    /// Add a consumer to a group. An existing membership counts as added.
    async fn add_consumer_to_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError>;

    /// Remove a consumer from a group; a missing membership counts as removed
    async fn remove_consumer_from_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError>;
}

/// Credentials identifying one remote client
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteAuth {
    /// Base URL of the remote API
    pub server_url: String,
    /// Bearer token
    pub token: String,
}

/// Hands out a client per set of credentials
pub trait RemoteClientFactory: Send + Sync {
    /// Client for the given credentials
    fn client_for(&self, auth: &RemoteAuth) -> Result<Arc<dyn RemoteApi>, RemoteError>;
}

/// Builds reqwest-backed clients, caching one per credentials
///
/// The cache only saves connection setup; it holds no remote state.
pub struct HttpClientFactory {
    timeout: Duration,
    clients: DashMap<RemoteAuth, Arc<HttpRemote>>,
}

impl HttpClientFactory {
    /// Create a factory whose clients time out requests after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: DashMap::new(),
        }
    }
}

impl RemoteClientFactory for HttpClientFactory {
    fn client_for(&self, auth: &RemoteAuth) -> Result<Arc<dyn RemoteApi>, RemoteError> {
        if let Some(client) = self.clients.get(auth) {
            return Ok(client.clone());
        }
        let client = Arc::new(HttpRemote::new(auth, self.timeout)?);
        self.clients.insert(auth.clone(), client.clone());
        Ok(client)
    }
}

/// Returns the same client for every credential set
///
/// Used with [`crate::InMemoryRemote`] for tests and offline runs.
pub struct StaticClientFactory {
    client: Arc<dyn RemoteApi>,
}

impl StaticClientFactory {
    /// Wrap a client
    pub fn new(client: Arc<dyn RemoteApi>) -> Self {
        Self { client }
    }
}

impl RemoteClientFactory for StaticClientFactory {
    fn client_for(&self, _auth: &RemoteAuth) -> Result<Arc<dyn RemoteApi>, RemoteError> {
        Ok(self.client.clone())
    }
}
