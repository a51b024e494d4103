//! reqwest-backed [`RemoteApi`] implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{EntityKind, RemoteApi, RemoteAuth, RemoteError, RemoteScope, TagStyle};

/// Page size used for tag lookups
const LIST_PAGE_SIZE: &str = "100";

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Created>,
}

/// Client for one `{server URL, token}` pair
pub struct HttpRemote {
    base: Url,
    token: String,
    http: reqwest::Client,
}

impl HttpRemote {
    /// Build a client with a per-request timeout
    pub fn new(auth: &RemoteAuth, timeout: Duration) -> Result<Self, RemoteError> {
        let base = Url::parse(&auth.server_url)
            .map_err(|e| RemoteError::terminal(format!("invalid server URL {}: {e}", auth.server_url)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gantry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::terminal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base,
            token: auth.token.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|e| RemoteError::terminal(format!("invalid path {path}: {e}")))
    }

    async fn send(
        &self,
        kind: EntityKind,
        id: Option<&str>,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, RemoteError> {
        debug!(%kind, %method, %url, "remote request");
        let mut request = self.http.request(method, url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(kind.as_str(), id, status, &body, retry_after))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::transient(format!("request timed out: {e}"))
    } else {
        RemoteError::transient(format!("transport error: {e}"))
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn create(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        payload: Value,
    ) -> Result<String, RemoteError> {
        let url = self.url(&kind.collection_path(scope)?)?;
        let response = self.send(kind, None, Method::POST, url, Some(&payload)).await?;
        let created: Created = response
            .json()
            .await
            .map_err(|e| RemoteError::transient(format!("unreadable create response: {e}")))?;
        Ok(created.id)
    }

    async fn upsert(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
        payload: Value,
    ) -> Result<(), RemoteError> {
        let url = self.url(&kind.entity_path(scope, id)?)?;
        // Organization-level kinds only support partial updates.
        let method = if kind.is_control_plane_scoped() {
            Method::PUT
        } else {
            Method::PATCH
        };
        self.send(kind, Some(id), method, url, Some(&payload)).await?;
        Ok(())
    }

    async fn delete(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
    ) -> Result<(), RemoteError> {
        let url = self.url(&kind.entity_path(scope, id)?)?;
        match self.send(kind, Some(id), Method::DELETE, url, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_by_tag(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        tag: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut url = self.url(&kind.collection_path(scope)?)?;
        match kind.tag_style() {
            TagStyle::Tags => {
                url.query_pairs_mut()
                    .append_pair("tags", tag)
                    .append_pair("size", LIST_PAGE_SIZE);
            }
            TagStyle::Labels => {
                url.query_pairs_mut()
                    .append_pair("filter[labels][eq]", tag)
                    .append_pair("page[size]", LIST_PAGE_SIZE);
            }
            TagStyle::Unsupported => {
                return Err(RemoteError::terminal(format!(
                    "{kind} does not support tag lookups"
                )))
            }
        }
        let response = self.send(kind, None, Method::GET, url, None).await?;
        let page: Page = response
            .json()
            .await
            .map_err(|e| RemoteError::transient(format!("unreadable list response: {e}")))?;
        Ok(page.data.into_iter().map(|e| e.id).collect())
    }

    async fn get(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
    ) -> Result<Option<Value>, RemoteError> {
        let url = self.url(&kind.entity_path(scope, id)?)?;
        match self.send(kind, Some(id), Method::GET, url, None).await {
            Ok(response) => {
                let value = response
                    .json()
                    .await
                    .map_err(|e| RemoteError::transient(format!("unreadable get response: {e}")))?;
                Ok(Some(value))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn consumer_groups_of(
        &self,
        scope: &RemoteScope,
        consumer_id: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let kind = EntityKind::Consumer;
        let mut url = self.url(&format!(
            "{}/consumer_groups",
            kind.entity_path(scope, consumer_id)?
        ))?;
        url.query_pairs_mut().append_pair("size", LIST_PAGE_SIZE);
        let response = self
            .send(kind, Some(consumer_id), Method::GET, url, None)
            .await?;
        let page: Page = response
            .json()
            .await
            .map_err(|e| RemoteError::transient(format!("unreadable list response: {e}")))?;
        Ok(page.data.into_iter().map(|e| e.id).collect())
    }

    async fn add_consumer_to_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError> {
        let kind = EntityKind::ConsumerGroup;
        let url = self.url(&members_path(scope, group_id)?)?;
        let body = serde_json::json!({ "consumer": consumer_id });
        match self.send(kind, Some(group_id), Method::POST, url, Some(&body)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn remove_consumer_from_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError> {
        let kind = EntityKind::ConsumerGroup;
        let url = self.url(&format!("{}/{consumer_id}", members_path(scope, group_id)?))?;
        match self.send(kind, Some(group_id), Method::DELETE, url, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Consumers collection of one consumer group
fn members_path(scope: &RemoteScope, group_id: &str) -> Result<String, RemoteError> {
    Ok(format!(
        "{}/consumers",
        EntityKind::ConsumerGroup.entity_path(scope, group_id)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpRemote {
        HttpRemote::new(
            &RemoteAuth {
                server_url: "https://us.api.example.test".to_string(),
                token: "token".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn urls_join_onto_base() {
        let url = client()
            .url(
                &EntityKind::Service
                    .entity_path(&RemoteScope::control_plane("cp-1"), "svc-1")
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://us.api.example.test/v2/control-planes/cp-1/core-entities/services/svc-1"
        );
    }

    #[test]
    fn membership_paths_nest_under_the_group() {
        let url = client()
            .url(&members_path(&RemoteScope::control_plane("cp-1"), "cg-gold").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://us.api.example.test/v2/control-planes/cp-1/core-entities/consumer_groups/cg-gold/consumers"
        );
    }

    #[tokio::test]
    async fn unsupported_tag_lookup_is_rejected_without_a_request() {
        let err = client()
            .list_by_tag(
                EntityKind::DataPlaneCertificate,
                &RemoteScope::control_plane("cp-1"),
                "gantry-uid:abc",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Terminal { .. }));
    }

    #[test]
    fn list_responses_parse() {
        let page: Page = serde_json::from_value(serde_json::json!({
            "data": [{"id": "a", "name": "x"}, {"id": "b"}],
            "next": null
        }))
        .unwrap();
        let ids: Vec<String> = page.data.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
