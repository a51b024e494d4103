//! In-process [`RemoteApi`] implementation
//!
//! Behaves like the hosted service for everything the engine relies on:
//! ids are assigned on create, unique fields (`name`, `username`,
//! `custom_id`) collide within a collection, tags are filterable and
//! deletes are idempotent. Faults can be queued per operation.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::{EntityKind, RemoteApi, RemoteError, RemoteScope, TagStyle};

/// Fields that must be unique within a collection
const UNIQUE_FIELDS: [&str; 3] = ["name", "username", "custom_id"];

/// Remote operation, for fault injection and call inspection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// create
    Create,
    /// upsert
    Upsert,
    /// delete
    Delete,
    /// list_by_tag
    List,
    /// get
    Get,
    /// consumer_groups_of
    ListGroups,
    /// add_consumer_to_group
    AddToGroup,
    /// remove_consumer_from_group
    RemoveFromGroup,
}

/// One recorded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    /// Operation
    pub op: RemoteOp,
    /// Entity kind
    pub kind: EntityKind,
    /// Entity id, when the call addressed one
    pub id: Option<String>,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Value>>,
    /// Consumer ids by consumer group entity path
    members: HashMap<String, BTreeSet<String>>,
    next_id: u64,
    faults: VecDeque<(RemoteOp, RemoteError)>,
    calls: Vec<RecordedCall>,
}

impl State {
    fn record(&mut self, op: RemoteOp, kind: EntityKind, id: Option<&str>) -> Result<(), RemoteError> {
        self.calls.push(RecordedCall {
            op,
            kind,
            id: id.map(String::from),
        });
        match self.faults.iter().position(|(o, _)| *o == op) {
            Some(i) => match self.faults.remove(i) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory remote service
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl InMemoryRemote {
    /// Create an empty remote
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next call of `op` fail with `err`
    pub fn fail_next(&self, op: RemoteOp, err: RemoteError) {
        self.state().faults.push_back((op, err));
    }

    /// Store an entity directly, bypassing uniqueness checks
    ///
    /// Simulates entities created out of band or by a concurrent writer.
    pub fn insert(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
        mut payload: Value,
    ) -> Result<(), RemoteError> {
        let path = kind.collection_path(scope)?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        self.state()
            .collections
            .entry(path)
            .or_default()
            .insert(id.to_string(), payload);
        Ok(())
    }

    /// Remove an entity directly, simulating an out-of-band delete
    pub fn remove(&self, kind: EntityKind, scope: &RemoteScope, id: &str) -> Result<(), RemoteError> {
        let path = kind.collection_path(scope)?;
        if let Some(collection) = self.state().collections.get_mut(&path) {
            collection.remove(id);
        }
        Ok(())
    }

    /// Entities of `kind` in `scope`, by id
    pub fn entities(&self, kind: EntityKind, scope: &RemoteScope) -> BTreeMap<String, Value> {
        let Ok(path) = kind.collection_path(scope) else {
            return BTreeMap::new();
        };
        self.state()
            .collections
            .get(&path)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    /// Number of calls of `op`
    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    /// Consumer ids in the group `group_id`
    pub fn group_members(&self, scope: &RemoteScope, group_id: &str) -> BTreeSet<String> {
        let Ok(path) = EntityKind::ConsumerGroup.entity_path(scope, group_id) else {
            return BTreeSet::new();
        };
        self.state().members.get(&path).cloned().unwrap_or_default()
    }
}

fn carries_tag(kind: EntityKind, payload: &Value, tag: &str) -> bool {
    match kind.tag_style() {
        TagStyle::Tags => payload
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag))),
        TagStyle::Labels => {
            let Some((key, value)) = tag.split_once(':') else {
                return false;
            };
            payload
                .get("labels")
                .and_then(|l| l.get(key))
                .and_then(Value::as_str)
                == Some(value)
        }
        TagStyle::Unsupported => false,
    }
}

fn collides(existing: &Value, payload: &Value) -> Option<&'static str> {
    UNIQUE_FIELDS.into_iter().find(|field| {
        match (payload.get(*field), existing.get(*field)) {
            (Some(new), Some(old)) => !new.is_null() && new == old,
            _ => false,
        }
    })
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn create(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        mut payload: Value,
    ) -> Result<String, RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::Create, kind, None)?;
        let path = kind.collection_path(scope)?;

        if let Some(collection) = state.collections.get(&path) {
            if let Some(field) = collection.values().find_map(|e| collides(e, &payload)) {
                return Err(RemoteError::conflict(
                    kind.as_str(),
                    format!("unique constraint violation on {field}"),
                ));
            }
        }

        state.next_id += 1;
        let id = format!("{}-{}", kind.as_str().replace('_', "-"), state.next_id);
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.clone()));
        }
        state
            .collections
            .entry(path)
            .or_default()
            .insert(id.clone(), payload);
        Ok(id)
    }

    async fn upsert(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
        mut payload: Value,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::Upsert, kind, Some(id))?;
        let path = kind.collection_path(scope)?;
        let entity = state
            .collections
            .get_mut(&path)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| RemoteError::not_found(kind.as_str(), id))?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert("id".to_string(), Value::String(id.to_string()));
        }
        *entity = payload;
        Ok(())
    }

    async fn delete(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::Delete, kind, Some(id))?;
        let path = kind.collection_path(scope)?;
        if let Some(collection) = state.collections.get_mut(&path) {
            collection.remove(id);
        }
        match kind {
            EntityKind::ConsumerGroup => {
                state.members.remove(&kind.entity_path(scope, id)?);
            }
            EntityKind::Consumer => {
                let prefix = EntityKind::ConsumerGroup.collection_path(scope)?;
                for (group, members) in state.members.iter_mut() {
                    if group.starts_with(&prefix) {
                        members.remove(id);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn list_by_tag(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        tag: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::List, kind, None)?;
        if kind.tag_style() == TagStyle::Unsupported {
            return Err(RemoteError::terminal(format!(
                "{kind} does not support tag lookups"
            )));
        }
        let path = kind.collection_path(scope)?;
        Ok(state
            .collections
            .get(&path)
            .map(|c| {
                c.iter()
                    .filter(|(_, e)| carries_tag(kind, e, tag))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(
        &self,
        kind: EntityKind,
        scope: &RemoteScope,
        id: &str,
    ) -> Result<Option<Value>, RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::Get, kind, Some(id))?;
        let path = kind.collection_path(scope)?;
        Ok(state.collections.get(&path).and_then(|c| c.get(id)).cloned())
    }

    async fn consumer_groups_of(
        &self,
        scope: &RemoteScope,
        consumer_id: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::ListGroups, EntityKind::Consumer, Some(consumer_id))?;
        let groups = EntityKind::ConsumerGroup.collection_path(scope)?;
        Ok(state
            .collections
            .get(&groups)
            .map(|c| {
                c.keys()
                    .filter(|group| {
                        EntityKind::ConsumerGroup
                            .entity_path(scope, group)
                            .ok()
                            .and_then(|path| state.members.get(&path))
                            .is_some_and(|m| m.contains(consumer_id))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_consumer_to_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::AddToGroup, EntityKind::ConsumerGroup, Some(group_id))?;
        let exists = |state: &State, kind: EntityKind, id: &str| -> Result<bool, RemoteError> {
            let path = kind.collection_path(scope)?;
            Ok(state.collections.get(&path).is_some_and(|c| c.contains_key(id)))
        };
        if !exists(&*state, EntityKind::ConsumerGroup, group_id)? {
            return Err(RemoteError::not_found(EntityKind::ConsumerGroup.as_str(), group_id));
        }
        if !exists(&*state, EntityKind::Consumer, consumer_id)? {
            return Err(RemoteError::not_found(EntityKind::Consumer.as_str(), consumer_id));
        }
        let path = EntityKind::ConsumerGroup.entity_path(scope, group_id)?;
        state
            .members
            .entry(path)
            .or_default()
            .insert(consumer_id.to_string());
        Ok(())
    }

    async fn remove_consumer_from_group(
        &self,
        scope: &RemoteScope,
        group_id: &str,
        consumer_id: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(RemoteOp::RemoveFromGroup, EntityKind::ConsumerGroup, Some(group_id))?;
        let path = EntityKind::ConsumerGroup.entity_path(scope, group_id)?;
        if let Some(members) = state.members.get_mut(&path) {
            members.remove(consumer_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cp() -> RemoteScope {
        RemoteScope::control_plane("cp-1")
    }

    #[tokio::test]
    async fn create_assigns_ids_and_enforces_unique_names() {
        let remote = InMemoryRemote::new();
        let id = remote
            .create(EntityKind::Service, &cp(), json!({"name": "svc-a", "tags": ["t1"]}))
            .await
            .unwrap();
        assert!(id.starts_with("service-"));

        let err = remote
            .create(EntityKind::Service, &cp(), json!({"name": "svc-a"}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Different control plane, different collection.
        remote
            .create(
                EntityKind::Service,
                &RemoteScope::control_plane("cp-2"),
                json!({"name": "svc-a"}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tags_and_labels_are_filterable() {
        let remote = InMemoryRemote::new();
        let id = remote
            .create(EntityKind::Route, &cp(), json!({"name": "r", "tags": ["gantry-uid:abc"]}))
            .await
            .unwrap();
        remote
            .create(EntityKind::Route, &cp(), json!({"name": "r2", "tags": ["other"]}))
            .await
            .unwrap();
        assert_eq!(
            remote
                .list_by_tag(EntityKind::Route, &cp(), "gantry-uid:abc")
                .await
                .unwrap(),
            vec![id]
        );

        let org = RemoteScope::organization();
        let cp_id = remote
            .create(
                EntityKind::ControlPlane,
                &org,
                json!({"name": "cp", "labels": {"gantry-uid": "abc"}}),
            )
            .await
            .unwrap();
        assert_eq!(
            remote
                .list_by_tag(EntityKind::ControlPlane, &org, "gantry-uid:abc")
                .await
                .unwrap(),
            vec![cp_id]
        );
    }

    #[tokio::test]
    async fn upsert_of_missing_entity_is_not_found_and_delete_is_idempotent() {
        let remote = InMemoryRemote::new();
        let err = remote
            .upsert(EntityKind::Service, &cp(), "nope", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        remote.delete(EntityKind::Service, &cp(), "nope").await.unwrap();
    }

    #[tokio::test]
    async fn queued_faults_fire_once_for_their_operation() {
        let remote = InMemoryRemote::new();
        remote.fail_next(RemoteOp::Create, RemoteError::transient("boom"));
        assert!(remote
            .get(EntityKind::Service, &cp(), "x")
            .await
            .unwrap()
            .is_none());
        assert!(remote
            .create(EntityKind::Service, &cp(), json!({"name": "a"}))
            .await
            .unwrap_err()
            .is_transient());
        assert!(remote
            .create(EntityKind::Service, &cp(), json!({"name": "a"}))
            .await
            .is_ok());
        assert_eq!(remote.call_count(RemoteOp::Create), 2);
    }

    #[tokio::test]
    async fn memberships_follow_adds_removes_and_deletes() {
        let remote = InMemoryRemote::new();
        let gold = remote
            .create(EntityKind::ConsumerGroup, &cp(), json!({"name": "gold"}))
            .await
            .unwrap();
        let alice = remote
            .create(EntityKind::Consumer, &cp(), json!({"username": "alice"}))
            .await
            .unwrap();

        let err = remote
            .add_consumer_to_group(&cp(), "missing", &alice)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        remote.add_consumer_to_group(&cp(), &gold, &alice).await.unwrap();
        remote.add_consumer_to_group(&cp(), &gold, &alice).await.unwrap();
        assert_eq!(remote.consumer_groups_of(&cp(), &alice).await.unwrap(), vec![gold.clone()]);

        remote.remove_consumer_from_group(&cp(), &gold, &alice).await.unwrap();
        assert!(remote.consumer_groups_of(&cp(), &alice).await.unwrap().is_empty());

        remote.add_consumer_to_group(&cp(), &gold, &alice).await.unwrap();
        remote.delete(EntityKind::Consumer, &cp(), &alice).await.unwrap();
        assert!(remote.group_members(&cp(), &gold).is_empty());
    }
}
