//! Generic reconcile loop for every remote-backed kind
//!
//! A pass validates the spec, resolves parents, builds the payload and then
//! either updates the entity recorded on the status, adopts the one named
//! by the spec, or creates a new one. A create that collides with an
//! existing entity is settled through the uniqueness tag. On deletion the
//! remote entity is removed before the cleanup finalizer is released.
//!
//! A terminal failure is remembered on the status for the generation that
//! caused it. Later passes of the same generation make no remote calls.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use gantry_common::crd::{condition_types, reasons, ConditionStatus, EntityStatus, RemoteRef};
use gantry_common::events::{actions, reasons as event_reasons};
use gantry_common::kube_utils::{has_finalizer, is_terminating, object_key};
use gantry_common::metrics::{record_remote_call, ReconcileOutcome, ReconcileTimer};
use gantry_common::retry::{BackoffTracker, RetryConfig};
use gantry_common::{EventPublisher, GrantLookup, KubeGrantLookup, REMOTE_CLEANUP_FINALIZER};
use gantry_remote::{
    EntityKind, ErrorClass, RemoteApi, RemoteAuth, RemoteClientFactory, RemoteError, RemoteScope,
    TagStyle,
};

use crate::adapter::ManagedEntity;
use crate::adoption::adoption_target;
use crate::conflict::{resolve_conflict, ConflictResolution};
use crate::error::ReconcileError;
use crate::parents::{KubeParentLookup, ParentLookup};
use crate::resolve::{Resolution, Resolved, Resolver};
use crate::status::{transition, FinalizerAction, Observation};
use crate::store::{EntityStore, KubeEntityStore};
use crate::tags::{apply_tags, entity_tags, object_uniqueness_tag};

/// Tunables of the reconcile loop
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Requeue interval after a converged pass, to catch remote drift.
    pub sync_period: Duration,
    /// Bound on every remote call.
    pub remote_timeout: Duration,
    /// Requeue interval while a dependency is not ready
    pub dependency_backoff: Duration,
    /// Backoff for transient failures
    pub retry: RetryConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(600),
            remote_timeout: Duration::from_secs(30),
            dependency_backoff: Duration::from_secs(5),
            retry: RetryConfig {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(300),
                ..RetryConfig::default()
            },
        }
    }
}

/// Shared state of one kind's controller
pub struct EntityContext<E: ManagedEntity> {
    /// Status and finalizer writes
    pub store: Arc<dyn EntityStore<E>>,
    /// Reads of referenced objects
    pub parents: Arc<dyn ParentLookup>,
    /// Cross-namespace permission checks
    pub grants: Arc<dyn GrantLookup>,
    /// Remote clients per credentials
    pub remotes: Arc<dyn RemoteClientFactory>,
    /// Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Loop tunables
    pub settings: EngineSettings,
    /// Per-object retry attempts
    pub backoff: BackoffTracker,
    /// Aborts in-flight remote calls
    pub shutdown: CancellationToken,
}

impl<E: ManagedEntity> EntityContext<E> {
    /// Context backed by the Kubernetes API
    pub fn new(
        client: Client,
        remotes: Arc<dyn RemoteClientFactory>,
        events: Arc<dyn EventPublisher>,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self::from_parts(
            Arc::new(KubeEntityStore::new(client.clone())),
            Arc::new(KubeParentLookup::new(client.clone())),
            Arc::new(KubeGrantLookup::new(client)),
            remotes,
            events,
            settings,
            shutdown,
        )
    }

    /// Context from individual seams
    pub fn from_parts(
        store: Arc<dyn EntityStore<E>>,
        parents: Arc<dyn ParentLookup>,
        grants: Arc<dyn GrantLookup>,
        remotes: Arc<dyn RemoteClientFactory>,
        events: Arc<dyn EventPublisher>,
        settings: EngineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let backoff = BackoffTracker::new(settings.retry.clone());
        Self {
            store,
            parents,
            grants,
            remotes,
            events,
            settings,
            backoff,
            shutdown,
        }
    }

    /// Run one remote call under the timeout and shutdown token
    async fn call<T, F>(
        &self,
        kind: EntityKind,
        operation: &'static str,
        call: F,
    ) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let timeout = self.settings.remote_timeout;
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                Err(RemoteError::transient(format!("{operation} aborted by shutdown")))
            }
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(RemoteError::transient(format!(
                    "{operation} timed out after {timeout:?}"
                ))),
            },
        };
        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.class().as_str(),
        };
        record_remote_call(kind.as_str(), operation, label);
        if let Err(e) = &result {
            debug!(%kind, operation, error = %e, "remote call failed");
        }
        result
    }

    async fn publish(&self, obj: &E, type_: EventType, reason: &str, action: &str, note: String) {
        self.events
            .publish(&obj.object_ref(&()), type_, reason, action, Some(note))
            .await;
    }
}

/// How a pass ended, before it becomes a controller [`Action`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Remote entity matches the spec
    Converged,
    /// Try again after the delay
    Retry(Duration),
    /// Nothing to do until the object changes
    AwaitChange,
    /// Remote entity removed and finalizer released
    Released,
}

impl PassOutcome {
    /// Controller action for this outcome
    pub fn action(self, sync_period: Duration) -> Action {
        match self {
            Self::Converged => Action::requeue(sync_period),
            Self::Retry(delay) => Action::requeue(delay),
            Self::AwaitChange | Self::Released => Action::await_change(),
        }
    }

    fn metric(self) -> ReconcileOutcome {
        match self {
            Self::Converged | Self::Released => ReconcileOutcome::Converged,
            Self::Retry(_) => ReconcileOutcome::Retry,
            Self::AwaitChange => ReconcileOutcome::Fatal,
        }
    }
}

/// Observation plus what the pass learned along the way
struct Step {
    observation: Observation,
    retry_after: Option<Duration>,
    finalizer_added: bool,
}

impl From<Observation> for Step {
    fn from(observation: Observation) -> Self {
        Self {
            observation,
            retry_after: None,
            finalizer_added: false,
        }
    }
}

fn remote_failure(e: &RemoteError) -> Step {
    let observation = match e.class() {
        ErrorClass::Terminal | ErrorClass::Conflict => {
            Observation::Rejected(e.to_string())
        }
        ErrorClass::Transient | ErrorClass::NotFound => {
            Observation::Transient(e.to_string())
        }
    };
    Step {
        observation,
        retry_after: e.retry_after(),
        finalizer_added: false,
    }
}

fn remote_ref(resolved: &Resolved, id: String) -> RemoteRef {
    RemoteRef {
        id,
        server_url: resolved.auth.server_url.clone(),
        org_id: resolved.parents.org_id.clone(),
        control_plane_id: resolved.scope.control_plane_id.clone(),
        parent_ids: resolved.scope.parents.clone(),
        auth_ref: Some(resolved.auth_ref.clone()),
    }
}

fn programmed(resolved: &Resolved, id: String, adopted: bool) -> Step {
    Observation::Programmed {
        remote: remote_ref(resolved, id),
        adopted,
    }
    .into()
}

/// The entity `id` is ours but writing to it failed with `e`
fn unsynced(remote: RemoteRef, adopted: bool, e: &RemoteError) -> Step {
    let failure = remote_failure(e);
    Step {
        observation: Observation::Unsynced {
            remote,
            adopted,
            failure: Box::new(failure.observation),
        },
        ..failure
    }
}

/// Terminal outcome already recorded for `generation`
///
/// Returns the same observation again so the pass changes nothing.
fn settled_failure(status: &EntityStatus, generation: i64) -> Option<Observation> {
    let programmed = status.condition(condition_types::PROGRAMMED)?;
    if programmed.status != ConditionStatus::False || !programmed.is_current(generation) {
        return None;
    }
    let message = programmed.message.clone();
    match programmed.reason.as_str() {
        reasons::REMOTE_REJECTED => Some(Observation::Rejected(message)),
        reasons::INVALID_SPEC => Some(Observation::InvalidSpec(message)),
        reasons::CONTROL_PLANE_READ_ONLY => Some(Observation::ReadOnly(message)),
        _ => None,
    }
}

/// Reconcile one object of kind `E`
#[instrument(
    skip(obj, ctx),
    fields(kind = E::REMOTE_KIND.as_str(), object = %object_key(obj.as_ref()))
)]
pub async fn reconcile<E: ManagedEntity>(
    obj: Arc<E>,
    ctx: Arc<EntityContext<E>>,
) -> Result<Action, ReconcileError> {
    let timer = ReconcileTimer::start(E::REMOTE_KIND.as_str());
    match reconcile_entity(obj.as_ref(), &ctx).await {
        Ok(outcome) => {
            timer.finish(outcome.metric());
            Ok(outcome.action(ctx.settings.sync_period))
        }
        Err(e) => {
            timer.finish(ReconcileOutcome::Error);
            Err(e)
        }
    }
}

/// Requeue policy for passes that returned an error
pub fn error_policy<E: ManagedEntity>(
    obj: Arc<E>,
    error: &ReconcileError,
    ctx: Arc<EntityContext<E>>,
) -> Action {
    let key = object_key(obj.as_ref());
    if error.is_retryable() {
        let delay = ctx.backoff.next_delay(&key);
        warn!(object = %key, %error, ?delay, "reconcile failed, retrying");
        Action::requeue(delay)
    } else {
        error!(object = %key, %error, "reconcile failed");
        Action::await_change()
    }
}

/// One pass over `obj`, returning how it ended.
///
/// Status and finalizer writes go through `ctx.store`; the caller turns
/// the outcome into a controller [`Action`] with [`PassOutcome::action`].
pub async fn reconcile_entity<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
) -> Result<PassOutcome, ReconcileError> {
    let key = object_key(obj);
    if is_terminating(obj) {
        if !has_finalizer(obj, REMOTE_CLEANUP_FINALIZER) {
            ctx.backoff.reset(&key);
            return Ok(PassOutcome::Released);
        }
        return cleanup(obj, ctx, &key).await;
    }

    let mut current = obj.entity_status().cloned().unwrap_or_default();
    let step = program(obj, ctx, &mut current).await?;

    let generation = obj.meta().generation.unwrap_or_default();
    let next = transition(
        &current,
        generation,
        &obj.required_conditions(),
        &step.observation,
    );
    let finalizer_present = step.finalizer_added || has_finalizer(obj, REMOTE_CLEANUP_FINALIZER);

    if next.finalizer == FinalizerAction::Ensure && !finalizer_present {
        ctx.store.add_finalizer(obj).await?;
    }
    if obj.entity_status() != Some(&next.status) {
        ctx.store.patch_status(obj, &next.status).await?;
    }
    if next.finalizer == FinalizerAction::Release && finalizer_present {
        ctx.store.remove_finalizer(obj).await?;
    }

    Ok(outcome(&step, ctx, &key))
}

fn outcome<E: ManagedEntity>(step: &Step, ctx: &EntityContext<E>, key: &str) -> PassOutcome {
    match &step.observation {
        Observation::Programmed { .. } => {
            ctx.backoff.reset(key);
            PassOutcome::Converged
        }
        Observation::Blocked(_) | Observation::ParentLost(_) => {
            PassOutcome::Retry(ctx.settings.dependency_backoff)
        }
        Observation::Transient(_) => {
            let delay = ctx.backoff.next_delay(key);
            PassOutcome::Retry(step.retry_after.map_or(delay, |hint| hint.max(delay)))
        }
        Observation::Unresolved { .. } | Observation::AdoptionTargetMissing(_) => {
            PassOutcome::Retry(ctx.backoff.next_delay(key))
        }
        Observation::InvalidSpec(_) | Observation::ReadOnly(_) | Observation::Rejected(_) => {
            ctx.backoff.reset(key);
            PassOutcome::AwaitChange
        }
        Observation::Unsynced { failure, .. } => {
            let inner = Step {
                observation: (**failure).clone(),
                retry_after: step.retry_after,
                finalizer_added: step.finalizer_added,
            };
            outcome(&inner, ctx, key)
        }
    }
}

/// Drive the remote entity towards the spec
///
/// `current` is the status the transition starts from; it loses its remote
/// reference when the entity turns out to be gone.
async fn program<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
    current: &mut EntityStatus,
) -> Result<Step, ReconcileError> {
    if let Err(e) = obj.validate() {
        warn!(error = %e, "spec validation failed");
        return Ok(Observation::InvalidSpec(e.message()).into());
    }

    let resolution = Resolver::new(ctx.parents.as_ref(), ctx.grants.as_ref())
        .resolve(obj)
        .await?;
    let resolved = match resolution {
        Resolution::Resolved(resolved) => *resolved,
        Resolution::Blocked(blocker)
            if blocker.control_plane_gone && current.remote_id().is_some() =>
        {
            return Ok(parent_lost(obj, ctx, blocker.message).await);
        }
        Resolution::Blocked(blocker) => {
            debug!(reason = blocker.reason, message = %blocker.message, "waiting on dependency");
            return Ok(Observation::Blocked(blocker).into());
        }
        Resolution::ReadOnly(message) => return Ok(Observation::ReadOnly(message).into()),
        Resolution::Invalid(message) => return Ok(Observation::InvalidSpec(message).into()),
    };

    if E::REMOTE_KIND.is_control_plane_scoped() {
        if let Some(stored) = current.remote.as_ref().filter(|r| !r.id.is_empty()) {
            if stored.control_plane_id != resolved.scope.control_plane_id {
                let message = format!(
                    "control plane changed from {} to {}",
                    stored.control_plane_id.as_deref().unwrap_or("<none>"),
                    resolved.scope.control_plane_id.as_deref().unwrap_or("<none>"),
                );
                return Ok(parent_lost(obj, ctx, message).await);
            }
        }
    }

    let generation = obj.meta().generation.unwrap_or_default();
    if let Some(observation) = settled_failure(current, generation) {
        debug!(generation, "terminal failure already recorded for this generation");
        return Ok(observation.into());
    }

    let mut payload = match obj.build_payload(&resolved.parents) {
        Ok(payload) => payload,
        Err(e) => return Ok(Observation::InvalidSpec(e.message()).into()),
    };
    apply_tags(E::REMOTE_KIND, &mut payload, &entity_tags(obj));

    let client = match ctx.remotes.client_for(&resolved.auth) {
        Ok(client) => client,
        Err(e) => return Ok(remote_failure(&e)),
    };

    let step = write(obj, ctx, client.as_ref(), &resolved, current, payload).await?;
    Ok(match obj.group_memberships(&resolved.parents) {
        Some(groups) => {
            sync_memberships(ctx, client.as_ref(), &resolved.scope, &groups, step).await
        }
        None => step,
    })
}

/// Update, adopt or create the remote entity
async fn write<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
    client: &dyn RemoteApi,
    resolved: &Resolved,
    current: &mut EntityStatus,
    payload: serde_json::Value,
) -> Result<Step, ReconcileError> {
    let kind = E::REMOTE_KIND;
    let scope = &resolved.scope;

    if let Some(id) = current.remote_id().map(String::from) {
        match ctx.call(kind, "upsert", client.upsert(kind, scope, &id, payload.clone())).await {
            Ok(()) => {
                debug!(remote_id = %id, "remote entity up to date");
                return Ok(programmed(resolved, id, false));
            }
            Err(e) if e.is_not_found() => {
                warn!(remote_id = %id, "remote entity deleted out of band, recreating");
                current.remote = None;
            }
            Err(e) => return Ok(remote_failure(&e)),
        }
    }

    if let Some(options) = obj.adopt_options() {
        let id = match ctx
            .call(kind, "get", adoption_target(client, kind, scope, options))
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(remote_id = %options.id, "adoption target does not exist");
                return Ok(Observation::AdoptionTargetMissing(options.id.clone()).into());
            }
            Err(e) => return Ok(remote_failure(&e)),
        };
        ctx.publish(
            obj,
            EventType::Normal,
            event_reasons::REMOTE_ADOPTED,
            actions::ADOPT,
            format!("adopted {kind} {id}"),
        )
        .await;
        let synced = ctx
            .call(kind, "upsert", client.upsert(kind, scope, &id, payload))
            .await;
        return Ok(match synced {
            Ok(()) => {
                info!(remote_id = %id, "adopted remote entity");
                programmed(resolved, id, true)
            }
            Err(e) => {
                warn!(remote_id = %id, error = %e, "adopted remote entity but could not update it");
                unsynced(remote_ref(resolved, id), true, &e)
            }
        });
    }

    let finalizer_added = !has_finalizer(obj, REMOTE_CLEANUP_FINALIZER);
    if finalizer_added {
        ctx.store.add_finalizer(obj).await?;
    }
    let created = ctx
        .call(kind, "create", client.create(kind, scope, payload.clone()))
        .await;
    let mut step = match created {
        Ok(id) => {
            info!(remote_id = %id, "created remote entity");
            ctx.publish(
                obj,
                EventType::Normal,
                event_reasons::REMOTE_CREATED,
                actions::CREATE,
                format!("created {kind} {id}"),
            )
            .await;
            programmed(resolved, id, false)
        }
        Err(e) if e.is_conflict() => settle_conflict(obj, ctx, client, resolved, payload, &e).await,
        Err(e) => remote_failure(&e),
    };
    step.finalizer_added = finalizer_added;
    Ok(step)
}

/// Converge the consumer group memberships of a programmed entity
///
/// A failure keeps the identity the write established.
async fn sync_memberships<E: ManagedEntity>(
    ctx: &EntityContext<E>,
    client: &dyn RemoteApi,
    scope: &RemoteScope,
    groups: &[String],
    step: Step,
) -> Step {
    let Observation::Programmed { remote, adopted } = &step.observation else {
        return step;
    };
    match converge_groups(ctx, client, scope, &remote.id, groups).await {
        Ok(()) => step,
        Err(e) => {
            warn!(remote_id = %remote.id, error = %e, "consumer group membership not converged");
            Step {
                finalizer_added: step.finalizer_added,
                ..unsynced(remote.clone(), *adopted, &e)
            }
        }
    }
}

async fn converge_groups<E: ManagedEntity>(
    ctx: &EntityContext<E>,
    client: &dyn RemoteApi,
    scope: &RemoteScope,
    member: &str,
    groups: &[String],
) -> Result<(), RemoteError> {
    let kind = E::REMOTE_KIND;
    let wanted: BTreeSet<&str> = groups.iter().map(String::as_str).collect();
    let actual = ctx
        .call(kind, "consumer_groups_of", client.consumer_groups_of(scope, member))
        .await?;
    let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();

    for group in wanted.difference(&actual) {
        ctx.call(kind, "add_to_group", client.add_consumer_to_group(scope, group, member))
            .await?;
        debug!(remote_id = %member, group, "joined consumer group");
    }
    for group in actual.difference(&wanted) {
        ctx.call(
            kind,
            "remove_from_group",
            client.remove_consumer_from_group(scope, group, member),
        )
        .await?;
        debug!(remote_id = %member, group, "left consumer group");
    }
    Ok(())
}

/// Decide whether a conflicting entity is ours
async fn settle_conflict<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
    client: &dyn RemoteApi,
    resolved: &Resolved,
    payload: serde_json::Value,
    conflict: &RemoteError,
) -> Step {
    let kind = E::REMOTE_KIND;
    let scope = &resolved.scope;
    let tag = object_uniqueness_tag(obj);
    let resolution = match ctx
        .call(kind, "list_by_tag", resolve_conflict(client, kind, scope, &tag))
        .await
    {
        Ok(resolution) => resolution,
        Err(e) => return remote_failure(&e),
    };

    match resolution {
        ConflictResolution::Found(id) => {
            info!(remote_id = %id, "create conflicted with an entity we own, taking it over");
            match ctx.call(kind, "upsert", client.upsert(kind, scope, &id, payload)).await {
                Ok(()) => {
                    ctx.publish(
                        obj,
                        EventType::Normal,
                        event_reasons::CONFLICT_RESOLVED,
                        actions::RECONCILE,
                        format!("recovered {kind} {id} through tag {tag}"),
                    )
                    .await;
                    programmed(resolved, id, false)
                }
                Err(e) => remote_failure(&e),
            }
        }
        ConflictResolution::Unrelated => {
            warn!(%tag, "create conflicted with an entity we do not own");
            Observation::Unresolved {
                reason: reasons::CONFLICT_UNRESOLVED,
                message: format!("{conflict}; no remote entity carries tag {tag}"),
            }
            .into()
        }
        ConflictResolution::Ambiguous(ids) => {
            warn!(%tag, ?ids, "several remote entities carry our uniqueness tag");
            Observation::Unresolved {
                reason: reasons::AMBIGUOUS_UNIQUENESS_TAG,
                message: format!("remote entities {} all carry tag {tag}", ids.join(", ")),
            }
            .into()
        }
        ConflictResolution::Unsupported => Observation::Unresolved {
            reason: reasons::CONFLICT_UNRESOLVED,
            message: format!("{conflict}; {kind} entities cannot be looked up by tag"),
        }
        .into(),
    }
}

async fn parent_lost<E: ManagedEntity>(obj: &E, ctx: &EntityContext<E>, message: String) -> Step {
    warn!(%message, "control plane lost, forgetting remote entity");
    ctx.publish(
        obj,
        EventType::Warning,
        event_reasons::CONTROL_PLANE_LOST,
        actions::RECONCILE,
        message.clone(),
    )
    .await;
    Observation::ParentLost(message).into()
}

/// Where a terminating object's remote entities are
struct CleanupTarget {
    client: Arc<dyn RemoteApi>,
    scope: RemoteScope,
    ids: Vec<String>,
}

/// Remove the remote entity of a terminating object, then the finalizer
async fn cleanup<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
    key: &str,
) -> Result<PassOutcome, ReconcileError> {
    let kind = E::REMOTE_KIND;
    let target = match cleanup_target(obj, ctx).await {
        Ok(Some(target)) => target,
        Ok(None) => {
            ctx.store.remove_finalizer(obj).await?;
            ctx.backoff.reset(key);
            return Ok(PassOutcome::Released);
        }
        Err(step) => {
            let delay = ctx.backoff.next_delay(key);
            return Ok(PassOutcome::Retry(step.retry_after.map_or(delay, |hint| hint.max(delay))));
        }
    };

    for id in &target.ids {
        match ctx
            .call(kind, "delete", target.client.delete(kind, &target.scope, id))
            .await
        {
            Ok(()) => {
                info!(remote_id = %id, "deleted remote entity");
                ctx.publish(
                    obj,
                    EventType::Normal,
                    event_reasons::REMOTE_DELETED,
                    actions::DELETE,
                    format!("deleted {kind} {id}"),
                )
                .await;
            }
            Err(e) if e.is_not_found() => debug!(remote_id = %id, "remote entity already gone"),
            Err(e) => {
                warn!(remote_id = %id, error = %e, "remote delete failed, keeping finalizer");
                let delay = ctx.backoff.next_delay(key);
                let delay = e.retry_after().map_or(delay, |hint| hint.max(delay));
                return Ok(PassOutcome::Retry(delay));
            }
        }
    }

    ctx.store.remove_finalizer(obj).await?;
    ctx.backoff.reset(key);
    Ok(PassOutcome::Released)
}

/// Find what to delete
///
/// `Ok(None)` means nothing remote can be reached or found; the finalizer is
/// released. `Err` carries a retryable remote failure.
async fn cleanup_target<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
) -> Result<Option<CleanupTarget>, Step> {
    let kind = E::REMOTE_KIND;
    let stored = obj
        .entity_status()
        .and_then(|s| s.remote.clone())
        .filter(|r| !r.id.is_empty());

    if let Some(remote) = stored {
        let auth = match &remote.auth_ref {
            Some(auth_ref) => {
                let namespace = auth_ref
                    .namespace
                    .clone()
                    .unwrap_or_else(|| obj.namespace().unwrap_or_default());
                match ctx.parents.auth(&namespace, &auth_ref.name).await {
                    Ok(auth) => auth,
                    Err(e) if e.is_retryable() => {
                        return Err(Observation::Transient(e.message()).into())
                    }
                    Err(_) => None,
                }
            }
            None => resolved_auth(obj, ctx).await?,
        };
        let Some(auth) = auth else {
            warn!(remote_id = %remote.id, "credentials are gone, releasing without remote delete");
            return Ok(None);
        };
        let client = ctx.remotes.client_for(&auth).map_err(|e| remote_failure(&e))?;
        return Ok(Some(CleanupTarget {
            client,
            scope: RemoteScope {
                control_plane_id: remote.control_plane_id,
                parents: remote.parent_ids,
            },
            ids: vec![remote.id],
        }));
    }

    // No id was recorded: a create may still have succeeded before the
    // status write, so sweep by uniqueness tag.
    if kind.tag_style() == TagStyle::Unsupported {
        return Ok(None);
    }
    let resolution = Resolver::new(ctx.parents.as_ref(), ctx.grants.as_ref())
        .resolve(obj)
        .await
        .map_err(|e| Step::from(Observation::Transient(e.to_string())))?;
    let Resolution::Resolved(resolved) = resolution else {
        return Ok(None);
    };
    let client = ctx
        .remotes
        .client_for(&resolved.auth)
        .map_err(|e| remote_failure(&e))?;
    let tag = object_uniqueness_tag(obj);
    let ids = ctx
        .call(kind, "list_by_tag", client.list_by_tag(kind, &resolved.scope, &tag))
        .await
        .map_err(|e| remote_failure(&e))?;
    if !ids.is_empty() {
        info!(%tag, count = ids.len(), "sweeping untracked remote entities");
    }
    Ok(Some(CleanupTarget {
        client,
        scope: resolved.scope,
        ids,
    }))
}

async fn resolved_auth<E: ManagedEntity>(
    obj: &E,
    ctx: &EntityContext<E>,
) -> Result<Option<RemoteAuth>, Step> {
    match Resolver::new(ctx.parents.as_ref(), ctx.grants.as_ref())
        .resolve(obj)
        .await
    {
        Ok(Resolution::Resolved(resolved)) => Ok(Some(resolved.auth)),
        Ok(_) => Ok(None),
        Err(e) => Err(Observation::Transient(e.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ParentRole;
    use crate::parents::{ControlPlaneState, MockParentLookup};
    use crate::testing::{
        consumer, control_plane_state, parent_state, route, service, MemoryParents, MemoryStore,
    };
    use async_trait::async_trait;
    use gantry_common::crd::{AdoptMode, AdoptOptions, GantryConsumer, GantryService};
    use gantry_common::MockGrantLookup;
    use gantry_remote::{InMemoryRemote, RemoteOp, StaticClientFactory};
    use k8s_openapi::api::core::v1::ObjectReference;
    use serde_json::json;
    use std::sync::Mutex;

    const KEY: &str = "team-a/orders";

    /// Records event reasons
    #[derive(Default)]
    struct RecordingEvents {
        reasons: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingEvents {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            _type_: EventType,
            reason: &str,
            _action: &str,
            _note: Option<String>,
        ) {
            self.reasons.lock().unwrap().push(reason.to_string());
        }
    }

    struct Harness<E: ManagedEntity> {
        store: Arc<MemoryStore<E>>,
        parents: Arc<MemoryParents>,
        remote: Arc<InMemoryRemote>,
        events: Arc<RecordingEvents>,
        ctx: EntityContext<E>,
    }

    impl<E: ManagedEntity> Harness<E> {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let parents = Arc::new(MemoryParents::with_control_plane("team-a", "prod", "cp-1"));
            let remote = Arc::new(InMemoryRemote::new());
            let events = Arc::new(RecordingEvents::default());
            let mut grants = MockGrantLookup::new();
            grants.expect_permits().returning(|_| Ok(true));
            let ctx = EntityContext::from_parts(
                store.clone(),
                parents.clone(),
                Arc::new(grants),
                Arc::new(StaticClientFactory::new(remote.clone())),
                events.clone(),
                EngineSettings::default(),
                CancellationToken::new(),
            );
            Self {
                store,
                parents,
                remote,
                events,
                ctx,
            }
        }

        fn object(&self, key: &str) -> E {
            self.store.get(key).expect("object present")
        }

        async fn pass(&self, key: &str) -> PassOutcome {
            reconcile_entity(&self.object(key), &self.ctx).await.unwrap()
        }

        fn status(&self, key: &str) -> EntityStatus {
            self.object(key).entity_status().cloned().unwrap_or_default()
        }

        fn event_reasons(&self) -> Vec<String> {
            self.events.reasons.lock().unwrap().clone()
        }
    }

    fn cp1() -> RemoteScope {
        RemoteScope::control_plane("cp-1")
    }

    fn programmed_reason(status: &EntityStatus) -> Option<(ConditionStatus, String)> {
        status
            .condition(condition_types::PROGRAMMED)
            .map(|c| (c.status, c.reason.clone()))
    }

    #[tokio::test]
    async fn create_once_then_update_in_place() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let obj = h.object(KEY);
        let remote = obj.entity_status().and_then(|s| s.remote.clone()).unwrap();
        assert_eq!(remote.control_plane_id.as_deref(), Some("cp-1"));
        assert_eq!(remote.auth_ref.unwrap().name, "auth");
        assert!(has_finalizer(&obj, REMOTE_CLEANUP_FINALIZER));
        assert!(obj.entity_status().unwrap().is_programmed(1));

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 1);
        assert_eq!(h.remote.call_count(RemoteOp::Upsert), 1);
        assert_eq!(h.remote.entities(EntityKind::Service, &cp1()).len(), 1);
        assert_eq!(h.event_reasons(), vec![event_reasons::REMOTE_CREATED]);
    }

    #[tokio::test]
    async fn lost_status_write_is_recovered_through_the_uniqueness_tag() {
        let h = Harness::<GantryService>::new();
        let svc = service("orders", "prod");
        // An earlier pass created the entity but never recorded its id.
        let mut payload = json!({ "name": "orders" });
        apply_tags(EntityKind::Service, &mut payload, &entity_tags(&svc));
        h.remote
            .insert(EntityKind::Service, &cp1(), "service-12345", payload)
            .unwrap();
        h.store.insert(svc);

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let status = h.status(KEY);
        assert_eq!(status.remote_id(), Some("service-12345"));
        // Recovering our own entity is not an adoption.
        assert!(status.condition(condition_types::ADOPTED).is_none());
        assert_eq!(h.remote.entities(EntityKind::Service, &cp1()).len(), 1);
        assert!(h
            .event_reasons()
            .contains(&event_reasons::CONFLICT_RESOLVED.to_string()));
    }

    #[tokio::test]
    async fn conflict_with_foreign_entity_is_reported_and_retried() {
        let h = Harness::<GantryService>::new();
        h.remote
            .insert(EntityKind::Service, &cp1(), "service-9", json!({ "name": "orders" }))
            .unwrap();
        h.store.insert(service("orders", "prod"));

        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        let status = h.status(KEY);
        assert_eq!(status.remote_id(), None);
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::False, reasons::CONFLICT_UNRESOLVED.to_string()))
        );
    }

    #[tokio::test]
    async fn ambiguous_uniqueness_tag_is_never_guessed() {
        let h = Harness::<GantryService>::new();
        let svc = service("orders", "prod");
        for id in ["service-1", "service-2"] {
            let mut payload = json!({ "name": "orders" });
            apply_tags(EntityKind::Service, &mut payload, &entity_tags(&svc));
            h.remote.insert(EntityKind::Service, &cp1(), id, payload).unwrap();
        }
        h.store.insert(svc);

        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        let status = h.status(KEY);
        assert_eq!(status.remote_id(), None);
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::False, reasons::AMBIGUOUS_UNIQUENESS_TAG.to_string()))
        );
        assert_eq!(h.remote.call_count(RemoteOp::Upsert), 0);
    }

    #[tokio::test]
    async fn adoption_takes_over_without_creating() {
        let h = Harness::<GantryService>::new();
        h.remote
            .insert(EntityKind::Service, &cp1(), "service-77", json!({ "name": "legacy" }))
            .unwrap();
        let mut svc = service("orders", "prod");
        svc.spec.adopt = Some(AdoptOptions {
            mode: AdoptMode::Override,
            id: "service-77".to_string(),
        });
        h.store.insert(svc);

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let status = h.status(KEY);
        assert_eq!(status.remote_id(), Some("service-77"));
        assert!(status.condition(condition_types::ADOPTED).unwrap().is_true());
        let entity = &h.remote.entities(EntityKind::Service, &cp1())["service-77"];
        assert_eq!(entity["name"], "orders");

        // A spec change updates the adopted entity in place.
        let mut svc = h.object(KEY);
        svc.spec.port = 8080;
        svc.metadata.generation = Some(2);
        h.store.insert(svc);
        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let entity = &h.remote.entities(EntityKind::Service, &cp1())["service-77"];
        assert_eq!(entity["port"], 8080);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 0);
        assert!(h.status(KEY).condition(condition_types::ADOPTED).unwrap().is_true());
    }

    #[tokio::test]
    async fn adoption_keeps_identity_when_the_update_is_rejected() {
        let h = Harness::<GantryService>::new();
        h.remote
            .insert(EntityKind::Service, &cp1(), "service-77", json!({ "name": "legacy" }))
            .unwrap();
        let mut svc = service("orders", "prod");
        svc.spec.adopt = Some(AdoptOptions {
            mode: AdoptMode::Override,
            id: "service-77".to_string(),
        });
        h.store.insert(svc);
        h.remote
            .fail_next(RemoteOp::Upsert, RemoteError::terminal("schema violation"));

        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        let status = h.status(KEY);
        assert_eq!(status.remote_id(), Some("service-77"));
        assert!(status.condition(condition_types::ADOPTED).unwrap().is_true());
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::False, reasons::REMOTE_REJECTED.to_string()))
        );
        assert!(has_finalizer(&h.object(KEY), REMOTE_CLEANUP_FINALIZER));

        // The next generation updates the tracked entity without another lookup.
        let mut svc = h.object(KEY);
        svc.metadata.generation = Some(2);
        h.store.insert(svc);
        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        assert_eq!(h.remote.call_count(RemoteOp::Get), 1);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 0);
        let entity = &h.remote.entities(EntityKind::Service, &cp1())["service-77"];
        assert_eq!(entity["name"], "orders");
        assert!(h.status(KEY).condition(condition_types::ADOPTED).unwrap().is_true());
    }

    #[tokio::test]
    async fn missing_adoption_target_is_retried() {
        let h = Harness::<GantryService>::new();
        let mut svc = service("orders", "prod");
        svc.spec.adopt = Some(AdoptOptions {
            mode: AdoptMode::Override,
            id: "service-404".to_string(),
        });
        h.store.insert(svc);

        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        let adopted = h.status(KEY).condition(condition_types::ADOPTED).cloned().unwrap();
        assert_eq!(adopted.reason, reasons::ADOPTION_TARGET_NOT_FOUND);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 0);
    }

    #[tokio::test]
    async fn finalizer_outlives_a_failed_remote_delete() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.pass(KEY).await;
        let id = h.status(KEY).remote_id().unwrap().to_string();

        h.store.delete(KEY);
        h.remote
            .fail_next(RemoteOp::Delete, RemoteError::transient("connection reset"));
        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        assert!(has_finalizer(&h.object(KEY), REMOTE_CLEANUP_FINALIZER));
        assert!(h.remote.entities(EntityKind::Service, &cp1()).contains_key(&id));

        assert_eq!(h.pass(KEY).await, PassOutcome::Released);
        assert!(h.store.get(KEY).is_none());
        assert!(h.remote.entities(EntityKind::Service, &cp1()).is_empty());
        assert!(h
            .event_reasons()
            .contains(&event_reasons::REMOTE_DELETED.to_string()));
    }

    #[tokio::test]
    async fn deletion_without_recorded_id_sweeps_by_tag() {
        let h = Harness::<GantryService>::new();
        let mut svc = service("orders", "prod");
        svc.metadata.finalizers = Some(vec![REMOTE_CLEANUP_FINALIZER.to_string()]);
        let mut payload = json!({ "name": "orders" });
        apply_tags(EntityKind::Service, &mut payload, &entity_tags(&svc));
        h.remote
            .insert(EntityKind::Service, &cp1(), "service-5", payload)
            .unwrap();
        h.store.insert(svc);
        h.store.delete(KEY);

        assert_eq!(h.pass(KEY).await, PassOutcome::Released);
        assert!(h.remote.entities(EntityKind::Service, &cp1()).is_empty());
        assert!(h.store.get(KEY).is_none());
    }

    #[tokio::test]
    async fn control_plane_loss_releases_and_recreation_reprograms() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.pass(KEY).await;
        assert!(h.status(KEY).remote_id().is_some());

        h.parents.remove_control_plane("team-a", "prod");
        assert_eq!(
            h.pass(KEY).await,
            PassOutcome::Retry(h.ctx.settings.dependency_backoff)
        );
        let obj = h.object(KEY);
        let status = obj.entity_status().cloned().unwrap();
        assert_eq!(status.remote_id(), None);
        assert!(!has_finalizer(&obj, REMOTE_CLEANUP_FINALIZER));
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::False, reasons::CONTROL_PLANE_LOST.to_string()))
        );
        assert!(h
            .event_reasons()
            .contains(&event_reasons::CONTROL_PLANE_LOST.to_string()));

        // Still gone: a plain dependency wait, nothing else changes.
        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));

        h.parents
            .set_control_plane("team-a", "prod", control_plane_state("team-a", "cp-2"));
        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let remote = h.status(KEY).remote.unwrap();
        assert_eq!(remote.control_plane_id.as_deref(), Some("cp-2"));
        assert_eq!(
            h.remote
                .entities(EntityKind::Service, &RemoteScope::control_plane("cp-2"))
                .len(),
            1
        );
        assert!(has_finalizer(&h.object(KEY), REMOTE_CLEANUP_FINALIZER));
    }

    #[tokio::test]
    async fn changed_control_plane_id_counts_as_loss() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.pass(KEY).await;

        h.parents
            .set_control_plane("team-a", "prod", control_plane_state("team-a", "cp-2"));
        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        assert_eq!(h.status(KEY).remote_id(), None);

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        assert_eq!(
            h.status(KEY).remote.unwrap().control_plane_id.as_deref(),
            Some("cp-2")
        );
    }

    #[tokio::test]
    async fn out_of_band_delete_is_recreated_in_the_same_pass() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.pass(KEY).await;
        let first = h.status(KEY).remote_id().unwrap().to_string();
        h.remote.remove(EntityKind::Service, &cp1(), &first).unwrap();

        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        let second = h.status(KEY).remote_id().unwrap().to_string();
        assert_ne!(first, second);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_bounds_the_retry() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.remote.fail_next(
            RemoteOp::Create,
            RemoteError::RateLimited {
                retry_after: Some(Duration::from_secs(120)),
            },
        );

        match h.pass(KEY).await {
            PassOutcome::Retry(delay) => assert!(delay >= Duration::from_secs(120)),
            other => panic!("expected retry, got {other:?}"),
        }
        let status = h.status(KEY);
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::Unknown, reasons::REMOTE_TRANSIENT_ERROR.to_string()))
        );
        // The finalizer went on before the create was attempted.
        assert!(has_finalizer(&h.object(KEY), REMOTE_CLEANUP_FINALIZER));
    }

    #[tokio::test]
    async fn rejected_payload_waits_for_a_spec_change() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.remote
            .fail_next(RemoteOp::Create, RemoteError::terminal("port out of range"));

        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        assert_eq!(
            programmed_reason(&h.status(KEY)),
            Some((ConditionStatus::False, reasons::REMOTE_REJECTED.to_string()))
        );

        // Re-deliveries of the same generation leave the remote alone.
        h.remote
            .fail_next(RemoteOp::Create, RemoteError::terminal("port out of range"));
        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 1);

        let mut svc = h.object(KEY);
        svc.spec.port = 8080;
        svc.metadata.generation = Some(2);
        h.store.insert(svc);
        // The queued fault fires on the retry of the new generation.
        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 2);

        let mut svc = h.object(KEY);
        svc.metadata.generation = Some(3);
        h.store.insert(svc);
        assert_eq!(h.pass(KEY).await, PassOutcome::Converged);
        assert!(h.status(KEY).is_programmed(3));
    }

    fn consumer_harness() -> Harness<GantryConsumer> {
        let h = Harness::<GantryConsumer>::new();
        for (name, id) in [("gold", "cg-gold"), ("beta", "cg-beta")] {
            h.remote
                .insert(EntityKind::ConsumerGroup, &cp1(), id, json!({ "name": name }))
                .unwrap();
            h.parents.set_parent(
                ParentRole::ConsumerGroup,
                "team-a",
                name,
                parent_state("team-a", Some(id), Some("cp-1"), Some("prod")),
            );
        }
        h
    }

    #[tokio::test]
    async fn consumer_group_membership_follows_the_spec() {
        let h = consumer_harness();
        let key = "team-a/alice";
        h.store.insert(consumer("alice", "prod", &["gold"]));

        assert_eq!(h.pass(key).await, PassOutcome::Converged);
        let id = h.status(key).remote_id().unwrap().to_string();
        assert!(h.remote.group_members(&cp1(), "cg-gold").contains(&id));
        assert!(h.remote.group_members(&cp1(), "cg-beta").is_empty());

        let mut alice = h.object(key);
        alice.spec.consumer_groups = vec!["beta".to_string()];
        alice.metadata.generation = Some(2);
        h.store.insert(alice);
        assert_eq!(h.pass(key).await, PassOutcome::Converged);
        assert!(h.remote.group_members(&cp1(), "cg-gold").is_empty());
        assert!(h.remote.group_members(&cp1(), "cg-beta").contains(&id));

        // Converged memberships need no further writes.
        assert_eq!(h.pass(key).await, PassOutcome::Converged);
        assert_eq!(h.remote.call_count(RemoteOp::AddToGroup), 2);
        assert_eq!(h.remote.call_count(RemoteOp::RemoveFromGroup), 1);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 1);
    }

    #[tokio::test]
    async fn failed_membership_write_keeps_the_created_consumer() {
        let h = consumer_harness();
        let key = "team-a/alice";
        h.store.insert(consumer("alice", "prod", &["gold"]));
        h.remote
            .fail_next(RemoteOp::AddToGroup, RemoteError::transient("502 bad gateway"));

        assert!(matches!(h.pass(key).await, PassOutcome::Retry(_)));
        let status = h.status(key);
        let id = status.remote_id().unwrap().to_string();
        assert_eq!(
            programmed_reason(&status),
            Some((ConditionStatus::Unknown, reasons::REMOTE_TRANSIENT_ERROR.to_string()))
        );
        assert!(has_finalizer(&h.object(key), REMOTE_CLEANUP_FINALIZER));

        assert_eq!(h.pass(key).await, PassOutcome::Converged);
        assert_eq!(h.remote.call_count(RemoteOp::Create), 1);
        assert!(h.remote.group_members(&cp1(), "cg-gold").contains(&id));
        assert!(h.status(key).is_programmed(1));
    }

    #[tokio::test]
    async fn release_forgets_retry_attempts() {
        let h = Harness::<GantryService>::new();
        let mut svc = service("orders", "prod");
        svc.metadata.finalizers = Some(vec!["example.com/other".to_string()]);
        h.store.insert(svc);
        h.ctx.backoff.next_delay(KEY);
        h.store.delete(KEY);

        assert_eq!(h.pass(KEY).await, PassOutcome::Released);
        assert_eq!(h.ctx.backoff.attempts(KEY), 0);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn parent_lookup_failure_is_a_retryable_error() {
        let mut parents = MockParentLookup::new();
        parents
            .expect_control_plane()
            .returning(|_, _| Err(gantry_common::Error::internal("apiserver unavailable")));
        let store = Arc::new(MemoryStore::<GantryService>::new());
        store.insert(service("orders", "prod"));
        let remote = Arc::new(InMemoryRemote::new());
        let mut grants = MockGrantLookup::new();
        grants.expect_permits().returning(|_| Ok(true));
        let ctx = EntityContext::from_parts(
            store.clone(),
            Arc::new(parents),
            Arc::new(grants),
            Arc::new(StaticClientFactory::new(remote.clone())),
            Arc::new(RecordingEvents::default()),
            EngineSettings::default(),
            CancellationToken::new(),
        );

        let obj = store.get(KEY).unwrap();
        let err = reconcile_entity(&obj, &ctx).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn read_only_control_plane_makes_no_remote_calls() {
        let h = Harness::<GantryService>::new();
        h.parents.set_control_plane(
            "team-a",
            "prod",
            ControlPlaneState {
                read_only: true,
                ..control_plane_state("team-a", "cp-1")
            },
        );
        h.store.insert(service("orders", "prod"));

        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn route_waits_for_its_service() {
        let h = Harness::<gantry_common::crd::GantryRoute>::new();
        h.parents.set_parent(
            ParentRole::Service,
            "team-a",
            "orders",
            parent_state("team-a", None, None, Some("prod")),
        );
        h.store.insert(route("checkout", "orders"));
        let key = "team-a/checkout";

        assert_eq!(
            h.pass(key).await,
            PassOutcome::Retry(h.ctx.settings.dependency_backoff)
        );
        assert!(h.remote.calls().is_empty());
        let status = h.status(key);
        assert_eq!(
            status.condition(condition_types::SERVICE_REF_VALID).unwrap().reason,
            reasons::MISSING_DEPENDENCY
        );

        h.parents.set_parent(
            ParentRole::Service,
            "team-a",
            "orders",
            parent_state("team-a", Some("service-1"), Some("cp-1"), Some("prod")),
        );
        assert_eq!(h.pass(key).await, PassOutcome::Converged);
        let route_entity = h
            .remote
            .entities(EntityKind::Route, &cp1())
            .into_values()
            .next()
            .unwrap();
        assert_eq!(route_entity["service"], json!({ "id": "service-1" }));
    }

    #[tokio::test]
    async fn shutdown_aborts_remote_calls() {
        let h = Harness::<GantryService>::new();
        h.store.insert(service("orders", "prod"));
        h.ctx.shutdown.cancel();

        assert!(matches!(h.pass(KEY).await, PassOutcome::Retry(_)));
        assert!(h.remote.calls().is_empty());
        assert_eq!(
            programmed_reason(&h.status(KEY)).map(|(s, _)| s),
            Some(ConditionStatus::Unknown)
        );
    }

    #[test]
    fn outcomes_map_to_actions() {
        let sync = Duration::from_secs(600);
        assert_eq!(PassOutcome::Converged.action(sync), Action::requeue(sync));
        assert_eq!(
            PassOutcome::Retry(Duration::from_secs(5)).action(sync),
            Action::requeue(Duration::from_secs(5))
        );
        assert_eq!(PassOutcome::AwaitChange.action(sync), Action::await_change());
        assert_eq!(PassOutcome::Released.metric(), ReconcileOutcome::Converged);
    }

    #[tokio::test]
    async fn invalid_spec_is_fatal_and_reported() {
        let h = Harness::<GantryService>::new();
        let mut svc = service("orders", "prod");
        svc.spec.host = String::new();
        h.store.insert(svc);

        assert_eq!(h.pass(KEY).await, PassOutcome::AwaitChange);
        assert_eq!(
            programmed_reason(&h.status(KEY)),
            Some((ConditionStatus::False, reasons::INVALID_SPEC.to_string()))
        );
    }
}
