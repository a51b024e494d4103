//! Controllers keeping derived grants in line with authored ones
//!
//! The derivation controller converges the derived grants of each authored
//! ReferenceGrant. The orphan controller removes derived grants whose
//! source is gone or was replaced by an object with another uid.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

use gantry_common::crd::{GantryReferenceGrant, ReferenceGrant};
use gantry_common::kube_utils::{is_terminating, object_key};
use gantry_common::metrics::{ReconcileOutcome, ReconcileTimer};

use crate::derive::{derive_specs, derived_grant};
use crate::store::{GrantStore, KubeGrantStore};
use crate::{Error, SOURCE_LABEL};

/// Requeue interval after a retryable failure
const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Shared context for both grant controllers
pub struct GrantContext {
    /// Authored and derived grants
    pub store: Arc<dyn GrantStore>,
    /// Periodic resync interval
    pub resync: Duration,
}

impl GrantContext {
    /// Context backed by the Kubernetes API
    pub fn new(client: Client, resync: Duration) -> Self {
        Self {
            store: Arc::new(KubeGrantStore::new(client)),
            resync,
        }
    }
}

fn derived_watcher(watch_timeout: u32) -> WatcherConfig {
    WatcherConfig::default()
        .timeout(watch_timeout)
        .labels(SOURCE_LABEL)
}

/// Controller over authored grants, also triggered by the grants derived from them
pub fn reference_grant_controller(client: Client, watch_timeout: u32) -> Controller<ReferenceGrant> {
    Controller::new(
        Api::<ReferenceGrant>::all(client.clone()),
        WatcherConfig::default().timeout(watch_timeout),
    )
    .owns(
        Api::<GantryReferenceGrant>::all(client),
        derived_watcher(watch_timeout),
    )
}

/// Controller over derived grants that removes orphans
pub fn orphan_controller(client: Client, watch_timeout: u32) -> Controller<GantryReferenceGrant> {
    Controller::new(
        Api::<GantryReferenceGrant>::all(client),
        derived_watcher(watch_timeout),
    )
}

/// Reconcile the derived grants of one authored grant
#[instrument(skip(authored, ctx), fields(grant = %object_key(authored.as_ref())))]
pub async fn reconcile(authored: Arc<ReferenceGrant>, ctx: Arc<GrantContext>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start("ReferenceGrant");
    let result = sync_grant(&authored, &ctx).await;
    timer.finish(outcome(&result));
    result
}

/// One pass over an authored grant
pub async fn sync_grant(authored: &ReferenceGrant, ctx: &GrantContext) -> Result<Action, Error> {
    if is_terminating(authored) {
        // derived grants are garbage collected with their owner
        return Ok(Action::await_change());
    }
    let namespace = authored
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(authored.name_any()))?;
    let desired = derive_specs(authored)
        .into_iter()
        .map(|spec| derived_grant(authored, spec))
        .collect::<Result<Vec<_>, _>>()?;
    let existing = ctx.store.derived(&namespace, &authored.name_any()).await?;

    for grant in &existing {
        if desired.iter().any(|d| d.spec == grant.spec) {
            continue;
        }
        ctx.store.delete(&namespace, &grant.name_any()).await?;
        info!(derived = %grant.name_any(), "deleted stale derived grant");
    }
    for grant in &desired {
        if existing.iter().any(|e| e.spec == grant.spec) {
            continue;
        }
        ctx.store.apply(grant).await?;
        info!(
            derived = %grant.name_any(),
            from = %grant.spec.from.kind,
            from_namespace = %grant.spec.from.namespace,
            to = %grant.spec.to.kind,
            "created derived grant"
        );
    }
    Ok(Action::requeue(ctx.resync))
}

/// Delete a derived grant whose authored grant no longer exists
#[instrument(skip(derived, ctx), fields(derived = %object_key(derived.as_ref())))]
pub async fn reconcile_derived(
    derived: Arc<GantryReferenceGrant>,
    ctx: Arc<GrantContext>,
) -> Result<Action, Error> {
    let timer = ReconcileTimer::start("GantryReferenceGrant");
    let result = remove_if_orphaned(&derived, &ctx).await;
    timer.finish(outcome(&result));
    result
}

/// Delete `derived` when its source grant is gone
pub async fn remove_if_orphaned(
    derived: &GantryReferenceGrant,
    ctx: &GrantContext,
) -> Result<Action, Error> {
    if is_terminating(derived) {
        return Ok(Action::await_change());
    }
    let Some(owner) = derived
        .owner_references()
        .iter()
        .find(|o| o.kind == "ReferenceGrant")
    else {
        debug!("derived grant without source owner, leaving it alone");
        return Ok(Action::await_change());
    };
    let namespace = derived
        .namespace()
        .ok_or_else(|| Error::MissingNamespace(derived.name_any()))?;

    match ctx.store.source_uid(&namespace, &owner.name).await? {
        Some(uid) if uid == owner.uid => Ok(Action::requeue(ctx.resync)),
        _ => {
            ctx.store.delete(&namespace, &derived.name_any()).await?;
            info!(source = %owner.name, "deleted orphaned derived grant");
            Ok(Action::await_change())
        }
    }
}

/// Requeue policy for failed passes of either controller
pub fn error_policy<K>(_obj: Arc<K>, error: &Error, _ctx: Arc<GrantContext>) -> Action {
    if error.is_retryable() {
        warn!(%error, "grant pass failed, retrying");
        Action::requeue(RETRY_DELAY)
    } else {
        warn!(%error, "grant pass failed");
        Action::await_change()
    }
}

fn outcome(result: &Result<Action, Error>) -> ReconcileOutcome {
    match result {
        Ok(_) => ReconcileOutcome::Converged,
        Err(e) if e.is_retryable() => ReconcileOutcome::Error,
        Err(_) => ReconcileOutcome::Fatal,
    }
}
