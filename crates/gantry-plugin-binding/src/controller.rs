//! Plugin definition controller that owns derived bindings
//!
//! Each pass recomputes, for one GantryPlugin, the bindings its annotations
//! call for and converges the labelled set of derived bindings onto them.
//! Bindings are matched by namespace and exact target set, never by name,
//! so repeated passes never create duplicates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use gantry_common::crd::{
    BindingScope, GantryConsumer, GantryConsumerGroup, GantryPlugin, GantryPluginBinding,
    GantryPluginBindingSpec, GantryRoute, GantryService, NamespacedRef,
};
use gantry_common::events::{actions, reasons};
use gantry_common::kube_utils::{derived_name, has_finalizer, is_terminating, object_key};
use gantry_common::metrics::{record_derived_binding, ReconcileOutcome, ReconcileTimer};
use gantry_common::{
    EventPublisher, GrantLookup, GrantRequest, KubeEventPublisher, KubeGrantLookup,
    MANAGED_BY_LABEL, PLUGIN_ANNOTATION, PLUGIN_IN_USE_FINALIZER,
};

use crate::annotation::{BindableKind, PluginKey};
use crate::combination::{combinations, Annotated, DesiredBinding};
use crate::index::AnnotationIndex;
use crate::store::{BindingStore, KubeBindingStore};
use crate::{Error, MANAGER_NAME};

/// Requeue interval while derived bindings are still being removed
const PENDING_RELEASE: Duration = Duration::from_secs(5);

/// Shared context for the plugin binding controller
pub struct PluginBindingContext {
    /// Annotated objects and derived bindings
    pub store: Arc<dyn BindingStore>,
    /// Cross-namespace annotation checks
    pub grants: Arc<dyn GrantLookup>,
    /// Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Last plugin named by each bindable object
    pub index: Arc<AnnotationIndex>,
    /// Periodic resync interval
    pub resync: Duration,
}

impl PluginBindingContext {
    /// Context backed by the Kubernetes API
    pub fn new(client: Client, index: Arc<AnnotationIndex>, resync: Duration) -> Self {
        Self {
            store: Arc::new(KubeBindingStore::new(client.clone())),
            grants: Arc::new(KubeGrantLookup::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, MANAGER_NAME)),
            index,
            resync,
        }
    }
}

/// Controller over plugin definitions, triggered by annotated objects and derived bindings
///
/// Derived bindings may live in another namespace than their plugin, so
/// they are mapped back through their plugin reference rather than owner
/// references.
pub fn plugin_binding_controller(
    client: Client,
    index: Arc<AnnotationIndex>,
    watch_timeout: u32,
) -> Controller<GantryPlugin> {
    let watcher = || WatcherConfig::default().timeout(watch_timeout);
    let (services, routes, consumers, groups) =
        (index.clone(), index.clone(), index.clone(), index);
    Controller::new(Api::<GantryPlugin>::all(client.clone()), watcher())
        .watches(
            Api::<GantryPluginBinding>::all(client.clone()),
            watcher().labels(&format!("{MANAGED_BY_LABEL}={MANAGER_NAME}")),
            |binding: GantryPluginBinding| plugin_of_binding(&binding),
        )
        .watches(
            Api::<GantryService>::all(client.clone()),
            watcher(),
            move |obj: GantryService| services.observe(BindableKind::Service, obj.meta()),
        )
        .watches(
            Api::<GantryRoute>::all(client.clone()),
            watcher(),
            move |obj: GantryRoute| routes.observe(BindableKind::Route, obj.meta()),
        )
        .watches(
            Api::<GantryConsumer>::all(client.clone()),
            watcher(),
            move |obj: GantryConsumer| consumers.observe(BindableKind::Consumer, obj.meta()),
        )
        .watches(
            Api::<GantryConsumerGroup>::all(client),
            watcher(),
            move |obj: GantryConsumerGroup| groups.observe(BindableKind::ConsumerGroup, obj.meta()),
        )
}

fn plugin_of_binding(binding: &GantryPluginBinding) -> Option<ObjectRef<GantryPlugin>> {
    let namespace = binding.namespace()?;
    let plugin = &binding.spec.plugin_ref;
    Some(ObjectRef::new(&plugin.name).within(plugin.resolve_namespace(&namespace)))
}

/// Reconcile the derived bindings of one plugin definition
#[instrument(skip(plugin, ctx), fields(plugin = %object_key(plugin.as_ref())))]
pub async fn reconcile(
    plugin: Arc<GantryPlugin>,
    ctx: Arc<PluginBindingContext>,
) -> Result<Action, Error> {
    let timer = ReconcileTimer::start("GantryPlugin");
    let result = sync_plugin(&plugin, &ctx).await;
    timer.finish(match &result {
        Ok(_) => ReconcileOutcome::Converged,
        Err(e) if e.is_retryable() => ReconcileOutcome::Error,
        Err(_) => ReconcileOutcome::Fatal,
    });
    result
}

/// Requeue policy for failed passes
pub fn error_policy(
    _plugin: Arc<GantryPlugin>,
    error: &Error,
    _ctx: Arc<PluginBindingContext>,
) -> Action {
    if error.is_retryable() {
        warn!(%error, "plugin binding pass failed, retrying");
        Action::requeue(PENDING_RELEASE)
    } else {
        warn!(%error, "plugin binding pass failed");
        Action::await_change()
    }
}

/// One pass over a plugin definition
pub async fn sync_plugin(plugin: &GantryPlugin, ctx: &PluginBindingContext) -> Result<Action, Error> {
    let key = PluginKey::of(plugin)?;
    let existing: Vec<GantryPluginBinding> = ctx
        .store
        .derived_bindings(&key)
        .await?
        .into_iter()
        .filter(|b| binds_plugin(b, &key))
        .collect();
    let desired = if is_terminating(plugin) {
        Vec::new()
    } else {
        desired_bindings(&key, ctx).await?
    };

    for binding in &existing {
        if is_terminating(binding) || desired.iter().any(|d| matches(binding, d)) {
            continue;
        }
        let namespace = binding.namespace().unwrap_or_default();
        ctx.store
            .delete_binding(&namespace, &binding.name_any())
            .await?;
        record_derived_binding("deleted");
        info!(binding = %object_key(binding), "deleted derived plugin binding");
        ctx.events
            .publish(
                &plugin.object_ref(&()),
                EventType::Normal,
                reasons::BINDING_DELETED,
                actions::DELETE,
                Some(format!("Deleted binding {}", object_key(binding))),
            )
            .await;
    }

    if desired.is_empty() {
        if !existing.is_empty() {
            debug!(remaining = existing.len(), "waiting for derived bindings to go away");
            return Ok(Action::requeue(PENDING_RELEASE));
        }
        if has_finalizer(plugin, PLUGIN_IN_USE_FINALIZER) {
            ctx.store.remove_in_use(&key).await?;
            debug!("released plugin, no derived bindings left");
        }
        return Ok(if is_terminating(plugin) {
            Action::await_change()
        } else {
            Action::requeue(ctx.resync)
        });
    }

    if !has_finalizer(plugin, PLUGIN_IN_USE_FINALIZER) {
        ctx.store.add_in_use(&key).await?;
    }
    for wanted in &desired {
        if existing.iter().any(|b| matches(b, wanted)) {
            continue;
        }
        let binding = derived_binding(plugin, &key, wanted);
        ctx.store.apply_binding(&binding).await?;
        record_derived_binding("created");
        info!(binding = %object_key(&binding), targets = %wanted.targets.key(), "created derived plugin binding");
        ctx.events
            .publish(
                &plugin.object_ref(&()),
                EventType::Normal,
                reasons::BINDING_CREATED,
                actions::CREATE,
                Some(format!("Created binding {}", object_key(&binding))),
            )
            .await;
    }
    Ok(Action::requeue(ctx.resync))
}

/// Bindings the current annotations call for, with denied cross-namespace references dropped
async fn desired_bindings(
    key: &PluginKey,
    ctx: &PluginBindingContext,
) -> Result<Vec<DesiredBinding>, Error> {
    let annotated = ctx.store.annotated().await?;
    let plugin_kind = GantryPlugin::kind(&());
    let mut permitted: Vec<&Annotated> = Vec::new();
    for obj in annotated
        .iter()
        .filter(|a| a.plugin == *key && !a.terminating)
    {
        let request = GrantRequest::new(
            obj.kind.kind(),
            &obj.namespace,
            &plugin_kind,
            &key.namespace,
            &key.name,
        );
        if request.is_cross_namespace() && !ctx.grants.permits(&request).await? {
            warn!(
                kind = obj.kind.kind(),
                object = %format!("{}/{}", obj.namespace, obj.name),
                plugin = %key,
                "plugin annotation not permitted by any reference grant"
            );
            ctx.events
                .publish(
                    &obj.reference,
                    EventType::Warning,
                    reasons::REFERENCE_NOT_PERMITTED,
                    actions::RECONCILE,
                    Some(format!(
                        "No reference grant in {} permits {} from {} to use plugin {}",
                        key.namespace,
                        obj.kind.kind(),
                        obj.namespace,
                        key.name
                    )),
                )
                .await;
            continue;
        }
        permitted.push(obj);
    }
    Ok(combinations(&permitted))
}

fn binds_plugin(binding: &GantryPluginBinding, key: &PluginKey) -> bool {
    let namespace = binding.namespace().unwrap_or_default();
    let plugin = &binding.spec.plugin_ref;
    plugin.name == key.name && plugin.resolve_namespace(&namespace) == key.namespace
}

fn matches(binding: &GantryPluginBinding, desired: &DesiredBinding) -> bool {
    binding.namespace().as_deref() == Some(desired.namespace.as_str())
        && binding.spec.targets == desired.targets
}

/// The derived binding object for one target combination
///
/// The control plane is left to the engine, which inherits it from the
/// first target. Owner references cannot cross namespaces, so only
/// bindings next to their plugin are owned by it.
pub fn derived_binding(
    plugin: &GantryPlugin,
    key: &PluginKey,
    desired: &DesiredBinding,
) -> GantryPluginBinding {
    let name = derived_name(
        &key.name,
        &[&key.namespace, &key.name, &desired.namespace, &desired.targets.key()],
    );
    let plugin_ref = NamespacedRef {
        name: key.name.clone(),
        namespace: (key.namespace != desired.namespace).then(|| key.namespace.clone()),
    };
    let mut binding = GantryPluginBinding::new(
        &name,
        GantryPluginBindingSpec {
            plugin_ref,
            targets: desired.targets.clone(),
            control_plane_ref: None,
            scope: BindingScope::OnlyTargets,
            tags: vec![],
            adopt: None,
        },
    );
    let meta = binding.meta_mut();
    meta.namespace = Some(desired.namespace.clone());
    meta.labels = Some(BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string()),
        (PLUGIN_ANNOTATION.to_string(), key.label_value()),
    ]));
    if key.namespace == desired.namespace {
        meta.owner_references = plugin.controller_owner_ref(&()).map(|owner| vec![owner]);
    }
    binding
}
