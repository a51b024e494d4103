//! Controller runner - builds controller futures for each component
//!
//! Each `build_*` function returns boxed futures the caller composes, so
//! construction stays free of side effects until the futures are polled.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::Client;
use tokio_util::sync::CancellationToken;

use gantry_common::crd::{
    GantryCACertificate, GantryCertificate, GantryCloudNetwork, GantryConsumer,
    GantryConsumerGroup, GantryControlPlane, GantryCredentialApiKey, GantryCredentialBasicAuth,
    GantryDataPlaneCertificate, GantryKey, GantryKeySet, GantryPluginBinding, GantryRoute,
    GantryService, GantrySni, GantryTarget, GantryUpstream, GantryVault,
};
use gantry_common::KubeEventPublisher;
use gantry_entity::{
    entity_controller, error_policy, reconcile, EngineSettings, EntityContext, ManagedEntity,
    WatchSettings,
};
use gantry_plugin_binding::{AnnotationIndex, PluginBindingContext};
use gantry_reference_grant::GrantContext;
use gantry_remote::RemoteClientFactory;

use crate::config::Settings;

/// A controller run to completion by the caller
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Everything an entity controller needs besides its kind
#[derive(Clone)]
struct EntityWiring {
    client: Client,
    remotes: Arc<dyn RemoteClientFactory>,
    engine: EngineSettings,
    watch: WatchSettings,
    shutdown: CancellationToken,
}

impl EntityWiring {
    fn controller<E: ManagedEntity>(&self) -> ControllerFuture {
        let name = E::REMOTE_KIND.as_str();
        let events = Arc::new(KubeEventPublisher::new(
            self.client.clone(),
            &format!("gantry-{name}"),
        ));
        let ctx = Arc::new(EntityContext::<E>::new(
            self.client.clone(),
            self.remotes.clone(),
            events,
            self.engine.clone(),
            self.shutdown.clone(),
        ));

        tracing::info!("- {} controller", name);

        Box::pin(
            entity_controller::<E>(self.client.clone(), self.watch)
                .shutdown_on_signal()
                .run(reconcile::<E>, error_policy::<E>, ctx)
                .for_each(log_reconcile_result(name)),
        )
    }
}

fn watch_settings(settings: &Settings) -> WatchSettings {
    WatchSettings {
        timeout_secs: settings.watch_timeout_secs,
        concurrency: settings.concurrency,
    }
}

/// Build one controller per remote-backed kind
pub fn build_entity_controllers(
    client: Client,
    remotes: Arc<dyn RemoteClientFactory>,
    settings: &Settings,
    shutdown: CancellationToken,
) -> Vec<ControllerFuture> {
    let wiring = EntityWiring {
        client,
        remotes,
        engine: settings.engine(),
        watch: watch_settings(settings),
        shutdown,
    };

    vec![
        wiring.controller::<GantryControlPlane>(),
        wiring.controller::<GantryCloudNetwork>(),
        wiring.controller::<GantryService>(),
        wiring.controller::<GantryRoute>(),
        wiring.controller::<GantryConsumer>(),
        wiring.controller::<GantryConsumerGroup>(),
        wiring.controller::<GantryCredentialBasicAuth>(),
        wiring.controller::<GantryCredentialApiKey>(),
        wiring.controller::<GantryPluginBinding>(),
        wiring.controller::<GantryUpstream>(),
        wiring.controller::<GantryTarget>(),
        wiring.controller::<GantryCertificate>(),
        wiring.controller::<GantryCACertificate>(),
        wiring.controller::<GantrySni>(),
        wiring.controller::<GantryKey>(),
        wiring.controller::<GantryKeySet>(),
        wiring.controller::<GantryVault>(),
        wiring.controller::<GantryDataPlaneCertificate>(),
    ]
}

/// Build the plugin binding manager
pub fn build_plugin_binding_controllers(client: Client, settings: &Settings) -> Vec<ControllerFuture> {
    let index = Arc::new(AnnotationIndex::new());
    let ctx = Arc::new(PluginBindingContext::new(
        client.clone(),
        index.clone(),
        settings.sync_period(),
    ));

    tracing::info!("- plugin binding controller");

    vec![Box::pin(
        gantry_plugin_binding::plugin_binding_controller(client, index, settings.watch_timeout_secs)
            .shutdown_on_signal()
            .run(
                gantry_plugin_binding::reconcile,
                gantry_plugin_binding::error_policy,
                ctx,
            )
            .for_each(log_reconcile_result("PluginBinding")),
    )]
}

/// Build the reference grant derivation and orphan cleanup controllers
pub fn build_reference_grant_controllers(
    client: Client,
    settings: &Settings,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(GrantContext::new(client.clone(), settings.sync_period()));
    let watch_timeout = settings.watch_timeout_secs;

    tracing::info!("- reference grant controllers");

    let derivation = gantry_reference_grant::reference_grant_controller(client.clone(), watch_timeout)
        .shutdown_on_signal()
        .run(
            gantry_reference_grant::reconcile,
            gantry_reference_grant::error_policy,
            ctx.clone(),
        )
        .for_each(log_reconcile_result("ReferenceGrant"));

    let orphans = gantry_reference_grant::orphan_controller(client, watch_timeout)
        .shutdown_on_signal()
        .run(
            gantry_reference_grant::reconcile_derived,
            gantry_reference_grant::error_policy,
            ctx,
        )
        .for_each(log_reconcile_result("GantryReferenceGrant"));

    vec![Box::pin(derivation), Box::pin(orphans)]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
