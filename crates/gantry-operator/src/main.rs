//! gantry operator - keeps a hosted gateway configuration in sync with gantry.dev resources

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;

use gantry_common::telemetry::{init_telemetry, TelemetryConfig};
use gantry_operator::config::{Cli, RemoteMode, Settings};
use gantry_operator::controller_runner::{
    build_entity_controllers, build_plugin_binding_controllers, build_reference_grant_controllers,
};
use gantry_operator::crds::{crd_manifests, ensure_crds_installed};
use gantry_remote::{
    HttpClientFactory, InMemoryRemote, RemoteClientFactory, StaticClientFactory,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", crd_manifests()?);
        return Ok(());
    }

    let _telemetry = init_telemetry(TelemetryConfig {
        service_name: "gantry-operator".to_string(),
        otlp_endpoint: cli.settings.otlp_endpoint.clone(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    cli.settings.validate()?;
    run_controllers(cli.settings).await
}

async fn run_controllers(settings: Settings) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kube client: {e}"))?;

    ensure_crds_installed(&client).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let remotes: Arc<dyn RemoteClientFactory> = match settings.remote {
        RemoteMode::Http => Arc::new(HttpClientFactory::new(Duration::from_secs(
            settings.remote_timeout_secs,
        ))),
        RemoteMode::Memory => {
            tracing::warn!("Using the in-memory remote; nothing leaves this process");
            Arc::new(StaticClientFactory::new(Arc::new(InMemoryRemote::new())))
        }
    };

    tracing::info!("Starting gantry controllers:");
    let mut controllers =
        build_entity_controllers(client.clone(), remotes, &settings, shutdown.clone());
    controllers.extend(build_plugin_binding_controllers(client.clone(), &settings));
    controllers.extend(build_reference_grant_controllers(client, &settings));

    futures::future::join_all(controllers).await;

    shutdown.cancel();
    tracing::info!("gantry operator shutting down");
    Ok(())
}

/// Cancel in-flight remote calls once SIGINT or SIGTERM arrives
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
