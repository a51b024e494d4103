//! CRD installation and manifest output
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! they always match the operator version. ReferenceGrant belongs to the
//! Gateway API and is never installed here.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use gantry_common::crd::{
    GantryAuthConfiguration, GantryCACertificate, GantryCertificate, GantryCloudNetwork,
    GantryConsumer, GantryConsumerGroup, GantryControlPlane, GantryCredentialApiKey,
    GantryCredentialBasicAuth, GantryDataPlaneCertificate, GantryKey, GantryKeySet, GantryPlugin,
    GantryPluginBinding, GantryReferenceGrant, GantryRoute, GantryService, GantrySni,
    GantryTarget, GantryUpstream, GantryVault,
};
use gantry_common::retry::{retry_with_backoff, RetryConfig};
use gantry_common::FIELD_MANAGER;

/// Attempts per CRD before startup gives up
const INSTALL_ATTEMPTS: u32 = 5;

/// Every CRD owned by gantry
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        GantryAuthConfiguration::crd(),
        GantryControlPlane::crd(),
        GantryCloudNetwork::crd(),
        GantryService::crd(),
        GantryRoute::crd(),
        GantryConsumer::crd(),
        GantryConsumerGroup::crd(),
        GantryCredentialBasicAuth::crd(),
        GantryCredentialApiKey::crd(),
        GantryPlugin::crd(),
        GantryPluginBinding::crd(),
        GantryUpstream::crd(),
        GantryTarget::crd(),
        GantryCertificate::crd(),
        GantryCACertificate::crd(),
        GantrySni::crd(),
        GantryKey::crd(),
        GantryKeySet::crd(),
        GantryVault::crd(),
        GantryDataPlaneCertificate::crd(),
        GantryReferenceGrant::crd(),
    ]
}

/// All CRDs as one multi-document YAML stream
pub fn crd_manifests() -> anyhow::Result<String> {
    let docs = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {e}"))?;
    Ok(docs.join("---\n"))
}

/// Install or update every gantry CRD
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    let retry = RetryConfig::with_max_attempts(INSTALL_ATTEMPTS);

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!("Installing {name} CRD...");
        retry_with_backoff(&retry, "install_crd", || async {
            crds.patch(&name, &params, &Patch::Apply(&crd)).await
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {name} CRD: {e}"))?;
    }
    tracing::info!("All gantry CRDs installed/updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_crd_is_named_and_in_the_gantry_group() {
        let crds = all_crds();
        assert_eq!(crds.len(), 21);
        for crd in &crds {
            let name = crd.metadata.name.as_deref().unwrap();
            assert!(name.ends_with(".gantry.dev"), "{name}");
            assert_eq!(crd.spec.group, "gantry.dev");
        }
    }

    #[test]
    fn remote_backed_crds_have_status() {
        for crd in all_crds() {
            let kind = crd.spec.names.kind.clone();
            let has_status = crd.spec.versions[0]
                .subresources
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .is_some();
            let non_remote = ["GantryAuthConfiguration", "GantryPlugin", "GantryReferenceGrant"];
            assert_eq!(has_status, !non_remote.contains(&kind.as_str()), "{kind}");
        }
    }

    #[test]
    fn manifests_are_one_document_per_crd() {
        let yaml = crd_manifests().unwrap();
        assert_eq!(yaml.matches("kind: CustomResourceDefinition").count(), 21);
        assert_eq!(yaml.matches("---\n").count(), 20);
    }
}
