// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Publishing plans, access documents and status for a blueprint.

use crate::constants::publish::{ACCESS_KEY, ACCESS_SUFFIX, PLAN_KEY, PLAN_SUFFIX};
use crate::constants::{labels, OPERATOR_NAME};
use crate::error::Result;
use crate::types::blueprint::{ClusterBlueprint, ClusterBlueprintStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{DeleteParams, ObjectMeta, Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info, instrument};

pub fn plan_configmap_name(blueprint: &ClusterBlueprint) -> String {
    format!("{}{}", blueprint.name_any(), PLAN_SUFFIX)
}

pub fn access_secret_name(blueprint: &ClusterBlueprint) -> String {
    format!("{}{}", blueprint.name_any(), ACCESS_SUFFIX)
}

fn owned_metadata(blueprint: &ClusterBlueprint, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: blueprint.namespace(),
        labels: Some(BTreeMap::from([
            (labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
            (labels::BLUEPRINT.to_string(), blueprint.name_any()),
        ])),
        owner_references: blueprint.controller_owner_ref(&()).map(|r| vec![r]),
        ..Default::default()
    }
}

/// ConfigMap carrying the serialized plan
pub fn plan_configmap(blueprint: &ClusterBlueprint, plan_json: String) -> ConfigMap {
    ConfigMap {
        metadata: owned_metadata(blueprint, plan_configmap_name(blueprint)),
        data: Some(BTreeMap::from([(PLAN_KEY.to_string(), plan_json)])),
        ..Default::default()
    }
}

/// Secret carrying the access document
pub fn access_secret(blueprint: &ClusterBlueprint, document_json: String) -> Secret {
    Secret {
        metadata: owned_metadata(blueprint, access_secret_name(blueprint)),
        data: Some(BTreeMap::from([(
            ACCESS_KEY.to_string(),
            ByteString(document_json.into_bytes()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

#[instrument(skip(client, configmap), fields(configmap = %configmap.name_any()))]
pub async fn apply_configmap(client: &Client, namespace: &str, configmap: &ConfigMap) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let pp = PatchParams::apply(OPERATOR_NAME).force();
    api.patch(&configmap.name_any(), &pp, &Patch::Apply(configmap))
        .await?;
    debug!("Applied ConfigMap {}/{}", namespace, configmap.name_any());
    Ok(())
}

#[instrument(skip(client, secret), fields(secret = %secret.name_any()))]
pub async fn apply_secret(client: &Client, namespace: &str, secret: &Secret) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let pp = PatchParams::apply(OPERATOR_NAME).force();
    api.patch(&secret.name_any(), &pp, &Patch::Apply(secret)).await?;
    debug!("Applied Secret {}/{}", namespace, secret.name_any());
    Ok(())
}

/// Remove a previously published ConfigMap or Secret. A missing object is
/// not an error.
#[instrument(skip(client))]
pub async fn delete_published<K>(client: &Client, namespace: &str, name: &str) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            info!("Deleted stale {} {}/{}", K::kind(&Default::default()), namespace, name);
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Replace the planner-owned part of a blueprint's status. The realized
/// attributes belong to the engine and are left untouched.
#[instrument(skip(client, blueprint, status), fields(blueprint = %blueprint.name_any()))]
pub async fn update_status(
    client: &Client,
    blueprint: &ClusterBlueprint,
    status: &ClusterBlueprintStatus,
) -> Result<()> {
    let namespace = blueprint.namespace().unwrap_or_default();
    let api: Api<ClusterBlueprint> = Api::namespaced(client.clone(), &namespace);

    let patch = json!({
        "status": {
            "phase": status.phase,
            "message": status.message,
            "observedGeneration": status.observed_generation,
            "warnings": status.warnings,
            "planConfigMap": status.plan_config_map,
            "accessSecret": status.access_secret,
            "summary": status.summary,
        }
    });
    api.patch_status(&blueprint.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    info!(
        "Updated status of {}/{} to {:?}",
        namespace,
        blueprint.name_any(),
        status.phase
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{not_found_json, MockService};
    use crate::types::blueprint::{BlueprintPhase, ClusterBlueprintSpec};

    fn blueprint() -> ClusterBlueprint {
        let mut bp = ClusterBlueprint::new("demo", ClusterBlueprintSpec::default());
        bp.metadata.namespace = Some("platform".to_string());
        bp.metadata.uid = Some("5d2c7c1e-0000-4000-8000-000000000001".to_string());
        bp
    }

    fn blueprint_json() -> String {
        serde_json::to_string(&blueprint()).unwrap()
    }

    #[test]
    fn test_plan_configmap_is_owned_and_labelled() {
        let cm = plan_configmap(&blueprint(), "{}".to_string());
        assert_eq!(cm.metadata.name.as_deref(), Some("demo-plan"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("platform"));
        assert_eq!(cm.labels().get(labels::BLUEPRINT).map(String::as_str), Some("demo"));
        let owners = cm.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "ClusterBlueprint");
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(cm.data.unwrap().get(PLAN_KEY).map(String::as_str), Some("{}"));
    }

    #[test]
    fn test_access_secret_uses_value_key() {
        let secret = access_secret(&blueprint(), "{\"kind\":\"Config\"}".to_string());
        assert_eq!(secret.metadata.name.as_deref(), Some("demo-kubeconfig"));
        let data = secret.data.unwrap();
        assert_eq!(data.get("value").unwrap().0, b"{\"kind\":\"Config\"}".to_vec());
    }

    #[tokio::test]
    async fn test_apply_configmap_patches() {
        let cm = plan_configmap(&blueprint(), "{}".to_string());
        let client = MockService::new()
            .on_patch(
                "/api/v1/namespaces/platform/configmaps/demo-plan",
                200,
                &serde_json::to_string(&cm).unwrap(),
            )
            .into_client();
        assert!(apply_configmap(&client, "platform", &cm).await.is_ok());
    }

    #[tokio::test]
    async fn test_apply_secret_surfaces_api_errors() {
        let secret = access_secret(&blueprint(), "{}".to_string());
        let client = MockService::new().into_client();
        assert!(apply_secret(&client, "platform", &secret).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_published_ignores_missing_objects() {
        let client = MockService::new()
            .on_delete(
                "/api/v1/namespaces/platform/configmaps/demo-plan",
                404,
                &not_found_json("configmaps", "demo-plan"),
            )
            .into_client();
        assert!(delete_published::<ConfigMap>(&client, "platform", "demo-plan")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_delete_published_surfaces_other_errors() {
        let forbidden = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": "forbidden",
            "reason": "Forbidden",
            "code": 403
        })
        .to_string();
        let client = MockService::new()
            .on_delete("/api/v1/namespaces/platform/secrets/demo-kubeconfig", 403, &forbidden)
            .into_client();
        assert!(delete_published::<Secret>(&client, "platform", "demo-kubeconfig")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_update_status_patches_status_subresource() {
        let client = MockService::new()
            .on_patch(
                "/apis/skyforge.io/v1alpha1/namespaces/platform/clusterblueprints/demo/status",
                200,
                &blueprint_json(),
            )
            .into_client();
        let status = ClusterBlueprintStatus {
            phase: BlueprintPhase::Planned,
            ..Default::default()
        };
        assert!(update_status(&client, &blueprint(), &status).await.is_ok());
    }
}
