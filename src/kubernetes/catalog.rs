// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Image catalog snapshots published as ConfigMaps.

use crate::config::Config;
use crate::constants::publish::CATALOG_KEY;
use crate::error::{PlannerError, Result};
use crate::planner::image::StaticCatalog;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::{debug, instrument};

/// Load the image catalog from the configured ConfigMap
#[instrument(skip(client, config), fields(configmap = %config.catalog_configmap))]
pub async fn load_catalog(client: &Client, config: &Config) -> Result<StaticCatalog> {
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), &config.catalog_namespace);

    let configmap = configmaps
        .get(&config.catalog_configmap)
        .await
        .map_err(|e| {
            PlannerError::Catalog(format!(
                "failed to get catalog ConfigMap {}/{}: {}",
                config.catalog_namespace, config.catalog_configmap, e
            ))
        })?;

    let catalog = catalog_from_configmap(&configmap)?;
    debug!("Loaded {} catalog images", catalog.len());
    Ok(catalog)
}

pub fn catalog_from_configmap(configmap: &ConfigMap) -> Result<StaticCatalog> {
    let data = configmap
        .data
        .as_ref()
        .and_then(|d| d.get(CATALOG_KEY))
        .ok_or_else(|| {
            PlannerError::Catalog(format!("catalog ConfigMap has no '{}' key", CATALOG_KEY))
        })?;

    StaticCatalog::from_yaml(data)
}
