// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::{Client, CustomResourceExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use skyforge::config::Config;
use skyforge::kubernetes::wait_for_blueprint_crd;
use skyforge::reconcilers::BlueprintReconciler;
use skyforge::types::blueprint::ClusterBlueprint;

#[tokio::main]
async fn main() -> Result<()> {
    // `skyforge crd` prints the CustomResourceDefinition for installation
    if std::env::args().nth(1).as_deref() == Some("crd") {
        print!("{}", serde_yaml::to_string(&ClusterBlueprint::crd())?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Skyforge operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: catalog={}/{}, publish_plan={}",
        config.catalog_namespace, config.catalog_configmap, config.publish_plan
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for ClusterBlueprint CRD to become available...");
    wait_for_blueprint_crd(&client).await?;

    let reconciler = BlueprintReconciler::new(client, config);
    info!("Starting blueprint reconciler...");
    reconciler.run().await?;

    // The controller stream only ends on shutdown
    warn!("Blueprint reconciler stopped");
    Ok(())
}
