// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Blueprint reconciler - plans ClusterBlueprint resources and publishes the results.

use crate::config::Config;
use crate::constants::publish::REQUEUE_SECS;
use crate::error::{PlannerError, Result};
use crate::kubernetes::catalog::load_catalog;
use crate::kubernetes::publish::{
    access_secret, access_secret_name, apply_configmap, apply_secret, delete_published,
    plan_configmap, plan_configmap_name, update_status,
};
use crate::planner::image::ImageCatalog;
use crate::planner::input::PlanConfig;
use crate::planner::plan_infrastructure;
use crate::types::blueprint::{
    BlueprintPhase, ClusterBlueprint, ClusterBlueprintSpec, ClusterBlueprintStatus, ClusterSummary,
    RealizedCluster,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub struct BlueprintReconciler {
    client: Client,
    config: Config,
}

impl BlueprintReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let blueprints: Api<ClusterBlueprint> = Api::all(self.client.clone());
        let context = Arc::new(self);

        Controller::new(blueprints, WatcherConfig::default())
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled blueprint: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Result of planning one blueprint, ready to publish
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub phase: BlueprintPhase,
    pub message: Option<String>,
    pub warnings: Vec<String>,
    pub plan_json: Option<String>,
    pub access_json: Option<String>,
    pub summary: Option<ClusterSummary>,
}

impl Evaluation {
    fn failed(error: &PlannerError) -> Self {
        Self {
            phase: BlueprintPhase::Failed,
            message: Some(format!("{}: {}", error.reason(), error)),
            warnings: Vec::new(),
            plan_json: None,
            access_json: None,
            summary: None,
        }
    }
}

/// Plan a blueprint against the realized state reported so far.
///
/// Any planning error yields `Failed` with no plan. Missing realized
/// attributes are not an error: the infrastructure plan is published and the
/// blueprint stays `Planned` until the engine reports them.
pub fn evaluate_blueprint(
    spec: &ClusterBlueprintSpec,
    realized: Option<&RealizedCluster>,
    catalog: &dyn ImageCatalog,
) -> Evaluation {
    let planned = PlanConfig::from_spec(spec).and_then(|config| {
        let infra = plan_infrastructure(&config, catalog)?;
        Ok((config, infra))
    });
    let (config, infra) = match planned {
        Ok(p) => p,
        Err(e) => return Evaluation::failed(&e),
    };

    let warnings: Vec<String> = infra.warnings.iter().map(|w| w.to_string()).collect();
    let infra_json = match serde_json::to_string_pretty(&infra) {
        Ok(json) => json,
        Err(e) => return Evaluation::failed(&e.into()),
    };
    let pending = |message: String| Evaluation {
        phase: BlueprintPhase::Planned,
        message: Some(message),
        warnings: warnings.clone(),
        plan_json: Some(infra_json.clone()),
        access_json: None,
        summary: None,
    };

    let Some(realized) = realized else {
        return pending("Waiting for the control plane to be realized".to_string());
    };

    let completed = infra.complete(&config, realized).and_then(|plan| {
        let plan_json = serde_json::to_string_pretty(&plan)?;
        let access_json = plan.access.to_json()?;
        Ok((plan, plan_json, access_json))
    });

    match completed {
        Ok((plan, plan_json, access_json)) => Evaluation {
            phase: BlueprintPhase::Complete,
            message: None,
            warnings,
            plan_json: Some(plan_json),
            access_json: Some(access_json),
            summary: Some(plan.summary),
        },
        Err(PlannerError::UnresolvedAttribute(attribute)) => {
            pending(format!("Waiting for {} to be realized", attribute))
        }
        Err(e) => Evaluation::failed(&e),
    }
}

#[instrument(skip(blueprint, ctx), fields(blueprint = %blueprint.name_any()))]
async fn reconcile(blueprint: Arc<ClusterBlueprint>, ctx: Arc<BlueprintReconciler>) -> Result<Action> {
    let namespace = blueprint.namespace().unwrap_or_default();
    debug!("Reconciling blueprint {}/{}", namespace, blueprint.name_any());

    let catalog = load_catalog(&ctx.client, &ctx.config).await?;
    let realized = blueprint.status.as_ref().and_then(|s| s.realized.as_ref());
    let evaluation = evaluate_blueprint(&blueprint.spec, realized, &catalog);

    if evaluation.phase == BlueprintPhase::Failed {
        warn!(
            "Planning failed for {}: {}",
            blueprint.name_any(),
            evaluation.message.as_deref().unwrap_or_default()
        );
    }
    for warning in &evaluation.warnings {
        warn!("{}", warning);
    }

    let mut status = ClusterBlueprintStatus {
        phase: evaluation.phase,
        message: evaluation.message,
        observed_generation: blueprint.metadata.generation,
        warnings: evaluation.warnings,
        summary: evaluation.summary,
        ..Default::default()
    };

    // Published objects always match the status references: whatever this
    // run did not produce is removed
    if ctx.config.publish_plan {
        match evaluation.plan_json {
            Some(plan) => {
                apply_configmap(&ctx.client, &namespace, &plan_configmap(&blueprint, plan)).await?;
                status.plan_config_map = Some(plan_configmap_name(&blueprint));
            }
            None => {
                delete_published::<ConfigMap>(&ctx.client, &namespace, &plan_configmap_name(&blueprint))
                    .await?
            }
        }
        match evaluation.access_json {
            Some(document) => {
                apply_secret(&ctx.client, &namespace, &access_secret(&blueprint, document)).await?;
                status.access_secret = Some(access_secret_name(&blueprint));
            }
            None => {
                delete_published::<Secret>(&ctx.client, &namespace, &access_secret_name(&blueprint))
                    .await?
            }
        }
    }

    update_status(&ctx.client, &blueprint, &status).await?;
    info!("Blueprint {} is {:?}", blueprint.name_any(), status.phase);

    // Realized attributes arrive as status changes, which trigger the next run
    Ok(Action::await_change())
}

fn error_policy(
    _blueprint: Arc<ClusterBlueprint>,
    error: &PlannerError,
    _ctx: Arc<BlueprintReconciler>,
) -> Action {
    error!("Reconciliation error: {}", error);
    Action::requeue(Duration::from_secs(REQUEUE_SECS))
}
