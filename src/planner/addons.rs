// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-cluster add-ons installed from Helm charts.

use crate::constants::federation::{AUTOSCALER_SERVICE_ACCOUNT, ROLE_ARN_ANNOTATION};
use crate::constants::network::ANY_IPV4;
use crate::constants::ports;
use crate::constants::tags as tag_keys;
use crate::error::Result;
use crate::planner::deferred::{attr, Deferred};
use crate::planner::federation::FederatedRole;
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::input::PlanConfig;
use crate::planner::nodegroup::node_group_node_name;
use crate::planner::resources::{
    EfsFileSystemDescriptor, EfsMountTargetDescriptor, HelmChartDescriptor, NamespaceDescriptor,
    Protocol, Resource, RulePeer, SecurityGroupDescriptor, SecurityRule, ValueBinding,
};
use crate::planner::tags::{merge, TagSet};
use crate::planner::topology::{NetworkNodes, NODE_SG_NODE, VPC_NODE};
use crate::types::blueprint::RealizedCluster;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const EFS_SG_NODE: &str = "efs-sg";
pub const EFS_FS_NODE: &str = "efs-fs";

/// JSON pointer of the autoscaler's service account role annotation
const AUTOSCALER_ROLE_BINDING: &str = "/rbac/serviceAccount/annotations/eks.amazonaws.com~1role-arn";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AddonKind {
    EbsCsi,
    EfsCsi,
    IngressNginx,
    PrometheusStack,
    ClusterAutoscaler,
}

/// Where a chart comes from and where it is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddonDefinition {
    pub release: &'static str,
    pub chart: &'static str,
    pub repository: &'static str,
    pub namespace: &'static str,
    pub create_namespace: bool,
    pub default_version: &'static str,
}

impl AddonKind {
    pub const ALL: [AddonKind; 5] = [
        AddonKind::EbsCsi,
        AddonKind::EfsCsi,
        AddonKind::IngressNginx,
        AddonKind::PrometheusStack,
        AddonKind::ClusterAutoscaler,
    ];

    pub fn definition(&self) -> AddonDefinition {
        match self {
            AddonKind::EbsCsi => AddonDefinition {
                release: "ebs-csi-driver",
                chart: "aws-ebs-csi-driver",
                repository: "https://kubernetes-sigs.github.io/aws-ebs-csi-driver",
                namespace: "kube-system",
                create_namespace: false,
                default_version: "2.26.1",
            },
            AddonKind::EfsCsi => AddonDefinition {
                release: "efs-csi-driver",
                chart: "aws-efs-csi-driver",
                repository: "https://kubernetes-sigs.github.io/aws-efs-csi-driver/",
                namespace: "kube-system",
                create_namespace: false,
                default_version: "2.5.0",
            },
            AddonKind::IngressNginx => AddonDefinition {
                release: "ingress-nginx",
                chart: "ingress-nginx",
                repository: "https://kubernetes.github.io/ingress-nginx",
                namespace: "ingress-nginx",
                create_namespace: true,
                default_version: "4.10.0",
            },
            AddonKind::PrometheusStack => AddonDefinition {
                release: "kube-prometheus-stack",
                chart: "kube-prometheus-stack",
                repository: "https://prometheus-community.github.io/helm-charts",
                namespace: "monitoring",
                create_namespace: true,
                default_version: "55.5.0",
            },
            AddonKind::ClusterAutoscaler => AddonDefinition {
                release: "cluster-autoscaler",
                chart: "cluster-autoscaler",
                repository: "https://kubernetes.github.io/autoscaler",
                namespace: "kube-system",
                create_namespace: false,
                default_version: "9.29.0",
            },
        }
    }

    pub fn enabled_by_default(&self) -> bool {
        matches!(self, AddonKind::ClusterAutoscaler)
    }

    fn default_values(&self, config: &PlanConfig) -> Value {
        match self {
            AddonKind::IngressNginx => json!({ "controller": { "service": { "type": "LoadBalancer" } } }),
            AddonKind::PrometheusStack => json!({ "prometheus": { "service": { "type": "ClusterIP" } } }),
            AddonKind::ClusterAutoscaler => json!({
                "cloudProvider": "aws",
                "autoDiscovery": { "clusterName": config.cluster.name },
                "awsRegion": config.cluster.region,
                "rbac": {
                    "serviceAccount": {
                        "create": true,
                        "name": AUTOSCALER_SERVICE_ACCOUNT,
                        "annotations": { ROLE_ARN_ANNOTATION: "" },
                    }
                },
                "extraArgs": {
                    "skip-nodes-with-local-storage": "false",
                    "expander": "least-waste",
                    "balance-similar-node-groups": "true",
                },
                "podAnnotations": {
                    "cluster-autoscaler.kubernetes.io/safe-to-evict": "false",
                },
            }),
            AddonKind::EbsCsi | AddonKind::EfsCsi => json!({}),
        }
    }
}

/// User choices for one add-on
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddonRequest {
    pub enabled: bool,
    pub version: Option<String>,
    pub values: Option<Value>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonActivation {
    pub kind: AddonKind,
    pub enabled: bool,
    pub release: String,
    pub chart: String,
    pub repository: String,
    pub namespace: String,
    pub create_namespace: bool,
    pub version: String,
    pub values: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node_group: Option<String>,
}

/// Recursively overlay `overlay` onto `base`; objects merge, anything else
/// replaces.
pub fn merge_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_values(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Decide which add-ons are active and how. Pure: the same configuration
/// and primary node group always give the same activations.
pub fn activations(config: &PlanConfig, primary_node_group: Option<&str>) -> Vec<AddonActivation> {
    AddonKind::ALL
        .iter()
        .map(|kind| {
            let def = kind.definition();
            let request = config.addons.get(kind).cloned().unwrap_or_default();
            let mut values = kind.default_values(config);
            if let Some(overrides) = &request.values {
                merge_values(&mut values, overrides);
            }
            AddonActivation {
                kind: *kind,
                enabled: request.enabled,
                release: def.release.to_string(),
                chart: def.chart.to_string(),
                repository: def.repository.to_string(),
                namespace: def.namespace.to_string(),
                create_namespace: def.create_namespace,
                version: request.version.unwrap_or_else(|| def.default_version.to_string()),
                values,
                target_node_group: request
                    .enabled
                    .then(|| primary_node_group.map(str::to_string))
                    .flatten(),
            }
        })
        .collect()
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddonPlan {
    pub activations: Vec<AddonActivation>,
    pub charts: BTreeMap<AddonKind, NodeId>,
}

/// Storage plumbing for the EFS driver: security group, file system and a
/// mount target per subnet. Returns the nodes the chart waits for.
fn plan_efs_storage(
    graph: &mut PlanGraph,
    config: &PlanConfig,
    network: &NetworkNodes,
) -> Result<Vec<NodeId>> {
    let cluster_name = &config.cluster.name;
    let sg = graph.add(
        EFS_SG_NODE,
        Resource::SecurityGroup(SecurityGroupDescriptor {
            vpc_id: Deferred::pending(VPC_NODE, attr::ID),
            description: "Security group for EFS".to_string(),
            ingress: vec![SecurityRule {
                protocol: Protocol::Tcp,
                from_port: ports::NFS,
                to_port: ports::NFS,
                peer: RulePeer::SecurityGroup(Deferred::pending(NODE_SG_NODE, attr::ID)),
                description: "Allow EFS traffic from worker nodes".to_string(),
            }],
            egress: vec![SecurityRule {
                protocol: Protocol::All,
                from_port: 0,
                to_port: 0,
                peer: RulePeer::Cidrs(vec![ANY_IPV4.to_string()]),
                description: "Allow all outbound".to_string(),
            }],
            tags: merge(&[&config.base_tags, &TagSet::new().with(tag_keys::NAME, "efs-sg")]),
        }),
        &[network.vpc, network.node_sg],
    )?;

    let fs = graph.add(
        EFS_FS_NODE,
        Resource::EfsFileSystem(EfsFileSystemDescriptor {
            deletion_protection: config.efs_deletion_protection,
            tags: merge(&[
                &config.base_tags,
                &TagSet::new().with(tag_keys::NAME, format!("{}-efs", cluster_name)),
            ]),
        }),
        &[],
    )?;

    let mut deps = vec![sg, fs];
    for (i, (zone, subnet)) in network.subnets.iter().enumerate() {
        let subnet_name = graph.get(*subnet).name.clone();
        let mount = graph.add(
            format!("efs-mount-{}", i),
            Resource::EfsMountTarget(EfsMountTargetDescriptor {
                file_system_id: Deferred::pending(EFS_FS_NODE, attr::ID),
                subnet_id: Deferred::pending(subnet_name, attr::ID),
                security_groups: vec![Deferred::pending(EFS_SG_NODE, attr::ID)],
                tags: merge(&[
                    &config.base_tags,
                    &TagSet::new().with(tag_keys::NAME, format!("{}-efs-mt-{}", cluster_name, i)),
                ]),
            }),
            &[fs, sg, *subnet],
        )?;
        debug!("Planned EFS mount target in {}", zone);
        deps.push(mount);
    }
    Ok(deps)
}

/// Plan chart installs for every enabled add-on.
///
/// Charts target the primary realized node group; nothing is planned until
/// at least one node group has been realized.
pub fn plan_addons(
    graph: &mut PlanGraph,
    config: &PlanConfig,
    realized: &RealizedCluster,
    network: &NetworkNodes,
    node_groups: &[NodeId],
    autoscaler_role: Option<&FederatedRole>,
) -> Result<AddonPlan> {
    let primary = realized.node_group_names().first().map(|n| n.to_string());
    let mut plan = AddonPlan {
        activations: activations(config, primary.as_deref()),
        charts: BTreeMap::new(),
    };

    let Some(primary) = primary else {
        info!("No realized node groups yet, deferring add-ons");
        return Ok(plan);
    };
    let primary_node = graph.id_of(&node_group_node_name(&primary));

    for activation in plan.activations.iter_mut().filter(|a| a.enabled) {
        let mut deps: Vec<NodeId> = primary_node.into_iter().collect();
        let mut value_bindings = Vec::new();

        if activation.create_namespace {
            let ns_name = format!("ns-{}", activation.namespace);
            let ns = match graph.id_of(&ns_name) {
                Some(id) => id,
                None => graph.add(
                    ns_name,
                    Resource::Namespace(NamespaceDescriptor {
                        name: activation.namespace.clone(),
                    }),
                    &deps,
                )?,
            };
            deps.push(ns);
        }

        match activation.kind {
            AddonKind::EfsCsi => deps.extend(plan_efs_storage(graph, config, network)?),
            AddonKind::ClusterAutoscaler => {
                deps.extend_from_slice(node_groups);
                if let Some(role) = autoscaler_role {
                    deps.push(role.node);
                    let arn = Deferred::pending(graph.get(role.node).name.clone(), attr::ARN).resolve(realized);
                    if let (Some(known), Some(slot)) =
                        (arn.as_known(), activation.values.pointer_mut(AUTOSCALER_ROLE_BINDING))
                    {
                        *slot = Value::String(known.to_string());
                    }
                    value_bindings.push(ValueBinding {
                        path: AUTOSCALER_ROLE_BINDING.to_string(),
                        value: arn,
                    });
                }
            }
            _ => {}
        }

        let chart = graph.add(
            format!("chart-{}", activation.release),
            Resource::HelmChart(HelmChartDescriptor {
                release: activation.release.clone(),
                chart: activation.chart.clone(),
                repository: activation.repository.clone(),
                version: activation.version.clone(),
                namespace: activation.namespace.clone(),
                values: activation.values.clone(),
                value_bindings,
                target_node_group: primary.clone(),
            }),
            &deps,
        )?;
        debug!("Planned add-on {} {}", activation.chart, activation.version);
        plan.charts.insert(activation.kind, chart);
    }

    Ok(plan)
}
