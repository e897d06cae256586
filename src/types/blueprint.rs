// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::planner::cluster::CLUSTER_NODE;
use crate::planner::deferred::attr;
use crate::planner::nodegroup::NODE_GROUP_PREFIX;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative description of a managed cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "skyforge.io", version = "v1alpha1", kind = "ClusterBlueprint")]
#[kube(namespaced)]
#[kube(status = "ClusterBlueprintStatus")]
#[kube(shortname = "cbp")]
#[serde(rename_all = "camelCase")]
pub struct ClusterBlueprintSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_log_types: Option<Vec<String>>,
    /// Retention of the control-plane log group; 0 leaves retention unmanaged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_cidrs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_cidrs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_kms_encryption: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_deletion_protection: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efs_deletion_protection: Option<bool>,
    /// Extra tags applied to every resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_group_defaults: Option<NodeGroupDefaults>,
    #[serde(default)]
    pub node_groups: Vec<NodeGroupSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons: Option<AddonSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_addons: Option<ManagedAddonSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_thumbprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_identities: Option<Vec<WorkloadIdentitySettings>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_cidr: Option<String>,
    /// Upper bound on subnets; all available zones when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_azs: Option<u32>,
    /// Availability zones of the region, in the provider's order
    #[serde(default)]
    pub availability_zones: Vec<String>,
}

/// Values used when a node group leaves a field unset
#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_keypair_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<TaintSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet_azs: Option<Vec<String>>,
    /// Set to false to keep the group out of cluster-autoscaler discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoscaler_discovery: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, schemars::JsonSchema)]
pub enum TaintEffect {
    #[serde(rename = "NO_SCHEDULE")]
    NoSchedule,
    #[serde(rename = "PREFER_NO_SCHEDULE")]
    PreferNoSchedule,
    #[serde(rename = "NO_EXECUTE")]
    NoExecute,
}

impl TaintEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaintEffect::NoSchedule => "NO_SCHEDULE",
            TaintEffect::PreferNoSchedule => "PREFER_NO_SCHEDULE",
            TaintEffect::NoExecute => "NO_EXECUTE",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaintSettings {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: TaintEffect,
}

/// Enable flag, chart version and value overrides for one add-on
#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub efs: Option<ChartSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebs: Option<ChartSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_nginx: Option<ChartSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus_stack: Option<ChartSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_autoscaler: Option<ChartSettings>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAddonSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Add-on name to pinned version; a null version lets the provider pick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<BTreeMap<String, Option<String>>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentitySettings {
    pub name: String,
    pub namespace: String,
    pub service_account: String,
    #[serde(default)]
    pub policy_arns: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum BlueprintPhase {
    #[default]
    Pending,
    /// Infrastructure plan published, waiting for the control plane
    Planned,
    /// Full plan including identity, add-ons and access published
    Complete,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBlueprintStatus {
    #[serde(default)]
    pub phase: BlueprintPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_config_map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_secret: Option<String>,
    /// Written by the realization engine once objects exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized: Option<RealizedCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ClusterSummary>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealizedNodeGroup {
    pub name: String,
    pub arn: String,
}

/// Attributes of realized objects as reported by the engine
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealizedCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oidc_issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_security_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_security_group_id: Option<String>,
    #[serde(default)]
    pub node_groups: Vec<RealizedNodeGroup>,
    /// Any other realized attribute, keyed `<plan node>.<attribute>`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RealizedCluster {
    /// Look up a realized attribute of a plan node
    pub fn lookup(&self, node: &str, attribute: &str) -> Option<String> {
        if node == CLUSTER_NODE {
            let typed = match attribute {
                attr::ARN => self.arn.clone(),
                attr::ENDPOINT => self.endpoint.clone(),
                attr::CERTIFICATE_AUTHORITY => self.certificate_authority_data.clone(),
                attr::OIDC_ISSUER => self.oidc_issuer.clone(),
                _ => None,
            };
            if typed.is_some() {
                return typed;
            }
        }

        if attribute == attr::ARN {
            if let Some(group) = node.strip_prefix(NODE_GROUP_PREFIX) {
                if let Some(ng) = self.node_groups.iter().find(|ng| ng.name == group) {
                    return Some(ng.arn.clone());
                }
            }
        }

        self.attributes.get(&format!("{}.{}", node, attribute)).cloned()
    }

    pub fn node_group_names(&self) -> Vec<&str> {
        self.node_groups.iter().map(|ng| ng.name.as_str()).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eks_control_plane: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_group: Option<String>,
}

/// Exported description of the realized cluster
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub region: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
    pub vpc_cidr: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    pub security_groups: SecurityGroupSummary,
    #[serde(default)]
    pub node_groups: Vec<RealizedNodeGroup>,
}
