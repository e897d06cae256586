// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource descriptors handed to the realization engine.

use crate::planner::deferred::Deferred;
use crate::planner::tags::TagSet;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Resource {
    Vpc(VpcDescriptor),
    InternetGateway(InternetGatewayDescriptor),
    RouteTable(RouteTableDescriptor),
    Subnet(SubnetDescriptor),
    RouteTableAssociation(RouteTableAssociationDescriptor),
    SecurityGroup(SecurityGroupDescriptor),
    SecurityGroupRule(SecurityGroupRuleDescriptor),
    KmsKey(KmsKeyDescriptor),
    KmsAlias(KmsAliasDescriptor),
    LogGroup(LogGroupDescriptor),
    IamRole(IamRoleDescriptor),
    IamPolicy(IamPolicyDescriptor),
    RolePolicyAttachment(RolePolicyAttachmentDescriptor),
    Cluster(ClusterDescriptor),
    LaunchTemplate(LaunchTemplateDescriptor),
    NodeGroup(NodeGroupDescriptor),
    ManagedAddon(ManagedAddonDescriptor),
    OidcProvider(OidcProviderDescriptor),
    Namespace(NamespaceDescriptor),
    HelmChart(HelmChartDescriptor),
    EfsFileSystem(EfsFileSystemDescriptor),
    EfsMountTarget(EfsMountTargetDescriptor),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcDescriptor {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InternetGatewayDescriptor {
    pub vpc_id: Deferred,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub cidr_block: String,
    pub gateway_id: Deferred,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableDescriptor {
    pub vpc_id: Deferred,
    pub routes: Vec<Route>,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetDescriptor {
    pub vpc_id: Deferred,
    pub availability_zone: String,
    pub cidr_block: String,
    pub map_public_ip_on_launch: bool,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTableAssociationDescriptor {
    pub subnet_id: Deferred,
    pub route_table_id: Deferred,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    #[serde(rename = "tcp")]
    Tcp,
    #[serde(rename = "-1")]
    All,
}

/// Where traffic matched by a rule comes from (ingress) or goes to (egress)
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum RulePeer {
    /// The group the rule is attached to
    SelfGroup,
    SecurityGroup(Deferred),
    Cidrs(Vec<String>),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub peer: RulePeer,
    pub description: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupDescriptor {
    pub vpc_id: Deferred,
    pub description: String,
    pub ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRuleDescriptor {
    pub direction: RuleDirection,
    pub security_group_id: Deferred,
    pub rule: SecurityRule,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KmsKeyDescriptor {
    pub description: String,
    pub deletion_window_in_days: u32,
    pub enable_key_rotation: bool,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KmsAliasDescriptor {
    pub name: String,
    pub target_key_id: Deferred,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupDescriptor {
    pub name: String,
    pub retention_in_days: u32,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IamRoleDescriptor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub assume_role_policy: Value,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicyDescriptor {
    pub name: String,
    pub policy: Value,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicyAttachmentDescriptor {
    pub role: Deferred,
    pub policy_arn: Deferred,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVpcConfig {
    pub subnet_ids: Vec<Deferred>,
    pub security_group_ids: Vec<Deferred>,
    pub endpoint_public_access: bool,
    pub endpoint_private_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_cidrs: Option<Vec<String>>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    pub key_arn: Deferred,
    pub resources: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub name: String,
    pub role_arn: Deferred,
    pub version: String,
    pub enabled_cluster_log_types: Vec<String>,
    pub vpc_config: ClusterVpcConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<EncryptionConfig>,
    pub deletion_protection: bool,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTemplateDescriptor {
    pub image_id: String,
    pub vpc_security_group_ids: Vec<Deferred>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub instance_tags: TagSet,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScalingConfig {
    pub min_size: u32,
    pub desired_size: u32,
    pub max_size: u32,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeTaint {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupDescriptor {
    pub cluster_name: Deferred,
    pub node_group_name: String,
    pub node_role_arn: Deferred,
    pub subnet_ids: Vec<Deferred>,
    pub scaling_config: ScalingConfig,
    pub instance_types: Vec<String>,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<NodeTaint>,
    pub launch_template_id: Deferred,
    pub launch_template_version: String,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedAddonDescriptor {
    pub cluster_name: Deferred,
    pub addon_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon_version: Option<String>,
    pub resolve_conflicts: String,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcProviderDescriptor {
    pub url: String,
    pub client_id_list: Vec<String>,
    pub thumbprint_list: Vec<String>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDescriptor {
    pub name: String,
}

/// A chart value that must be filled in from another node at install time
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValueBinding {
    /// Dotted path into the chart values
    pub path: String,
    pub value: Deferred,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartDescriptor {
    pub release: String,
    pub chart: String,
    pub repository: String,
    pub version: String,
    pub namespace: String,
    pub values: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value_bindings: Vec<ValueBinding>,
    pub target_node_group: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EfsFileSystemDescriptor {
    pub deletion_protection: bool,
    pub tags: TagSet,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EfsMountTargetDescriptor {
    pub file_system_id: Deferred,
    pub subnet_id: Deferred,
    pub security_groups: Vec<Deferred>,
    pub tags: TagSet,
}
