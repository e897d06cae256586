// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane, its log group and secrets encryption key.

use crate::constants::tags as tag_keys;
use crate::error::Result;
use crate::planner::deferred::{attr, Deferred};
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::iam::{ServiceRoles, CLUSTER_ROLE_NODE};
use crate::planner::input::PlanConfig;
use crate::planner::resources::{
    ClusterDescriptor, ClusterVpcConfig, EncryptionConfig, KmsAliasDescriptor, KmsKeyDescriptor,
    LogGroupDescriptor, ManagedAddonDescriptor, Resource,
};
use crate::planner::tags::{merge, TagSet};
use crate::planner::topology::{NetworkNodes, CONTROL_PLANE_SG_NODE};
use tracing::debug;

pub const CLUSTER_NODE: &str = "eks-cluster";
pub const KMS_KEY_NODE: &str = "kms-secrets";
pub const KMS_ALIAS_NODE: &str = "kms-secrets-alias";
pub const LOG_GROUP_NODE: &str = "lg-cluster";

const KMS_DELETION_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone)]
pub struct ControlPlaneNodes {
    pub cluster: NodeId,
    pub log_group: Option<NodeId>,
    pub kms_key: Option<NodeId>,
    pub managed_addons: Vec<NodeId>,
}

pub fn cluster_ref(attribute: &str) -> Deferred {
    Deferred::pending(CLUSTER_NODE, attribute)
}

/// Plan the control plane and everything that has to exist before it.
pub fn plan_control_plane(
    graph: &mut PlanGraph,
    config: &PlanConfig,
    network: &NetworkNodes,
    roles: &ServiceRoles,
) -> Result<ControlPlaneNodes> {
    let settings = &config.cluster;
    let base_tags = &config.base_tags;
    let mut deps: Vec<NodeId> = roles.cluster_role_deps.to_vec();

    let log_group = match settings.log_retention_days {
        Some(days) => {
            let id = graph.add(
                LOG_GROUP_NODE,
                Resource::LogGroup(LogGroupDescriptor {
                    name: format!("/aws/eks/{}/cluster", settings.name),
                    retention_in_days: days,
                    tags: base_tags.clone(),
                }),
                &[],
            )?;
            deps.push(id);
            Some(id)
        }
        None => None,
    };

    let kms_key = if settings.encryption {
        let key = graph.add(
            KMS_KEY_NODE,
            Resource::KmsKey(KmsKeyDescriptor {
                description: format!("EKS secrets encryption ({})", settings.name),
                deletion_window_in_days: KMS_DELETION_WINDOW_DAYS,
                enable_key_rotation: true,
                tags: base_tags.clone(),
            }),
            &[],
        )?;
        graph.add(
            KMS_ALIAS_NODE,
            Resource::KmsAlias(KmsAliasDescriptor {
                name: format!("alias/{}-secrets", settings.name),
                target_key_id: Deferred::pending(KMS_KEY_NODE, attr::KEY_ID),
            }),
            &[key],
        )?;
        deps.push(key);
        Some(key)
    } else {
        None
    };

    deps.extend(network.subnets.iter().map(|(_, id)| *id));
    deps.push(network.control_plane_sg);

    let endpoint = &settings.endpoint;
    let subnet_ids = network.subnet_refs(graph);
    let cluster = graph.add(
        CLUSTER_NODE,
        Resource::Cluster(ClusterDescriptor {
            name: settings.name.clone(),
            role_arn: Deferred::pending(CLUSTER_ROLE_NODE, attr::ARN),
            version: settings.version.clone(),
            enabled_cluster_log_types: settings.log_types.clone(),
            vpc_config: ClusterVpcConfig {
                subnet_ids,
                security_group_ids: vec![Deferred::pending(CONTROL_PLANE_SG_NODE, attr::ID)],
                endpoint_public_access: endpoint.public,
                endpoint_private_access: endpoint.private,
                public_access_cidrs: endpoint.public.then(|| endpoint.public_cidrs.clone()),
            },
            encryption_config: kms_key.map(|_| EncryptionConfig {
                key_arn: Deferred::pending(KMS_KEY_NODE, attr::ARN),
                resources: vec!["secrets".to_string()],
            }),
            deletion_protection: settings.deletion_protection,
            tags: merge(&[base_tags, &TagSet::new().with(tag_keys::NAME, settings.name.clone())]),
        }),
        &deps,
    )?;

    let managed_addons = plan_managed_addons(graph, config, cluster)?;

    debug!(
        "Planned control plane {} (log group: {}, encryption: {}, managed add-ons: {})",
        settings.name,
        log_group.is_some(),
        kms_key.is_some(),
        managed_addons.len()
    );

    Ok(ControlPlaneNodes {
        cluster,
        log_group,
        kms_key,
        managed_addons,
    })
}

fn plan_managed_addons(
    graph: &mut PlanGraph,
    config: &PlanConfig,
    cluster: NodeId,
) -> Result<Vec<NodeId>> {
    let Some(addons) = &config.managed_addons else {
        return Ok(Vec::new());
    };

    addons
        .iter()
        .map(|(name, version)| {
            graph.add(
                format!("addon-{}", name),
                Resource::ManagedAddon(ManagedAddonDescriptor {
                    cluster_name: cluster_ref(attr::NAME),
                    addon_name: name.clone(),
                    addon_version: version.clone(),
                    resolve_conflicts: "OVERWRITE".to_string(),
                    tags: config.base_tags.clone(),
                }),
                &[cluster],
            )
        })
        .collect()
}
