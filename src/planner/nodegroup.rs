// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Worker node groups and their launch templates.
//!
//! Node groups are prepared (validated and their images resolved) before
//! anything is added to the graph, so a bad group never leaves a partial plan.

use crate::constants::tags as tag_keys;
use crate::error::{PlannerError, Result};
use crate::planner::arch::{validate_instance_arch, Architecture};
use crate::planner::cluster::cluster_ref;
use crate::planner::deferred::{attr, Deferred};
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::iam::{ServiceRoles, NODE_ROLE_NODE};
use crate::planner::image::{bootstrap_user_data, resolve_image, ImageCatalog, ImageFamily, ResolvedImage};
use crate::planner::input::{NodeGroupSpec, SubnetSelection};
use crate::planner::resources::{
    LaunchTemplateDescriptor, NodeGroupDescriptor, NodeTaint, Resource, ScalingConfig,
};
use crate::planner::tags::{merge, TagSet};
use crate::planner::topology::{subnet_node_name, NetworkNodes, NODE_SG_NODE};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

pub const NODE_GROUP_PREFIX: &str = "ng-";
pub const LAUNCH_TEMPLATE_PREFIX: &str = "lt-";

pub mod labels {
    pub const NODE_GROUP: &str = "node-group";
    pub const ARCH: &str = "arch";
    pub const AMI_FAMILY: &str = "ami-family";
}

pub fn node_group_node_name(group: &str) -> String {
    format!("{}{}", NODE_GROUP_PREFIX, group)
}

/// A node group that passed validation and has a boot image
#[derive(Debug, Clone)]
pub struct PreparedNodeGroup<'a> {
    pub spec: &'a NodeGroupSpec,
    pub architecture: Architecture,
    pub family: ImageFamily,
    pub image: ResolvedImage,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<NodeTaint>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedNodeGroup {
    pub name: String,
    pub node: NodeId,
    pub launch_template: NodeId,
    pub image: ResolvedImage,
}

/// Merge user labels with the planner's own labels. A user label may repeat
/// a planner label but never contradict it.
fn node_labels(
    spec: &NodeGroupSpec,
    arch: Architecture,
    family: ImageFamily,
) -> Result<BTreeMap<String, String>> {
    let planner_labels = [
        (labels::NODE_GROUP, spec.name.as_str()),
        (labels::ARCH, arch.as_str()),
        (labels::AMI_FAMILY, family.as_str()),
    ];

    let mut merged = spec.labels.clone();
    for (key, value) in planner_labels {
        match merged.get(key) {
            Some(existing) if existing != value => {
                return Err(PlannerError::InconsistentNodeGroup {
                    node_group: spec.name.clone(),
                    reason: format!(
                        "label '{}={}' conflicts with planner label '{}={}'",
                        key, existing, key, value
                    ),
                })
            }
            _ => {
                merged.insert(key.to_string(), value.to_string());
            }
        }
    }
    Ok(merged)
}

fn node_taints(spec: &NodeGroupSpec) -> Result<Vec<NodeTaint>> {
    let mut seen = HashSet::new();
    spec.taints
        .iter()
        .map(|t| {
            if !seen.insert((t.key.as_str(), t.effect)) {
                return Err(PlannerError::InconsistentNodeGroup {
                    node_group: spec.name.clone(),
                    reason: format!("duplicate taint '{}' with effect {}", t.key, t.effect.as_str()),
                });
            }
            Ok(NodeTaint {
                key: t.key.clone(),
                value: t.value.clone(),
                effect: t.effect.as_str().to_string(),
            })
        })
        .collect()
}

/// Validate one node group and resolve its image.
///
/// The architecture check runs before the catalog is consulted.
#[instrument(skip(spec, catalog), fields(node_group = %spec.name))]
pub fn prepare_node_group<'a>(
    spec: &'a NodeGroupSpec,
    catalog: &dyn ImageCatalog,
    cluster_version: &str,
) -> Result<PreparedNodeGroup<'a>> {
    let architecture: Architecture = spec.architecture.parse()?;
    let family: ImageFamily = spec.image_family.parse()?;
    validate_instance_arch(&spec.instance_type, architecture)?;
    spec.capacity.check(&spec.name)?;

    let labels = node_labels(spec, architecture, family)?;
    let taints = node_taints(spec)?;

    let image = resolve_image(
        catalog,
        spec.image_id.as_deref(),
        family,
        architecture,
        cluster_version,
    )?;

    Ok(PreparedNodeGroup {
        spec,
        architecture,
        family,
        image,
        labels,
        taints,
    })
}

/// Resolve the subnets of a node group: explicit ids, then zone names, then
/// the cluster-wide set.
fn select_subnets(
    graph: &PlanGraph,
    spec: &NodeGroupSpec,
    network: &NetworkNodes,
) -> Result<(Vec<Deferred>, Vec<NodeId>)> {
    match &spec.subnets {
        SubnetSelection::Ids(ids) => Ok((ids.iter().map(Deferred::known).collect(), Vec::new())),
        SubnetSelection::Zones(zones) => {
            let missing: Vec<String> = zones
                .iter()
                .filter(|z| network.subnet_for_zone(z).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(PlannerError::UnknownAvailabilityZone {
                    node_group: spec.name.clone(),
                    zones: missing,
                });
            }
            let nodes: Vec<NodeId> = zones
                .iter()
                .filter_map(|z| network.subnet_for_zone(z))
                .collect();
            let refs = zones
                .iter()
                .map(|z| Deferred::pending(subnet_node_name(z), attr::ID))
                .collect();
            Ok((refs, nodes))
        }
        SubnetSelection::Default => Ok((
            network.subnet_refs(graph),
            network.subnets.iter().map(|(_, id)| *id).collect(),
        )),
    }
}

/// Tags for a node group: base < name < autoscaler discovery.
pub fn node_group_tags(base: &TagSet, cluster_name: &str, spec: &NodeGroupSpec) -> TagSet {
    let name = TagSet::new().with(tag_keys::NAME, format!("eks-ng-{}", spec.name));
    let discovery = if spec.autoscaler_discovery {
        TagSet::new()
            .with(tag_keys::AUTOSCALER_ENABLED, "true")
            .with(
                format!("{}{}", tag_keys::AUTOSCALER_CLUSTER_PREFIX, cluster_name),
                "owned",
            )
    } else {
        TagSet::new()
    };
    merge(&[base, &name, &discovery])
}

/// Add launch template and node group nodes for one prepared group.
pub fn plan_node_group(
    graph: &mut PlanGraph,
    prepared: &PreparedNodeGroup<'_>,
    cluster_name: &str,
    cluster: NodeId,
    network: &NetworkNodes,
    roles: &ServiceRoles,
    base_tags: &TagSet,
) -> Result<PlannedNodeGroup> {
    let spec = prepared.spec;
    let (subnet_ids, subnet_nodes) = select_subnets(graph, spec, network)?;

    let lt_name = format!("{}{}", LAUNCH_TEMPLATE_PREFIX, spec.name);
    let launch_template = graph.add(
        lt_name.clone(),
        Resource::LaunchTemplate(LaunchTemplateDescriptor {
            image_id: prepared.image.id.clone(),
            vpc_security_group_ids: vec![Deferred::pending(NODE_SG_NODE, attr::ID)],
            key_name: spec.ssh_key_name.clone().filter(|k| !k.is_empty()),
            user_data: bootstrap_user_data(&prepared.image, prepared.family, cluster_name),
            instance_tags: merge(&[
                base_tags,
                &TagSet::new().with(tag_keys::NAME, format!("{}-{}-node", cluster_name, spec.name)),
            ]),
            tags: base_tags.clone(),
        }),
        &[network.node_sg],
    )?;

    let mut deps = vec![cluster, launch_template];
    deps.extend_from_slice(&roles.node_role_deps);
    deps.extend(subnet_nodes);
    deps.extend_from_slice(&network.node_rules);

    let node = graph.add(
        node_group_node_name(&spec.name),
        Resource::NodeGroup(NodeGroupDescriptor {
            cluster_name: cluster_ref(attr::NAME),
            node_group_name: spec.name.clone(),
            node_role_arn: Deferred::pending(NODE_ROLE_NODE, attr::ARN),
            subnet_ids,
            scaling_config: ScalingConfig {
                min_size: spec.capacity.min,
                desired_size: spec.capacity.desired,
                max_size: spec.capacity.max,
            },
            instance_types: vec![spec.instance_type.clone()],
            labels: prepared.labels.clone(),
            taints: prepared.taints.clone(),
            launch_template_id: Deferred::pending(lt_name, attr::ID),
            launch_template_version: "$Latest".to_string(),
            tags: node_group_tags(base_tags, cluster_name, spec),
        }),
        &deps,
    )?;

    debug!(
        "Planned node group {} ({} on {}, image {})",
        spec.name, spec.instance_type, prepared.architecture, prepared.image.id
    );

    Ok(PlannedNodeGroup {
        name: spec.name.clone(),
        node,
        launch_template,
        image: prepared.image.clone(),
    })
}
