// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster topology and resource dependency planner.
//!
//! Planning happens in two phases. [`plan_infrastructure`] covers everything
//! that can be decided from configuration alone: network, roles, control
//! plane and node groups. Once the control plane has been realized,
//! [`InfrastructurePlan::complete`] adds identity federation, add-ons and
//! the access document, which all depend on realized attributes.

pub mod access;
pub mod addons;
pub mod arch;
pub mod cluster;
pub mod deferred;
pub mod federation;
pub mod graph;
pub mod iam;
pub mod image;
pub mod input;
pub mod nodegroup;
pub mod partition;
pub mod resources;
pub mod tags;
pub mod topology;

use crate::error::{PlannerError, Result};
use crate::types::blueprint::{ClusterSummary, RealizedCluster};
use access::{cluster_summary, AccessDocument};
use addons::{plan_addons, AddonPlan};
use cluster::plan_control_plane;
use federation::{plan_federation, FederationPlan, AUTOSCALER_IDENTITY};
use graph::{NodeId, PlanGraph};
use iam::plan_service_roles;
use image::ImageCatalog;
use input::PlanConfig;
use nodegroup::{plan_node_group, prepare_node_group, PlannedNodeGroup};
use partition::{partition, SubnetPlan};
use serde::Serialize;
use std::fmt;
use topology::{parse_trusted_cidrs, plan_network, NetworkNodes, SecurityTopology};
use tracing::{info, instrument};

/// Non-fatal planning outcome worth surfacing to the operator
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanWarning {
    /// Fewer subnets than requested could be planned
    #[serde(rename_all = "camelCase")]
    DegradedTopology {
        requested: usize,
        planned: usize,
        reason: String,
    },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::DegradedTopology {
                requested,
                planned,
                reason,
            } => write!(
                f,
                "DegradedTopology: planned {} of {} requested subnets ({})",
                planned, requested, reason
            ),
        }
    }
}

/// Plan of everything that exists before the control plane is realized
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructurePlan {
    pub graph: PlanGraph,
    pub subnets: SubnetPlan,
    pub cluster: NodeId,
    pub node_groups: Vec<PlannedNodeGroup>,
    pub warnings: Vec<PlanWarning>,
    #[serde(skip)]
    network: NetworkNodes,
}

/// Full plan, including everything that depends on the realized cluster
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPlan {
    pub graph: PlanGraph,
    pub subnets: SubnetPlan,
    pub cluster: NodeId,
    pub node_groups: Vec<PlannedNodeGroup>,
    pub warnings: Vec<PlanWarning>,
    pub federation: FederationPlan,
    pub addons: AddonPlan,
    #[serde(skip)]
    pub access: AccessDocument,
    pub summary: ClusterSummary,
}

/// Build the pre-realization plan.
///
/// Every node group is validated and its image resolved before anything is
/// planned, so configuration errors never produce a partial plan.
#[instrument(skip(config, catalog), fields(cluster = %config.cluster.name))]
pub fn plan_infrastructure(config: &PlanConfig, catalog: &dyn ImageCatalog) -> Result<InfrastructurePlan> {
    config.cluster.endpoint.validate()?;

    let prepared = config
        .node_groups
        .iter()
        .map(|ng| prepare_node_group(ng, catalog, &config.cluster.version))
        .collect::<Result<Vec<_>>>()?;

    let network_settings = &config.network;
    let layout = partition(
        &network_settings.vpc_cidr,
        network_settings.max_azs,
        &network_settings.availability_zones,
    )?;
    let topology = SecurityTopology::build(&parse_trusted_cidrs(&network_settings.trusted_cidrs)?);

    let mut graph = PlanGraph::new();
    let network = plan_network(
        &mut graph,
        &config.cluster.name,
        &layout.plan,
        &topology,
        &config.base_tags,
    )?;
    let roles = plan_service_roles(&mut graph, &config.cluster.name, &config.base_tags)?;
    let control_plane = plan_control_plane(&mut graph, config, &network, &roles)?;

    let node_groups = prepared
        .iter()
        .map(|p| {
            plan_node_group(
                &mut graph,
                p,
                &config.cluster.name,
                control_plane.cluster,
                &network,
                &roles,
                &config.base_tags,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        "Planned infrastructure: {} nodes, {} subnets, {} node groups",
        graph.len(),
        layout.plan.subnets.len(),
        node_groups.len()
    );

    Ok(InfrastructurePlan {
        graph,
        subnets: layout.plan,
        cluster: control_plane.cluster,
        node_groups,
        warnings: layout.warning.into_iter().collect(),
        network,
    })
}

impl InfrastructurePlan {
    /// Extend the plan with everything that needs realized attributes.
    ///
    /// Fails with `UnresolvedAttribute` while the issuer, ARN, endpoint or CA
    /// data of the control plane are still unknown.
    #[instrument(skip_all, fields(cluster = %config.cluster.name))]
    pub fn complete(self, config: &PlanConfig, realized: &RealizedCluster) -> Result<ClusterPlan> {
        let InfrastructurePlan {
            mut graph,
            subnets,
            cluster,
            node_groups,
            warnings,
            network,
        } = self;

        let access = AccessDocument::from_realized(&config.cluster.name, realized)?;

        for realized_group in realized.node_group_names() {
            if !node_groups.iter().any(|ng| ng.name == realized_group) {
                return Err(PlannerError::InvalidConfiguration(format!(
                    "realized node group '{}' is not part of the plan",
                    realized_group
                )));
            }
        }

        let group_nodes: Vec<NodeId> = node_groups.iter().map(|ng| ng.node).collect();
        let federation = plan_federation(&mut graph, config, realized, cluster, &group_nodes)?;
        let addons = plan_addons(
            &mut graph,
            config,
            realized,
            &network,
            &group_nodes,
            federation.role(AUTOSCALER_IDENTITY),
        )?;
        let summary = cluster_summary(config, realized);

        info!(
            "Completed plan: {} nodes, {} federated roles, {} add-ons",
            graph.len(),
            federation.roles.len(),
            addons.charts.len()
        );

        Ok(ClusterPlan {
            graph,
            subnets,
            cluster,
            node_groups,
            warnings,
            federation,
            addons,
            access,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::addons::AddonKind;
    use crate::planner::image::{ImageRecord, StaticCatalog};
    use crate::planner::resources::Resource;
    use crate::types::blueprint::{
        ClusterBlueprintSpec, NetworkSettings, NodeGroupSettings, RealizedNodeGroup,
    };
    use std::collections::BTreeMap;

    fn zones(n: usize) -> Vec<String> {
        ["us-west-2a", "us-west-2b", "us-west-2c", "us-west-2d"]
            .iter()
            .take(n)
            .map(|z| z.to_string())
            .collect()
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![ImageRecord {
            id: "ami-0eks130".to_string(),
            name: "amazon-eks-node-1.30-v20240601".to_string(),
            owner: "602401143452".to_string(),
            architecture: "x86_64".to_string(),
            creation_date: "2024-06-01T00:00:00Z".parse().unwrap(),
        }])
    }

    fn group(name: &str, instance_type: &str) -> NodeGroupSettings {
        NodeGroupSettings {
            name: Some(name.to_string()),
            instance_type: Some(instance_type.to_string()),
            min_capacity: Some(1),
            desired_capacity: Some(2),
            max_capacity: Some(4),
            ..Default::default()
        }
    }

    fn spec(node_groups: Vec<NodeGroupSettings>) -> ClusterBlueprintSpec {
        ClusterBlueprintSpec {
            cluster_name: Some("demo".to_string()),
            network: Some(NetworkSettings {
                vpc_cidr: Some("10.100.0.0/16".to_string()),
                max_azs: None,
                availability_zones: zones(3),
            }),
            node_groups,
            ..Default::default()
        }
    }

    fn realized() -> RealizedCluster {
        RealizedCluster {
            arn: Some("arn:aws:eks:us-west-2:123456789012:cluster/demo".to_string()),
            endpoint: Some("https://ABC.gr7.us-west-2.eks.amazonaws.com".to_string()),
            certificate_authority_data: Some("Q0EK".to_string()),
            oidc_issuer: Some("https://oidc.eks.us-west-2.amazonaws.com/id/ABC".to_string()),
            node_groups: vec![RealizedNodeGroup {
                name: "general".to_string(),
                arn: "arn:aws:eks:us-west-2:123456789012:nodegroup/demo/general/1".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_three_zone_layout() {
        let config = PlanConfig::from_spec(&spec(vec![group("general", "m5.large")])).unwrap();
        let plan = plan_infrastructure(&config, &catalog()).unwrap();

        let cidrs: Vec<String> = plan.subnets.subnets.iter().map(|s| s.cidr_block.to_string()).collect();
        assert_eq!(cidrs, vec!["10.100.0.0/24", "10.100.1.0/24", "10.100.2.0/24"]);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.node_groups[0].image.id, "ami-0eks130");
    }

    #[test]
    fn test_arm_instance_declared_x86_aborts_before_any_plan() {
        let config = PlanConfig::from_spec(&spec(vec![group("arm", "c6g.large")])).unwrap();
        assert!(matches!(
            plan_infrastructure(&config, &catalog()),
            Err(PlannerError::ArchitectureMismatch { .. })
        ));
    }

    #[test]
    fn test_capacity_violation_aborts() {
        let mut g = group("general", "m5.large");
        g.min_capacity = Some(3);
        g.desired_capacity = Some(2);
        g.max_capacity = Some(5);
        let config = PlanConfig::from_spec(&spec(vec![g])).unwrap();
        assert!(matches!(
            plan_infrastructure(&config, &catalog()),
            Err(PlannerError::CapacityInvariantViolated { min: 3, desired: 2, max: 5, .. })
        ));
    }

    #[test]
    fn test_unknown_zone_fails() {
        let mut g = group("general", "m5.large");
        g.subnet_azs = Some(vec!["us-west-2a".to_string(), "eu-west-1a".to_string()]);
        let config = PlanConfig::from_spec(&spec(vec![g])).unwrap();
        assert!(matches!(
            plan_infrastructure(&config, &catalog()),
            Err(PlannerError::UnknownAvailabilityZone { ref zones, .. }) if zones == &vec!["eu-west-1a".to_string()]
        ));
    }

    #[test]
    fn test_degraded_topology_is_a_warning() {
        let mut s = spec(vec![]);
        s.network = Some(NetworkSettings {
            vpc_cidr: Some("10.0.0.0/16".to_string()),
            max_azs: Some(4),
            availability_zones: zones(2),
        });
        let config = PlanConfig::from_spec(&s).unwrap();
        let plan = plan_infrastructure(&config, &catalog()).unwrap();
        assert_eq!(plan.subnets.subnets.len(), 2);
        assert!(matches!(
            plan.warnings.as_slice(),
            [PlanWarning::DegradedTopology { requested: 4, planned: 2, .. }]
        ));
    }

    #[test]
    fn test_node_groups_follow_cluster_and_roles() {
        let config = PlanConfig::from_spec(&spec(vec![
            group("general", "m5.large"),
            group("batch", "m5.xlarge"),
        ]))
        .unwrap();
        let plan = plan_infrastructure(&config, &catalog()).unwrap();
        let g = &plan.graph;

        let node_role = g.id_of(iam::NODE_ROLE_NODE).unwrap();
        for ng in &plan.node_groups {
            assert!(g.precedes(plan.cluster, ng.node));
            assert!(g.precedes(node_role, ng.node));
            assert!(g.precedes(ng.launch_template, ng.node));
        }

        let waves = g.waves();
        let wave_of = |id: NodeId| waves.iter().position(|w| w.contains(&id)).unwrap();
        assert!(wave_of(plan.cluster) < wave_of(plan.node_groups[0].node));
    }

    #[test]
    fn test_complete_adds_federation_addons_and_access() {
        let config = PlanConfig::from_spec(&spec(vec![group("general", "m5.large")])).unwrap();
        let infra = plan_infrastructure(&config, &catalog()).unwrap();
        let ng_node = infra.node_groups[0].node;

        let plan = infra.complete(&config, &realized()).unwrap();

        let provider = plan.federation.provider;
        assert!(plan.graph.precedes(plan.cluster, provider));
        let role = plan.federation.role(AUTOSCALER_IDENTITY).unwrap();
        assert!(plan.graph.precedes(ng_node, role.node));

        let chart = plan.addons.charts[&AddonKind::ClusterAutoscaler];
        assert!(plan.graph.precedes(ng_node, chart));
        assert!(plan.graph.precedes(role.node, chart));
        assert_eq!(plan.access.current_context, "aws");
        assert_eq!(plan.summary.name, "demo");

        let Resource::OidcProvider(p) = &plan.graph.get(provider).resource else {
            panic!("expected provider");
        };
        assert_eq!(p.url, "https://oidc.eks.us-west-2.amazonaws.com/id/ABC");
    }

    #[test]
    fn test_opted_out_group_still_gets_scoped_autoscaler_trust() {
        let mut batch = group("batch", "m5.xlarge");
        batch.autoscaler_discovery = Some(false);
        let config = PlanConfig::from_spec(&spec(vec![group("general", "m5.large"), batch])).unwrap();
        let infra = plan_infrastructure(&config, &catalog()).unwrap();

        let mut state = realized();
        state.node_groups.push(RealizedNodeGroup {
            name: "batch".to_string(),
            arn: "arn:aws:eks:us-west-2:123456789012:nodegroup/demo/batch/1".to_string(),
        });
        let plan = infra.complete(&config, &state).unwrap();

        let discovery_tag = |name: &str| {
            let Resource::NodeGroup(ng) = &plan.graph.find(&format!("ng-{}", name)).unwrap().resource else {
                panic!("expected node group");
            };
            ng.tags.contains_key("k8s.io/cluster-autoscaler/enabled")
        };
        assert!(discovery_tag("general"));
        assert!(!discovery_tag("batch"));

        let role = plan.federation.role(AUTOSCALER_IDENTITY).unwrap();
        for ng in &plan.node_groups {
            assert!(plan.graph.precedes(ng.node, role.node));
        }
        let Resource::IamRole(desc) = &plan.graph.get(role.node).resource else {
            panic!("expected role");
        };
        let doc = &desc.assume_role_policy["Statement"][0];
        assert_eq!(doc["Principal"]["Federated"], plan.federation.provider_arn.as_str());
        assert_eq!(
            plan.federation.provider_arn,
            "arn:aws:iam::123456789012:oidc-provider/oidc.eks.us-west-2.amazonaws.com/id/ABC"
        );
        let conditions = &doc["Condition"]["StringEquals"];
        assert_eq!(
            conditions["oidc.eks.us-west-2.amazonaws.com/id/ABC:sub"],
            "system:serviceaccount:kube-system:cluster-autoscaler"
        );
        assert_eq!(conditions["oidc.eks.us-west-2.amazonaws.com/id/ABC:aud"], "sts.amazonaws.com");
    }

    #[test]
    fn test_complete_waits_for_realized_control_plane() {
        let config = PlanConfig::from_spec(&spec(vec![])).unwrap();
        let infra = plan_infrastructure(&config, &catalog()).unwrap();
        assert!(matches!(
            infra.complete(&config, &RealizedCluster::default()),
            Err(PlannerError::UnresolvedAttribute(_))
        ));
    }

    #[test]
    fn test_plan_serializes_in_insertion_order() {
        let config = PlanConfig::from_spec(&spec(vec![group("general", "m5.large")])).unwrap();
        let plan = plan_infrastructure(&config, &catalog()).unwrap();
        let value = serde_json::to_value(&plan).unwrap();
        let nodes = value["graph"]["nodes"].as_array().unwrap();
        assert_eq!(nodes[0]["name"], "eks-vpc");
        assert_eq!(nodes[0]["resource"]["kind"], "vpc");

        let mut seen = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            for dep in node["dependsOn"].as_array().unwrap() {
                assert!((dep.as_u64().unwrap() as usize) < i);
            }
            seen.insert(node["name"].as_str().unwrap().to_string(), i);
        }
        assert!(seen["eks-cluster"] < seen["ng-general"]);
    }
}
