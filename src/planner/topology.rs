// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! VPC layout and security-group rule sets.

use crate::constants::network::ANY_IPV4;
use crate::constants::ports;
use crate::constants::tags as tag_keys;
use crate::error::{PlannerError, Result};
use crate::planner::deferred::{attr, Deferred};
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::partition::{parse_ipv4_block, SubnetPlan};
use crate::planner::resources::{
    InternetGatewayDescriptor, Protocol, Resource, Route, RouteTableAssociationDescriptor,
    RouteTableDescriptor, RuleDirection, RulePeer, SecurityGroupDescriptor,
    SecurityGroupRuleDescriptor, SecurityRule, SubnetDescriptor, VpcDescriptor,
};
use crate::planner::tags::{merge, TagSet};
use ipnet::Ipv4Net;
use tracing::debug;

pub const VPC_NODE: &str = "eks-vpc";
pub const NODE_SG_NODE: &str = "nodegroup-sg";
pub const CONTROL_PLANE_SG_NODE: &str = "eks-sg";

/// Node-level ingress rules, each planned as its own rule object
pub const NODE_RULE_NODES: [&str; 4] = [
    "node-self-all",
    "node-from-controlplane-kubelet",
    "node-from-controlplane-nodeport",
    "node-from-controlplane-ephemeral",
];

#[derive(Clone, Debug, PartialEq)]
pub struct SecurityTopology {
    /// Ingress rules of the node security group, in `NODE_RULE_NODES` order
    pub node_ingress: Vec<SecurityRule>,
    pub control_plane_ingress: Vec<SecurityRule>,
    pub egress: Vec<SecurityRule>,
    trusted_cidrs: Vec<String>,
}

fn rule(protocol: Protocol, from: u16, to: u16, peer: RulePeer, description: &str) -> SecurityRule {
    SecurityRule {
        protocol,
        from_port: from,
        to_port: to,
        peer,
        description: description.to_string(),
    }
}

fn node_sg_ref() -> Deferred {
    Deferred::pending(NODE_SG_NODE, attr::ID)
}

fn control_plane_sg_ref() -> Deferred {
    Deferred::pending(CONTROL_PLANE_SG_NODE, attr::ID)
}

impl SecurityTopology {
    /// Build the fixed rule set. An empty trusted set adds no CIDR rule.
    pub fn build(trusted_cidrs: &[Ipv4Net]) -> Self {
        let cp = || RulePeer::SecurityGroup(control_plane_sg_ref());

        let node_ingress = vec![
            rule(Protocol::All, 0, 0, RulePeer::SelfGroup, "node to node, all protocols"),
            rule(Protocol::Tcp, ports::KUBELET, ports::KUBELET, cp(), "control plane to kubelet"),
            rule(
                Protocol::Tcp,
                ports::NODE_PORT_START,
                ports::NODE_PORT_END,
                cp(),
                "control plane to NodePort services",
            ),
            rule(
                Protocol::Tcp,
                ports::EPHEMERAL_START,
                ports::EPHEMERAL_END,
                cp(),
                "control plane callbacks for exec and logs",
            ),
        ];

        let trusted: Vec<String> = trusted_cidrs.iter().map(|c| c.to_string()).collect();

        let mut control_plane_ingress = vec![rule(
            Protocol::Tcp,
            ports::API_SERVER,
            ports::API_SERVER,
            RulePeer::SecurityGroup(node_sg_ref()),
            "nodes to API server",
        )];
        if !trusted.is_empty() {
            control_plane_ingress.push(rule(
                Protocol::Tcp,
                ports::API_SERVER,
                ports::API_SERVER,
                RulePeer::Cidrs(trusted.clone()),
                "trusted networks to API server",
            ));
        }

        let egress = vec![rule(
            Protocol::All,
            0,
            0,
            RulePeer::Cidrs(vec![ANY_IPV4.to_string()]),
            "all egress",
        )];

        Self {
            node_ingress,
            control_plane_ingress,
            egress,
            trusted_cidrs: trusted,
        }
    }

    /// Reject control-plane ingress that reaches beyond the node group and
    /// the declared trusted networks.
    pub fn validate(&self) -> Result<()> {
        for r in &self.control_plane_ingress {
            let allowed = match &r.peer {
                RulePeer::SecurityGroup(sg) => *sg == node_sg_ref(),
                RulePeer::Cidrs(cidrs) => cidrs.iter().all(|c| self.trusted_cidrs.contains(c)),
                RulePeer::SelfGroup => false,
            };
            if !allowed {
                return Err(PlannerError::InvalidNetworkSpec(format!(
                    "control plane rule '{}' allows ingress beyond the trusted set",
                    r.description
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct NetworkNodes {
    pub vpc: NodeId,
    /// Subnet node per availability zone, in subnet plan order
    pub subnets: Vec<(String, NodeId)>,
    pub node_sg: NodeId,
    pub control_plane_sg: NodeId,
    pub node_rules: Vec<NodeId>,
}

impl NetworkNodes {
    pub fn subnet_refs(&self, graph: &PlanGraph) -> Vec<Deferred> {
        self.subnets
            .iter()
            .map(|(_, id)| Deferred::pending(graph.get(*id).name.clone(), attr::ID))
            .collect()
    }

    pub fn subnet_for_zone(&self, zone: &str) -> Option<NodeId> {
        self.subnets
            .iter()
            .find(|(z, _)| z == zone)
            .map(|(_, id)| *id)
    }
}

pub fn subnet_node_name(zone: &str) -> String {
    format!("subnet-{}", zone)
}

/// Parse the trusted CIDR list
pub fn parse_trusted_cidrs(cidrs: &[String]) -> Result<Vec<Ipv4Net>> {
    cidrs.iter().map(|c| parse_ipv4_block(c)).collect()
}

/// Emit VPC, routing, subnets and security groups into the graph.
pub fn plan_network(
    graph: &mut PlanGraph,
    cluster_name: &str,
    subnets: &SubnetPlan,
    topology: &SecurityTopology,
    base_tags: &TagSet,
) -> Result<NetworkNodes> {
    topology.validate()?;

    let named = |suffix: &str| TagSet::new().with(tag_keys::NAME, format!("{}-{}", cluster_name, suffix));
    let vpc_ref = || Deferred::pending(VPC_NODE, attr::ID);

    let vpc = graph.add(
        VPC_NODE,
        Resource::Vpc(VpcDescriptor {
            cidr_block: subnets.vpc_cidr.to_string(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
            tags: merge(&[base_tags, &named("vpc")]),
        }),
        &[],
    )?;

    let igw = graph.add(
        "vpc-igw",
        Resource::InternetGateway(InternetGatewayDescriptor {
            vpc_id: vpc_ref(),
            tags: merge(&[base_tags, &named("igw")]),
        }),
        &[vpc],
    )?;

    let route_table = graph.add(
        "vpc-rt",
        Resource::RouteTable(RouteTableDescriptor {
            vpc_id: vpc_ref(),
            routes: vec![Route {
                cidr_block: ANY_IPV4.to_string(),
                gateway_id: Deferred::pending("vpc-igw", attr::ID),
            }],
            tags: merge(&[base_tags, &named("rt")]),
        }),
        &[vpc, igw],
    )?;

    let structural = TagSet::new()
        .with(format!("{}{}", tag_keys::CLUSTER_PREFIX, cluster_name), "owned")
        .with(tag_keys::ROLE_ELB, "1")
        .with(tag_keys::ROLE_INTERNAL_ELB, "1");

    let mut subnet_nodes = Vec::with_capacity(subnets.subnets.len());
    for s in &subnets.subnets {
        let zone = &s.availability_zone;
        let name = subnet_node_name(zone);
        let id = graph.add(
            name.clone(),
            Resource::Subnet(SubnetDescriptor {
                vpc_id: vpc_ref(),
                availability_zone: zone.clone(),
                cidr_block: s.cidr_block.to_string(),
                map_public_ip_on_launch: true,
                tags: merge(&[base_tags, &named(&format!("subnet-{}", zone)), &structural]),
            }),
            &[vpc],
        )?;
        graph.add(
            format!("subnet-rta-{}", zone),
            Resource::RouteTableAssociation(RouteTableAssociationDescriptor {
                subnet_id: Deferred::pending(name, attr::ID),
                route_table_id: Deferred::pending("vpc-rt", attr::ID),
            }),
            &[id, route_table],
        )?;
        subnet_nodes.push((zone.clone(), id));
    }

    // The node group starts without ingress; its rules are separate objects
    // because they reference the control-plane group, which references it.
    let node_sg = graph.add(
        NODE_SG_NODE,
        Resource::SecurityGroup(SecurityGroupDescriptor {
            vpc_id: vpc_ref(),
            description: "Security group for EKS worker nodes".to_string(),
            ingress: Vec::new(),
            egress: topology.egress.clone(),
            tags: merge(&[base_tags, &named("node-sg")]),
        }),
        &[vpc],
    )?;

    let control_plane_sg = graph.add(
        CONTROL_PLANE_SG_NODE,
        Resource::SecurityGroup(SecurityGroupDescriptor {
            vpc_id: vpc_ref(),
            description: "EKS control plane security group".to_string(),
            ingress: topology.control_plane_ingress.clone(),
            egress: topology.egress.clone(),
            tags: merge(&[base_tags, &named("controlplane-sg")]),
        }),
        &[vpc, node_sg],
    )?;

    let node_rules = NODE_RULE_NODES
        .iter()
        .zip(&topology.node_ingress)
        .map(|(name, r)| {
            graph.add(
                *name,
                Resource::SecurityGroupRule(SecurityGroupRuleDescriptor {
                    direction: RuleDirection::Ingress,
                    security_group_id: node_sg_ref(),
                    rule: r.clone(),
                }),
                &[node_sg, control_plane_sg],
            )
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Planned network: {} subnets, {} node rules",
        subnet_nodes.len(),
        node_rules.len()
    );

    Ok(NetworkNodes {
        vpc,
        subnets: subnet_nodes,
        node_sg,
        control_plane_sg,
        node_rules,
    })
}
