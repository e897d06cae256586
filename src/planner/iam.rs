// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service roles for the control plane and the worker nodes.

use crate::constants::federation::POLICY_VERSION;
use crate::error::Result;
use crate::planner::deferred::{attr, Deferred};
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::resources::{IamRoleDescriptor, Resource, RolePolicyAttachmentDescriptor};
use crate::planner::tags::TagSet;
use serde_json::{json, Value};

pub const CLUSTER_ROLE_NODE: &str = "eks-cluster-role";
pub const NODE_ROLE_NODE: &str = "eks-nodegroup-role";

const CLUSTER_POLICIES: [&str; 2] = [
    "arn:aws:iam::aws:policy/AmazonEKSClusterPolicy",
    "arn:aws:iam::aws:policy/AmazonEKSServicePolicy",
];

const NODE_POLICIES: [&str; 3] = [
    "arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy",
    "arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy",
    "arn:aws:iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
];

#[derive(Debug, Clone, Copy)]
pub struct ServiceRoles {
    pub cluster_role: NodeId,
    pub node_role: NodeId,
    /// Role plus its attachments; dependents wait for all of them
    pub cluster_role_deps: [NodeId; 3],
    pub node_role_deps: [NodeId; 4],
}

/// Trust document letting an AWS service assume a role
pub fn service_trust_policy(service: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Action": "sts:AssumeRole",
            "Principal": { "Service": service },
        }]
    })
}

/// Attach managed policies to a planned role. Returns the attachment nodes,
/// named `<role>-policy-<index>` in the order of `policy_arns`.
pub fn attach_policies(
    graph: &mut PlanGraph,
    role_node: NodeId,
    policy_arns: &[Deferred],
    extra_deps: &[NodeId],
) -> Result<Vec<NodeId>> {
    let role_name = graph.get(role_node).name.clone();
    let mut deps = vec![role_node];
    deps.extend_from_slice(extra_deps);

    policy_arns
        .iter()
        .enumerate()
        .map(|(i, arn)| {
            graph.add(
                format!("{}-policy-{}", role_name, i),
                Resource::RolePolicyAttachment(RolePolicyAttachmentDescriptor {
                    role: Deferred::pending(role_name.clone(), attr::NAME),
                    policy_arn: arn.clone(),
                }),
                &deps,
            )
        })
        .collect()
}

pub fn plan_service_roles(
    graph: &mut PlanGraph,
    cluster_name: &str,
    base_tags: &TagSet,
) -> Result<ServiceRoles> {
    let cluster_role = graph.add(
        CLUSTER_ROLE_NODE,
        Resource::IamRole(IamRoleDescriptor {
            name: Some(format!("{}-eks-role", cluster_name)),
            assume_role_policy: service_trust_policy("eks.amazonaws.com"),
            tags: base_tags.clone(),
        }),
        &[],
    )?;
    let cluster_attachments = attach_policies(
        graph,
        cluster_role,
        &CLUSTER_POLICIES.map(Deferred::known),
        &[],
    )?;

    let node_role = graph.add(
        NODE_ROLE_NODE,
        Resource::IamRole(IamRoleDescriptor {
            name: None,
            assume_role_policy: service_trust_policy("ec2.amazonaws.com"),
            tags: base_tags.clone(),
        }),
        &[],
    )?;
    let node_attachments =
        attach_policies(graph, node_role, &NODE_POLICIES.map(Deferred::known), &[])?;

    Ok(ServiceRoles {
        cluster_role,
        node_role,
        cluster_role_deps: [cluster_role, cluster_attachments[0], cluster_attachments[1]],
        node_role_deps: [
            node_role,
            node_attachments[0],
            node_attachments[1],
            node_attachments[2],
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_and_attachments_planned() {
        let mut g = PlanGraph::new();
        let roles = plan_service_roles(&mut g, "demo", &TagSet::new()).unwrap();

        assert_eq!(g.len(), 7);
        let attach = g
            .find("eks-nodegroup-role-policy-1")
            .expect("cni attachment");
        assert_eq!(attach.depends_on, vec![roles.node_role]);
        let Resource::RolePolicyAttachment(desc) = &attach.resource else {
            panic!("expected attachment");
        };
        assert_eq!(
            desc.policy_arn,
            Deferred::known("arn:aws:iam::aws:policy/AmazonEKS_CNI_Policy")
        );

        let Resource::IamRole(role) = &g.get(roles.cluster_role).resource else {
            panic!("expected role");
        };
        assert_eq!(role.name.as_deref(), Some("demo-eks-role"));
        assert_eq!(
            role.assume_role_policy["Statement"][0]["Principal"]["Service"],
            "eks.amazonaws.com"
        );
    }

    #[test]
    fn test_pending_policy_arn_gets_indexed_name() {
        let mut g = PlanGraph::new();
        let role = g
            .add(
                "workload-role",
                Resource::IamRole(IamRoleDescriptor {
                    name: None,
                    assume_role_policy: service_trust_policy("ec2.amazonaws.com"),
                    tags: TagSet::new(),
                }),
                &[],
            )
            .unwrap();
        let ids = attach_policies(&mut g, role, &[Deferred::pending("custom-policy", attr::ARN)], &[]).unwrap();
        assert_eq!(g.get(ids[0]).name, "workload-role-policy-0");
    }

    #[test]
    fn test_policies_sharing_a_short_name_get_distinct_nodes() {
        let mut g = PlanGraph::new();
        let role = g
            .add(
                "app-role",
                Resource::IamRole(IamRoleDescriptor {
                    name: None,
                    assume_role_policy: service_trust_policy("ec2.amazonaws.com"),
                    tags: TagSet::new(),
                }),
                &[],
            )
            .unwrap();
        let arns = [
            Deferred::known("arn:aws:iam::aws:policy/ReadOnly"),
            Deferred::known("arn:aws:iam::123456789012:policy/ReadOnly"),
        ];
        let ids = attach_policies(&mut g, role, &arns, &[]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(g.get(ids[0]).name, "app-role-policy-0");
        assert_eq!(g.get(ids[1]).name, "app-role-policy-1");
    }
}
