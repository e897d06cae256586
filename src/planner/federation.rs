// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Workload identity federation: the cluster's OIDC provider and roles
//! that service accounts assume through it.
//!
//! Everything here needs the realized issuer URL, so it is only planned
//! once the control plane exists.

use crate::constants::federation::{
    ASSUME_ROLE_WITH_WEB_IDENTITY, AUTOSCALER_NAMESPACE, AUTOSCALER_SERVICE_ACCOUNT, POLICY_VERSION,
};
use crate::error::{PlannerError, Result};
use crate::planner::addons::AddonKind;
use crate::planner::cluster::cluster_ref;
use crate::planner::deferred::{attr, Deferred};
use crate::planner::graph::{NodeId, PlanGraph};
use crate::planner::iam::attach_policies;
use crate::planner::input::PlanConfig;
use crate::planner::resources::{IamPolicyDescriptor, IamRoleDescriptor, OidcProviderDescriptor, Resource};
use crate::types::blueprint::RealizedCluster;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

pub const OIDC_PROVIDER_NODE: &str = "oidc-provider";
pub const AUTOSCALER_IDENTITY: &str = "cluster-autoscaler";

const AUTOSCALER_ACTIONS: [&str; 12] = [
    "autoscaling:DescribeAutoScalingGroups",
    "autoscaling:DescribeAutoScalingInstances",
    "autoscaling:DescribeLaunchConfigurations",
    "autoscaling:DescribeTags",
    "autoscaling:SetDesiredCapacity",
    "autoscaling:TerminateInstanceInAutoScalingGroup",
    "autoscaling:DescribeScalingActivities",
    "autoscaling:DescribeScheduledActions",
    "ec2:DescribeLaunchTemplateVersions",
    "ec2:DescribeInstanceTypes",
    "eks:DescribeCluster",
    "eks:DescribeNodegroup",
];

/// Issuer URL of the cluster's identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerUrl(Url);

impl IssuerUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| {
            PlannerError::InvalidConfiguration(format!("invalid issuer URL '{}': {}", raw, e))
        })?;
        if url.scheme() != "https" || url.host_str().is_none() {
            return Err(PlannerError::InvalidConfiguration(format!(
                "issuer URL '{}' must be an https URL with a host",
                raw
            )));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str().trim_end_matches('/')
    }

    /// Issuer without scheme, as used in trust condition keys
    pub fn host_path(&self) -> String {
        let host = self.0.host_str().unwrap_or_default();
        let path = self.0.path().trim_end_matches('/');
        match self.0.port() {
            Some(port) => format!("{}:{}{}", host, port, path),
            None => format!("{}{}", host, path),
        }
    }
}

/// ARN of the OIDC provider registered for `issuer`, in the partition and
/// account of the cluster.
pub fn provider_arn(cluster_arn: &str, issuer: &IssuerUrl) -> Result<String> {
    let parts: Vec<&str> = cluster_arn.split(':').collect();
    match parts.as_slice() {
        ["arn", partition, _, _, account, _] if !partition.is_empty() && !account.is_empty() => {
            Ok(format!(
                "arn:{}:iam::{}:oidc-provider/{}",
                partition,
                account,
                issuer.host_path()
            ))
        }
        _ => Err(PlannerError::InvalidConfiguration(format!(
            "malformed cluster ARN '{}'",
            cluster_arn
        ))),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FederatedPrincipal {
    pub federated: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TrustCondition {
    #[serde(default)]
    pub string_equals: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    pub effect: String,
    pub principal: FederatedPrincipal,
    pub action: String,
    #[serde(default)]
    pub condition: TrustCondition,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicyDocument {
    pub version: String,
    pub statement: Vec<TrustStatement>,
}

impl TrustPolicyDocument {
    /// Trust document letting exactly `subject` assume the role via the
    /// issuer, for `audience`.
    pub fn for_subject(issuer: &IssuerUrl, provider_arn: &str, audience: &str, subject: &str) -> Self {
        let key = issuer.host_path();
        let string_equals = BTreeMap::from([
            (format!("{}:sub", key), subject.to_string()),
            (format!("{}:aud", key), audience.to_string()),
        ]);
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![TrustStatement {
                effect: "Allow".to_string(),
                principal: FederatedPrincipal {
                    federated: provider_arn.to_string(),
                },
                action: ASSUME_ROLE_WITH_WEB_IDENTITY.to_string(),
                condition: TrustCondition { string_equals },
            }],
        }
    }

    /// Every statement must bind the issuer's `sub` condition to exactly
    /// `subject` and its `aud` condition to exactly `audience`.
    pub fn validate(&self, issuer: &IssuerUrl, audience: &str, subject: &str) -> Result<()> {
        let underscoped = |reason: String| PlannerError::UnderscopedTrustPolicy {
            subject: subject.to_string(),
            reason,
        };

        if self.statement.is_empty() {
            return Err(underscoped("document has no statements".to_string()));
        }

        let key = issuer.host_path();
        for statement in &self.statement {
            if statement.principal.federated.is_empty() {
                return Err(underscoped("missing federated principal".to_string()));
            }
            let conditions = &statement.condition.string_equals;
            for (suffix, expected) in [("sub", subject), ("aud", audience)] {
                match conditions.get(&format!("{}:{}", key, suffix)) {
                    Some(value) if value == expected => {}
                    Some(value) => {
                        return Err(underscoped(format!(
                            "{} condition is '{}', expected '{}'",
                            suffix, value, expected
                        )))
                    }
                    None => return Err(underscoped(format!("missing {} condition", suffix))),
                }
            }
        }
        Ok(())
    }
}

/// A Kubernetes service account that assumes a cloud role
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadIdentity {
    pub name: String,
    pub namespace: String,
    pub service_account: String,
    pub policy_arns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_policy: Option<Value>,
}

impl WorkloadIdentity {
    pub fn subject(&self) -> String {
        format!(
            "system:serviceaccount:{}:{}",
            self.namespace, self.service_account
        )
    }

    pub fn role_node_name(&self) -> String {
        format!("{}-role", self.name)
    }

    pub fn cluster_autoscaler() -> Self {
        Self {
            name: AUTOSCALER_IDENTITY.to_string(),
            namespace: AUTOSCALER_NAMESPACE.to_string(),
            service_account: AUTOSCALER_SERVICE_ACCOUNT.to_string(),
            policy_arns: Vec::new(),
            inline_policy: Some(autoscaler_policy()),
        }
    }
}

pub fn autoscaler_policy() -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Action": AUTOSCALER_ACTIONS,
            "Resource": "*",
        }]
    })
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FederatedRole {
    pub identity: String,
    pub subject: String,
    pub node: NodeId,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FederationPlan {
    pub issuer: String,
    pub provider_arn: String,
    pub provider: NodeId,
    pub roles: Vec<FederatedRole>,
}

impl FederationPlan {
    pub fn role(&self, identity: &str) -> Option<&FederatedRole> {
        self.roles.iter().find(|r| r.identity == identity)
    }
}

/// Plan the OIDC provider and one federated role per workload identity.
///
/// Roles are only planned once node groups have been realized; until then
/// the provider is the only output.
pub fn plan_federation(
    graph: &mut PlanGraph,
    config: &PlanConfig,
    realized: &RealizedCluster,
    cluster: NodeId,
    node_groups: &[NodeId],
) -> Result<FederationPlan> {
    let issuer = IssuerUrl::parse(cluster_ref(attr::OIDC_ISSUER).resolve(realized).require()?)?;
    let cluster_arn = cluster_ref(attr::ARN).resolve(realized);
    let provider_arn = provider_arn(cluster_arn.require()?, &issuer)?;
    let settings = &config.federation;

    let provider = graph.add(
        OIDC_PROVIDER_NODE,
        Resource::OidcProvider(OidcProviderDescriptor {
            url: issuer.as_str().to_string(),
            client_id_list: vec![settings.audience.clone()],
            thumbprint_list: vec![settings.thumbprint.clone()],
        }),
        &[cluster],
    )?;

    let mut plan = FederationPlan {
        issuer: issuer.as_str().to_string(),
        provider_arn: provider_arn.clone(),
        provider,
        roles: Vec::new(),
    };

    if realized.node_groups.is_empty() {
        info!("No realized node groups yet, planning OIDC provider only");
        return Ok(plan);
    }

    let mut identities = Vec::new();
    if config.addon_enabled(AddonKind::ClusterAutoscaler) {
        identities.push(WorkloadIdentity::cluster_autoscaler());
    }
    identities.extend(settings.identities.iter().cloned());

    let mut deps = vec![provider];
    deps.extend_from_slice(node_groups);

    for identity in &identities {
        let subject = identity.subject();
        let document = TrustPolicyDocument::for_subject(&issuer, &provider_arn, &settings.audience, &subject);
        document.validate(&issuer, &settings.audience, &subject)?;

        let role = graph.add(
            identity.role_node_name(),
            Resource::IamRole(IamRoleDescriptor {
                name: None,
                assume_role_policy: serde_json::to_value(&document)?,
                tags: config.base_tags.clone(),
            }),
            &deps,
        )?;

        let mut policy_arns: Vec<Deferred> = identity.policy_arns.iter().map(Deferred::known).collect();
        let mut attach_deps = Vec::new();
        if let Some(policy) = &identity.inline_policy {
            let policy_node_name = format!("{}-policy", identity.name);
            let policy_node = graph.add(
                policy_node_name.clone(),
                Resource::IamPolicy(IamPolicyDescriptor {
                    name: format!("{}-{}", config.cluster.name, identity.name),
                    policy: policy.clone(),
                    tags: config.base_tags.clone(),
                }),
                &[],
            )?;
            policy_arns.insert(0, Deferred::pending(policy_node_name, attr::ARN));
            attach_deps.push(policy_node);
        }
        attach_policies(graph, role, &policy_arns, &attach_deps)?;

        debug!("Planned federated role for {}", subject);
        plan.roles.push(FederatedRole {
            identity: identity.name.clone(),
            subject,
            node: role,
        });
    }

    Ok(plan)
}
