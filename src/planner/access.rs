// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Client access document and cluster summary.

use crate::constants::access::{CONTEXT, EXEC_API_VERSION, EXEC_COMMAND, USER};
use crate::error::Result;
use crate::planner::cluster::cluster_ref;
use crate::planner::deferred::attr;
use crate::planner::input::PlanConfig;
use crate::types::blueprint::{ClusterSummary, RealizedCluster, SecurityGroupSummary};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClusterEndpoint {
    pub server: String,
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NamedClusterEntry {
    pub cluster: ClusterEndpoint,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ContextBinding {
    pub cluster: String,
    pub user: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NamedContextEntry {
    pub context: ContextBinding,
    pub name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecPlugin {
    pub api_version: String,
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserCredentials {
    pub exec: ExecPlugin,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NamedUserEntry {
    pub name: String,
    pub user: UserCredentials,
}

/// Kubeconfig-shaped document granting token-based access to the cluster
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AccessDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedClusterEntry>,
    pub contexts: Vec<NamedContextEntry>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub kind: String,
    pub users: Vec<NamedUserEntry>,
}

impl AccessDocument {
    pub fn new(cluster_name: &str, endpoint: &str, certificate_authority_data: &str) -> Self {
        Self {
            api_version: "v1".to_string(),
            clusters: vec![NamedClusterEntry {
                cluster: ClusterEndpoint {
                    server: endpoint.to_string(),
                    certificate_authority_data: certificate_authority_data.to_string(),
                },
                name: cluster_name.to_string(),
            }],
            contexts: vec![NamedContextEntry {
                context: ContextBinding {
                    cluster: cluster_name.to_string(),
                    user: USER.to_string(),
                },
                name: CONTEXT.to_string(),
            }],
            current_context: CONTEXT.to_string(),
            kind: "Config".to_string(),
            users: vec![NamedUserEntry {
                name: USER.to_string(),
                user: UserCredentials {
                    exec: ExecPlugin {
                        api_version: EXEC_API_VERSION.to_string(),
                        command: EXEC_COMMAND.to_string(),
                        args: ["eks", "get-token", "--cluster-name", cluster_name]
                            .iter()
                            .map(|a| a.to_string())
                            .collect(),
                    },
                },
            }],
        }
    }

    /// Build from the realized endpoint and CA data. Fails with
    /// `UnresolvedAttribute` until both are known.
    pub fn from_realized(cluster_name: &str, realized: &RealizedCluster) -> Result<Self> {
        let endpoint = cluster_ref(attr::ENDPOINT).resolve(realized);
        let ca = cluster_ref(attr::CERTIFICATE_AUTHORITY).resolve(realized);
        Ok(Self::new(cluster_name, endpoint.require()?, ca.require()?))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Summary of the realized cluster for export
pub fn cluster_summary(config: &PlanConfig, realized: &RealizedCluster) -> ClusterSummary {
    ClusterSummary {
        name: config.cluster.name.clone(),
        arn: realized.arn.clone(),
        endpoint: realized.endpoint.clone(),
        region: config.cluster.region.clone(),
        version: realized
            .version
            .clone()
            .unwrap_or_else(|| config.cluster.version.clone()),
        vpc_id: realized.vpc_id.clone(),
        vpc_cidr: config.network.vpc_cidr.clone(),
        subnet_ids: realized.subnet_ids.clone(),
        security_groups: SecurityGroupSummary {
            eks_control_plane: realized.control_plane_security_group_id.clone(),
            node_group: realized.node_security_group_id.clone(),
        },
        node_groups: realized.node_groups.clone(),
    }
}
