// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Normalized, immutable planner configuration.
//!
//! A [`ClusterBlueprintSpec`] is resolved exactly once into a [`PlanConfig`]:
//! defaults are filled in, node-group defaults are applied, and the endpoint
//! access rule is checked before anything else happens. Every planner stage
//! receives the same `&PlanConfig`.

use crate::error::{PlannerError, Result};
use crate::planner::addons::{AddonKind, AddonRequest};
use crate::planner::federation::{WorkloadIdentity, AUTOSCALER_IDENTITY};
use crate::planner::iam::{CLUSTER_ROLE_NODE, NODE_ROLE_NODE};
use crate::planner::tags::TagSet;
use crate::types::blueprint::{
    ChartSettings, ClusterBlueprintSpec, NodeGroupDefaults, NodeGroupSettings, TaintSettings,
    WorkloadIdentitySettings,
};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_CLUSTER_NAME: &str = "eks-cluster";
pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_VERSION: &str = "1.30";
pub const DEFAULT_VPC_CIDR: &str = "10.100.0.0/16";
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_OIDC_THUMBPRINT: &str = "9e99a48a9960b14926bb7f3b02e22da0ecd2e9d0";
pub const DEFAULT_LOG_TYPES: [&str; 5] = [
    "api",
    "audit",
    "authenticator",
    "controllerManager",
    "scheduler",
];
pub const DEFAULT_MANAGED_ADDONS: [&str; 3] = ["vpc-cni", "kube-proxy", "coredns"];

#[derive(Clone, Debug, PartialEq)]
pub struct EndpointAccess {
    pub public: bool,
    pub private: bool,
    /// Only applied when `public` is set
    pub public_cidrs: Vec<String>,
}

impl EndpointAccess {
    pub fn validate(&self) -> Result<()> {
        if self.public || self.private {
            Ok(())
        } else {
            Err(PlannerError::EndpointAccessUnset)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSettings {
    pub name: String,
    pub version: String,
    pub region: String,
    pub log_types: Vec<String>,
    /// `None` leaves log retention unmanaged and plans no log group
    pub log_retention_days: Option<u32>,
    pub endpoint: EndpointAccess,
    pub encryption: bool,
    pub deletion_protection: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkSettings {
    pub vpc_cidr: String,
    pub max_azs: Option<u32>,
    pub availability_zones: Vec<String>,
    pub trusted_cidrs: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capacity {
    pub min: u32,
    pub desired: u32,
    pub max: u32,
}

impl Capacity {
    pub fn check(&self, node_group: &str) -> Result<()> {
        if self.min <= self.desired && self.desired <= self.max {
            Ok(())
        } else {
            Err(PlannerError::CapacityInvariantViolated {
                node_group: node_group.to_string(),
                min: self.min,
                desired: self.desired,
                max: self.max,
            })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubnetSelection {
    /// The cluster-wide subnet set
    Default,
    Ids(Vec<String>),
    Zones(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeGroupSpec {
    pub name: String,
    pub instance_type: String,
    pub architecture: String,
    pub image_family: String,
    pub image_id: Option<String>,
    pub ssh_key_name: Option<String>,
    pub capacity: Capacity,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<TaintSettings>,
    pub subnets: SubnetSelection,
    pub autoscaler_discovery: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FederationSettings {
    pub thumbprint: String,
    pub audience: String,
    pub identities: Vec<WorkloadIdentity>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanConfig {
    pub environment: String,
    pub cluster: ClusterSettings,
    pub network: NetworkSettings,
    pub node_groups: Vec<NodeGroupSpec>,
    pub addons: BTreeMap<AddonKind, AddonRequest>,
    pub efs_deletion_protection: bool,
    /// `None` when managed add-ons are disabled
    pub managed_addons: Option<BTreeMap<String, Option<String>>>,
    pub federation: FederationSettings,
    pub base_tags: TagSet,
}

impl PlanConfig {
    /// Resolve a blueprint spec. Fails with `EndpointAccessUnset` before
    /// looking at anything else.
    pub fn from_spec(spec: &ClusterBlueprintSpec) -> Result<Self> {
        let endpoint = EndpointAccess {
            public: spec.public_access.unwrap_or(false),
            private: spec.private_access.unwrap_or(true),
            public_cidrs: spec
                .public_access_cidrs
                .clone()
                .unwrap_or_else(|| vec![crate::constants::network::ANY_IPV4.to_string()]),
        };
        endpoint.validate()?;

        let environment = spec.environment.clone().unwrap_or_else(|| "dev".to_string());
        let is_prod = environment == "prod";
        let name = spec
            .cluster_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        let cluster = ClusterSettings {
            name: name.clone(),
            version: spec
                .cluster_version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            region: spec.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string()),
            log_types: spec
                .cluster_log_types
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_TYPES.iter().map(|s| s.to_string()).collect()),
            log_retention_days: match spec.log_retention_days {
                Some(0) => None,
                Some(days) => Some(days),
                None => Some(DEFAULT_LOG_RETENTION_DAYS),
            },
            endpoint,
            encryption: spec.enable_kms_encryption.unwrap_or(true),
            deletion_protection: spec.cluster_deletion_protection.unwrap_or(is_prod),
        };

        let net = spec.network.clone().unwrap_or_default();
        let network = NetworkSettings {
            vpc_cidr: net.vpc_cidr.unwrap_or_else(|| DEFAULT_VPC_CIDR.to_string()),
            max_azs: net.max_azs,
            availability_zones: net.availability_zones,
            trusted_cidrs: spec.trusted_cidrs.clone().unwrap_or_default(),
        };

        let defaults = spec.node_group_defaults.clone().unwrap_or_default();
        let node_groups = spec
            .node_groups
            .iter()
            .enumerate()
            .map(|(i, ng)| normalize_node_group(i, ng, &defaults))
            .collect::<Result<Vec<_>>>()?;

        let mut seen = BTreeSet::new();
        for ng in &node_groups {
            if !seen.insert(ng.name.as_str()) {
                return Err(PlannerError::InvalidConfiguration(format!(
                    "duplicate node group name '{}'",
                    ng.name
                )));
            }
        }

        let addon_settings = spec.addons.clone().unwrap_or_default();
        let addons: BTreeMap<AddonKind, AddonRequest> = AddonKind::ALL
            .iter()
            .map(|kind| {
                let settings = match kind {
                    AddonKind::EfsCsi => &addon_settings.efs,
                    AddonKind::EbsCsi => &addon_settings.ebs,
                    AddonKind::IngressNginx => &addon_settings.ingress_nginx,
                    AddonKind::PrometheusStack => &addon_settings.prometheus_stack,
                    AddonKind::ClusterAutoscaler => &addon_settings.cluster_autoscaler,
                };
                (*kind, addon_request(*kind, settings.as_ref()))
            })
            .collect();

        let managed = spec.managed_addons.clone().unwrap_or_default();
        let managed_addons = if managed.enabled.unwrap_or(true) {
            Some(managed.versions.unwrap_or_else(|| {
                DEFAULT_MANAGED_ADDONS
                    .iter()
                    .map(|a| (a.to_string(), None))
                    .collect()
            }))
        } else {
            None
        };

        let autoscaler_enabled = addons
            .get(&AddonKind::ClusterAutoscaler)
            .is_some_and(|r| r.enabled);
        let identities = normalize_identities(
            spec.workload_identities.clone().unwrap_or_default(),
            autoscaler_enabled,
        )?;

        let base_tags = TagSet::new()
            .with("Environment", environment.clone())
            .with("Owner", spec.owner.clone().unwrap_or_else(|| "team-platform".to_string()))
            .with("CostCenter", spec.cost_center.clone().unwrap_or_else(|| "shared".to_string()))
            .with("ManagedBy", crate::constants::OPERATOR_NAME)
            .with("Cluster", name)
            .overlay(&TagSet::from(spec.tags.clone().unwrap_or_default()));

        Ok(PlanConfig {
            environment,
            cluster,
            network,
            node_groups,
            addons,
            efs_deletion_protection: spec.efs_deletion_protection.unwrap_or(is_prod),
            managed_addons,
            federation: FederationSettings {
                thumbprint: spec
                    .oidc_thumbprint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OIDC_THUMBPRINT.to_string()),
                audience: crate::constants::federation::AUDIENCE.to_string(),
                identities,
            },
            base_tags,
        })
    }

    pub fn addon_enabled(&self, kind: AddonKind) -> bool {
        self.addons.get(&kind).is_some_and(|r| r.enabled)
    }
}

/// Workload identities are checked here so that a bad identity fails the
/// blueprint before any infrastructure is realized, not once federation is
/// planned.
fn normalize_identities(
    identities: Vec<WorkloadIdentitySettings>,
    autoscaler_enabled: bool,
) -> Result<Vec<WorkloadIdentity>> {
    let mut seen = BTreeSet::new();
    identities
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            let invalid = |msg: String| {
                PlannerError::InvalidConfiguration(format!("workload_identities[{}] {}", i, msg))
            };
            for (field, value) in [
                ("name", &w.name),
                ("namespace", &w.namespace),
                ("service_account", &w.service_account),
            ] {
                if value.trim().is_empty() {
                    return Err(invalid(format!("missing '{}'", field)));
                }
            }
            if autoscaler_enabled && w.name == AUTOSCALER_IDENTITY {
                return Err(invalid(format!(
                    "name '{}' is reserved while the cluster autoscaler is enabled",
                    w.name
                )));
            }
            let identity = WorkloadIdentity {
                name: w.name,
                namespace: w.namespace,
                service_account: w.service_account,
                policy_arns: Vec::new(),
                inline_policy: None,
            };
            let role_node = identity.role_node_name();
            if role_node == CLUSTER_ROLE_NODE || role_node == NODE_ROLE_NODE {
                return Err(invalid(format!("name '{}' clashes with a service role", identity.name)));
            }
            if !seen.insert(identity.name.clone()) {
                return Err(invalid(format!("duplicate name '{}'", identity.name)));
            }

            let mut arns = BTreeSet::new();
            let policy_arns = w
                .policy_arns
                .into_iter()
                .filter(|arn| arns.insert(arn.clone()))
                .collect();
            Ok(WorkloadIdentity { policy_arns, ..identity })
        })
        .collect()
}

fn addon_request(kind: AddonKind, settings: Option<&ChartSettings>) -> AddonRequest {
    AddonRequest {
        enabled: settings
            .and_then(|s| s.enabled)
            .unwrap_or_else(|| kind.enabled_by_default()),
        version: settings.and_then(|s| s.version.clone()),
        values: settings.and_then(|s| s.values.clone()),
    }
}

fn normalize_node_group(
    index: usize,
    ng: &NodeGroupSettings,
    defaults: &NodeGroupDefaults,
) -> Result<NodeGroupSpec> {
    let name = ng
        .name
        .clone()
        .unwrap_or_else(|| format!("node-group-{}", index));

    let instance_type = ng
        .instance_type
        .clone()
        .or_else(|| defaults.instance_type.clone())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            PlannerError::InvalidConfiguration(format!("node_groups[{}] missing 'instance_type'", index))
        })?;

    let capacity = match (
        ng.min_capacity.or(defaults.min_capacity),
        ng.desired_capacity.or(defaults.desired_capacity),
        ng.max_capacity.or(defaults.max_capacity),
    ) {
        (Some(min), Some(desired), Some(max)) => Capacity { min, desired, max },
        _ => {
            return Err(PlannerError::InvalidConfiguration(format!(
                "node_groups[{}] must include desired_capacity, min_capacity, max_capacity",
                index
            )))
        }
    };

    let subnets = match (&ng.subnet_ids, &ng.subnet_azs) {
        (Some(ids), _) if !ids.is_empty() => SubnetSelection::Ids(ids.clone()),
        (_, Some(zones)) if !zones.is_empty() => SubnetSelection::Zones(zones.clone()),
        _ => SubnetSelection::Default,
    };

    Ok(NodeGroupSpec {
        name,
        instance_type,
        architecture: ng
            .architecture
            .clone()
            .or_else(|| defaults.architecture.clone())
            .unwrap_or_else(|| "x86_64".to_string()),
        image_family: ng
            .ami_family
            .clone()
            .or_else(|| defaults.ami_family.clone())
            .unwrap_or_else(|| "al2".to_string()),
        image_id: ng.ami_id.clone().filter(|id| !id.is_empty()),
        ssh_key_name: ng.ssh_keypair_name.clone(),
        capacity,
        labels: ng.labels.clone(),
        taints: ng.taints.clone(),
        subnets,
        autoscaler_discovery: ng.autoscaler_discovery.unwrap_or(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::blueprint::{AddonSettings, ManagedAddonSettings};

    fn identity(name: &str, policy_arns: &[&str]) -> WorkloadIdentitySettings {
        WorkloadIdentitySettings {
            name: name.to_string(),
            namespace: "apps".to_string(),
            service_account: name.to_string(),
            policy_arns: policy_arns.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn with_identities(identities: Vec<WorkloadIdentitySettings>) -> ClusterBlueprintSpec {
        ClusterBlueprintSpec {
            workload_identities: Some(identities),
            ..Default::default()
        }
    }

    fn group(name: &str) -> NodeGroupSettings {
        NodeGroupSettings {
            name: Some(name.to_string()),
            instance_type: Some("m5.large".to_string()),
            min_capacity: Some(1),
            desired_capacity: Some(2),
            max_capacity: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_unset_fields_get_defaults() {
        let cfg = PlanConfig::from_spec(&ClusterBlueprintSpec::default()).unwrap();

        assert_eq!(cfg.cluster.name, "eks-cluster");
        assert_eq!(cfg.cluster.version, "1.30");
        assert!(!cfg.cluster.endpoint.public);
        assert!(cfg.cluster.endpoint.private);
        assert_eq!(cfg.cluster.log_retention_days, Some(30));
        assert_eq!(cfg.cluster.log_types.len(), 5);
        assert!(cfg.cluster.encryption);
        assert!(!cfg.cluster.deletion_protection);
        assert_eq!(cfg.network.vpc_cidr, "10.100.0.0/16");
        assert!(cfg.node_groups.is_empty());
        assert!(cfg.addon_enabled(AddonKind::ClusterAutoscaler));
        assert!(!cfg.addon_enabled(AddonKind::IngressNginx));
        assert_eq!(cfg.managed_addons.as_ref().map(|m| m.len()), Some(3));
        assert_eq!(cfg.base_tags.get("ManagedBy"), Some("skyforge"));
    }

    #[test]
    fn test_prod_enables_deletion_protection() {
        let spec = ClusterBlueprintSpec {
            environment: Some("prod".to_string()),
            ..Default::default()
        };
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        assert!(cfg.cluster.deletion_protection);
        assert!(cfg.efs_deletion_protection);
    }

    #[test]
    fn test_endpoint_access_unset_fails_first() {
        let spec = ClusterBlueprintSpec {
            public_access: Some(false),
            private_access: Some(false),
            // Would fail later if normalization got that far
            node_groups: vec![NodeGroupSettings::default()],
            ..Default::default()
        };
        assert!(matches!(
            PlanConfig::from_spec(&spec),
            Err(PlannerError::EndpointAccessUnset)
        ));
    }

    #[test]
    fn test_missing_instance_type_or_capacity() {
        let mut ng = group("a");
        ng.instance_type = None;
        let spec = ClusterBlueprintSpec {
            node_groups: vec![ng],
            ..Default::default()
        };
        assert!(matches!(
            PlanConfig::from_spec(&spec),
            Err(PlannerError::InvalidConfiguration(_))
        ));

        let mut ng = group("a");
        ng.max_capacity = None;
        let spec = ClusterBlueprintSpec {
            node_groups: vec![ng],
            ..Default::default()
        };
        assert!(PlanConfig::from_spec(&spec).is_err());
    }

    #[test]
    fn test_node_group_defaults_fill_gaps() {
        let spec = ClusterBlueprintSpec {
            node_group_defaults: Some(NodeGroupDefaults {
                instance_type: Some("t4g.medium".to_string()),
                architecture: Some("arm64".to_string()),
                min_capacity: Some(1),
                desired_capacity: Some(1),
                max_capacity: Some(5),
                ..Default::default()
            }),
            node_groups: vec![NodeGroupSettings {
                desired_capacity: Some(3),
                ..Default::default()
            }],
            ..Default::default()
        };
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        let ng = &cfg.node_groups[0];
        assert_eq!(ng.name, "node-group-0");
        assert_eq!(ng.instance_type, "t4g.medium");
        assert_eq!(ng.architecture, "arm64");
        assert_eq!(ng.image_family, "al2");
        assert_eq!(ng.capacity, Capacity { min: 1, desired: 3, max: 5 });
    }

    #[test]
    fn test_duplicate_node_group_names_rejected() {
        let spec = ClusterBlueprintSpec {
            node_groups: vec![group("a"), group("a")],
            ..Default::default()
        };
        assert!(matches!(
            PlanConfig::from_spec(&spec),
            Err(PlannerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_subnet_ids_take_precedence_over_zones() {
        let mut ng = group("a");
        ng.subnet_ids = Some(vec!["subnet-123".to_string()]);
        ng.subnet_azs = Some(vec!["us-west-2a".to_string()]);
        let spec = ClusterBlueprintSpec {
            node_groups: vec![ng],
            ..Default::default()
        };
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        assert_eq!(
            cfg.node_groups[0].subnets,
            SubnetSelection::Ids(vec!["subnet-123".to_string()])
        );
    }

    #[test]
    fn test_zero_retention_disables_log_group() {
        let spec = ClusterBlueprintSpec {
            log_retention_days: Some(0),
            ..Default::default()
        };
        assert_eq!(PlanConfig::from_spec(&spec).unwrap().cluster.log_retention_days, None);
    }

    #[test]
    fn test_addon_and_managed_addon_overrides() {
        let spec = ClusterBlueprintSpec {
            addons: Some(AddonSettings {
                ingress_nginx: Some(ChartSettings {
                    enabled: Some(true),
                    version: Some("4.11.0".to_string()),
                    values: None,
                }),
                ..Default::default()
            }),
            managed_addons: Some(ManagedAddonSettings {
                enabled: Some(false),
                versions: None,
            }),
            ..Default::default()
        };
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        assert!(cfg.addon_enabled(AddonKind::IngressNginx));
        assert_eq!(
            cfg.addons[&AddonKind::IngressNginx].version.as_deref(),
            Some("4.11.0")
        );
        assert!(cfg.managed_addons.is_none());
    }

    #[test]
    fn test_user_tags_override_base_tags() {
        let spec = ClusterBlueprintSpec {
            tags: Some(BTreeMap::from([("Owner".to_string(), "team-data".to_string())])),
            ..Default::default()
        };
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        assert_eq!(cfg.base_tags.get("Owner"), Some("team-data"));
    }

    #[test]
    fn test_autoscaler_identity_name_is_reserved() {
        let spec = with_identities(vec![identity("cluster-autoscaler", &[])]);
        assert!(matches!(
            PlanConfig::from_spec(&spec),
            Err(PlannerError::InvalidConfiguration(ref msg)) if msg.contains("reserved")
        ));

        let mut spec = spec;
        spec.addons = Some(AddonSettings {
            cluster_autoscaler: Some(ChartSettings {
                enabled: Some(false),
                version: None,
                values: None,
            }),
            ..Default::default()
        });
        assert!(PlanConfig::from_spec(&spec).is_ok());
    }

    #[test]
    fn test_identity_collisions_and_blanks_rejected() {
        for identities in [
            vec![identity("app", &[]), identity("app", &[])],
            vec![identity("eks-cluster", &[])],
            vec![WorkloadIdentitySettings {
                namespace: String::new(),
                ..identity("app", &[])
            }],
            vec![WorkloadIdentitySettings {
                service_account: " ".to_string(),
                ..identity("app", &[])
            }],
        ] {
            assert!(matches!(
                PlanConfig::from_spec(&with_identities(identities)),
                Err(PlannerError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_identity_policy_arns_deduplicated_in_order() {
        let spec = with_identities(vec![identity(
            "app",
            &[
                "arn:aws:iam::aws:policy/ReadOnly",
                "arn:aws:iam::123456789012:policy/ReadOnly",
                "arn:aws:iam::aws:policy/ReadOnly",
            ],
        )]);
        let cfg = PlanConfig::from_spec(&spec).unwrap();
        assert_eq!(
            cfg.federation.identities[0].policy_arns,
            vec![
                "arn:aws:iam::aws:policy/ReadOnly".to_string(),
                "arn:aws:iam::123456789012:policy/ReadOnly".to_string(),
            ]
        );
    }
}
