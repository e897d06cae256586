// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used for server-side apply
pub const OPERATOR_NAME: &str = "skyforge";

/// Labels put on objects published by the operator
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    pub const BLUEPRINT: &str = "skyforge.io/blueprint";
}

/// Subnet partitioning bounds
pub mod network {
    /// Preferred subnet prefix length
    pub const TARGET_PREFIX: u8 = 24;
    /// Smallest block the partitioner will hand out
    pub const MIN_BLOCK_PREFIX: u8 = 28;
    pub const ANY_IPV4: &str = "0.0.0.0/0";
}

/// Well-known ports used by the security topology
pub mod ports {
    pub const API_SERVER: u16 = 443;
    pub const KUBELET: u16 = 10250;
    pub const NODE_PORT_START: u16 = 30000;
    pub const NODE_PORT_END: u16 = 32767;
    pub const EPHEMERAL_START: u16 = 1025;
    pub const EPHEMERAL_END: u16 = 65535;
    pub const NFS: u16 = 2049;
}

/// Image publisher namespaces
pub mod images {
    /// EKS optimized Amazon Linux 2 publisher account
    pub const AL2_OWNER: &str = "602401143452";
    /// Bottlerocket publisher account
    pub const BOTTLEROCKET_OWNER: &str = "679593333241";
}

/// Tag keys with structural meaning
pub mod tags {
    pub const NAME: &str = "Name";
    pub const AUTOSCALER_ENABLED: &str = "k8s.io/cluster-autoscaler/enabled";
    pub const AUTOSCALER_CLUSTER_PREFIX: &str = "k8s.io/cluster-autoscaler/";
    pub const CLUSTER_PREFIX: &str = "kubernetes.io/cluster/";
    pub const ROLE_ELB: &str = "kubernetes.io/role/elb";
    pub const ROLE_INTERNAL_ELB: &str = "kubernetes.io/role/internal-elb";
}

/// Workload identity federation
pub mod federation {
    pub const AUDIENCE: &str = "sts.amazonaws.com";
    pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "sts:AssumeRoleWithWebIdentity";
    pub const POLICY_VERSION: &str = "2012-10-17";
    pub const ROLE_ARN_ANNOTATION: &str = "eks.amazonaws.com/role-arn";
    pub const AUTOSCALER_NAMESPACE: &str = "kube-system";
    pub const AUTOSCALER_SERVICE_ACCOUNT: &str = "cluster-autoscaler";
}

/// Access descriptor naming
pub mod access {
    pub const CONTEXT: &str = "aws";
    pub const USER: &str = "aws";
    pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1";
    pub const EXEC_COMMAND: &str = "aws";
}

/// CRD polling configuration
pub mod crd {
    pub const GROUP: &str = "skyforge.io";
    pub const VERSION: &str = "v1alpha1";
    pub const KIND: &str = "ClusterBlueprint";
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Keys and suffixes of published objects
pub mod publish {
    pub const CATALOG_KEY: &str = "images.yaml";
    pub const PLAN_KEY: &str = "plan.json";
    pub const ACCESS_KEY: &str = "value";
    pub const PLAN_SUFFIX: &str = "-plan";
    pub const ACCESS_SUFFIX: &str = "-kubeconfig";
    pub const REQUEUE_SECS: u64 = 60;
}
