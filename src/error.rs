// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Invalid network spec: {0}")]
    InvalidNetworkSpec(String),

    #[error("Instance type {instance_type} is not compatible with architecture {declared_arch}")]
    ArchitectureMismatch {
        instance_type: String,
        declared_arch: String,
    },

    #[error("Unsupported image family '{0}' (use al2 or bottlerocket)")]
    UnsupportedImageFamily(String),

    #[error("Unsupported architecture '{0}' (use x86_64 or arm64)")]
    UnsupportedArchitecture(String),

    #[error("No image found matching {0}")]
    ImageNotFound(String),

    #[error("Capacity invalid for node group {node_group}: min {min} <= desired {desired} <= max {max} must hold")]
    CapacityInvariantViolated {
        node_group: String,
        min: u32,
        desired: u32,
        max: u32,
    },

    #[error("Node group {node_group} references unknown availability zone(s): {zones:?}")]
    UnknownAvailabilityZone {
        node_group: String,
        zones: Vec<String>,
    },

    #[error("Trust policy for {subject} is under-scoped: {reason}")]
    UnderscopedTrustPolicy { subject: String, reason: String },

    #[error("At least one of public_access or private_access must be enabled")]
    EndpointAccessUnset,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Node group {node_group} is inconsistent: {reason}")]
    InconsistentNodeGroup { node_group: String, reason: String },

    #[error("Attribute {0} has not been realized yet")]
    UnresolvedAttribute(String),

    #[error("Image catalog error: {0}")]
    Catalog(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl PlannerError {
    /// Short machine-readable reason, used for status conditions
    pub fn reason(&self) -> &'static str {
        match self {
            PlannerError::InvalidNetworkSpec(_) => "InvalidNetworkSpec",
            PlannerError::ArchitectureMismatch { .. } => "ArchitectureMismatch",
            PlannerError::UnsupportedImageFamily(_) => "UnsupportedImageFamily",
            PlannerError::UnsupportedArchitecture(_) => "UnsupportedArchitecture",
            PlannerError::ImageNotFound(_) => "ImageNotFound",
            PlannerError::CapacityInvariantViolated { .. } => "CapacityInvariantViolated",
            PlannerError::UnknownAvailabilityZone { .. } => "UnknownAvailabilityZone",
            PlannerError::UnderscopedTrustPolicy { .. } => "UnderscopedTrustPolicy",
            PlannerError::EndpointAccessUnset => "EndpointAccessUnset",
            PlannerError::InvalidConfiguration(_) => "InvalidConfiguration",
            PlannerError::InconsistentNodeGroup { .. } => "InconsistentNodeGroup",
            PlannerError::UnresolvedAttribute(_) => "UnresolvedAttribute",
            PlannerError::Catalog(_) => "CatalogError",
            PlannerError::Serialization(_) => "SerializationError",
            PlannerError::Kube(_) => "KubeError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
