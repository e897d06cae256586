// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Splits the VPC address block into one subnet per availability zone.

use crate::constants::network::{MIN_BLOCK_PREFIX, TARGET_PREFIX};
use crate::error::{PlannerError, Result};
use crate::planner::PlanWarning;
use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SubnetRole {
    Public,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetAssignment {
    pub availability_zone: String,
    pub cidr_block: Ipv4Net,
    pub role: SubnetRole,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetPlan {
    pub vpc_cidr: Ipv4Net,
    pub subnets: Vec<SubnetAssignment>,
}

impl SubnetPlan {
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.subnets.iter().map(|s| s.availability_zone.as_str())
    }

    pub fn contains_zone(&self, zone: &str) -> bool {
        self.zones().any(|z| z == zone)
    }

    pub fn by_zone(&self) -> BTreeMap<&str, &SubnetAssignment> {
        self.subnets
            .iter()
            .map(|s| (s.availability_zone.as_str(), s))
            .collect()
    }
}

#[derive(Debug)]
pub struct Partition {
    pub plan: SubnetPlan,
    pub warning: Option<PlanWarning>,
}

/// Parse an IPv4 CIDR block, rejecting IPv6 and blocks with host bits set.
pub fn parse_ipv4_block(cidr: &str) -> Result<Ipv4Net> {
    let net: IpNet = cidr
        .trim()
        .parse()
        .map_err(|e| PlannerError::InvalidNetworkSpec(format!("invalid CIDR '{}': {}", cidr, e)))?;

    let IpNet::V4(net) = net else {
        return Err(PlannerError::InvalidNetworkSpec(format!(
            "only IPv4 CIDRs are supported, got '{}'",
            cidr
        )));
    };

    if net.trunc() != net {
        return Err(PlannerError::InvalidNetworkSpec(format!(
            "CIDR '{}' has host bits set (did you mean {}?)",
            cidr,
            net.trunc()
        )));
    }

    Ok(net)
}

/// Prefix length the VPC block is split into
fn subnet_prefix(vpc: &Ipv4Net) -> Result<u8> {
    let prefix = vpc.prefix_len();
    if prefix < TARGET_PREFIX {
        Ok(TARGET_PREFIX)
    } else if prefix < MIN_BLOCK_PREFIX {
        Ok(prefix + 1)
    } else if prefix == MIN_BLOCK_PREFIX {
        Ok(prefix)
    } else {
        Err(PlannerError::InvalidNetworkSpec(format!(
            "VPC CIDR {} is smaller than the minimum /{} block",
            vpc, MIN_BLOCK_PREFIX
        )))
    }
}

/// Partition `vpc_cidr` over `zones`, at most `max_azs` subnets when given.
pub fn partition(vpc_cidr: &str, max_azs: Option<u32>, zones: &[String]) -> Result<Partition> {
    let vpc = parse_ipv4_block(vpc_cidr)?;

    if zones.is_empty() {
        return Err(PlannerError::InvalidNetworkSpec(
            "no availability zones available".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    if let Some(zone) = zones.iter().find(|z| !seen.insert(*z)) {
        return Err(PlannerError::InvalidNetworkSpec(format!(
            "availability zone '{}' listed more than once",
            zone
        )));
    }
    if max_azs == Some(0) {
        return Err(PlannerError::InvalidNetworkSpec(
            "max_azs must be > 0 when provided".to_string(),
        ));
    }

    let new_prefix = subnet_prefix(&vpc)?;
    let producible = 1u64 << (new_prefix - vpc.prefix_len());
    let requested = max_azs.map(|m| m as usize).unwrap_or(zones.len());
    let count = requested
        .min(zones.len())
        .min(usize::try_from(producible).unwrap_or(usize::MAX));

    let blocks = vpc
        .subnets(new_prefix)
        .map_err(|e| PlannerError::InvalidNetworkSpec(format!("cannot split {}: {}", vpc, e)))?;

    let subnets: Vec<SubnetAssignment> = zones
        .iter()
        .zip(blocks)
        .take(count)
        .map(|(zone, block)| SubnetAssignment {
            availability_zone: zone.clone(),
            cidr_block: block,
            role: SubnetRole::Public,
        })
        .collect();

    let warning = if subnets.len() < requested {
        let reason = if requested > zones.len() {
            format!("only {} availability zones available", zones.len())
        } else {
            format!("CIDR {} yields only {} distinct /{} subnets", vpc, producible, new_prefix)
        };
        warn!(
            "Degraded topology: requested {} subnets, planning {} ({})",
            requested,
            subnets.len(),
            reason
        );
        Some(PlanWarning::DegradedTopology {
            requested,
            planned: subnets.len(),
            reason,
        })
    } else {
        None
    };

    Ok(Partition {
        plan: SubnetPlan { vpc_cidr: vpc, subnets },
        warning,
    })
}
