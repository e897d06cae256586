// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Values that only exist once the realization engine has created an object.

use crate::error::{PlannerError, Result};
use crate::types::blueprint::RealizedCluster;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute names understood by [`Deferred::resolve`]
pub mod attr {
    pub const ID: &str = "id";
    pub const ARN: &str = "arn";
    pub const NAME: &str = "name";
    pub const KEY_ID: &str = "keyId";
    pub const ENDPOINT: &str = "endpoint";
    pub const CERTIFICATE_AUTHORITY: &str = "certificateAuthority.data";
    pub const OIDC_ISSUER: &str = "identity.oidc.issuer";
}

/// Reference to an attribute of another plan node
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRef {
    pub node: String,
    pub attribute: String,
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

/// A value that is either known at plan time or pending realization of
/// another node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "state", content = "value")]
pub enum Deferred {
    Known(String),
    Pending(AttributeRef),
}

impl Deferred {
    pub fn known(value: impl Into<String>) -> Self {
        Deferred::Known(value.into())
    }

    pub fn pending(node: impl Into<String>, attribute: impl Into<String>) -> Self {
        Deferred::Pending(AttributeRef {
            node: node.into(),
            attribute: attribute.into(),
        })
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Deferred::Known(_))
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Deferred::Known(v) => Some(v),
            Deferred::Pending(_) => None,
        }
    }

    /// The known value, or `UnresolvedAttribute` while still pending
    pub fn require(&self) -> Result<&str> {
        match self {
            Deferred::Known(v) => Ok(v),
            Deferred::Pending(r) => Err(PlannerError::UnresolvedAttribute(r.to_string())),
        }
    }

    /// Replace a pending reference with the realized value when one exists
    pub fn resolve(&self, realized: &RealizedCluster) -> Deferred {
        match self {
            Deferred::Known(_) => self.clone(),
            Deferred::Pending(r) => realized
                .lookup(&r.node, &r.attribute)
                .map(Deferred::known)
                .unwrap_or_else(|| self.clone()),
        }
    }
}
