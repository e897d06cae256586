// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Boot image selection per node group.

use crate::constants::images::{AL2_OWNER, BOTTLEROCKET_OWNER};
use crate::error::{PlannerError, Result};
use crate::planner::arch::Architecture;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageFamily {
    /// EKS optimized Amazon Linux 2
    Al2,
    Bottlerocket,
}

impl ImageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFamily::Al2 => "al2",
            ImageFamily::Bottlerocket => "bottlerocket",
        }
    }

    /// Publisher account owning the family's images
    pub fn owner(&self) -> &'static str {
        match self {
            ImageFamily::Al2 => AL2_OWNER,
            ImageFamily::Bottlerocket => BOTTLEROCKET_OWNER,
        }
    }

    /// Image name prefix for a given Kubernetes version
    pub fn name_prefix(&self, cluster_version: &str) -> String {
        match self {
            ImageFamily::Al2 => format!("amazon-eks-node-{}-", cluster_version),
            ImageFamily::Bottlerocket => format!("bottlerocket-aws-k8s-{}-", cluster_version),
        }
    }
}

impl fmt::Display for ImageFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFamily {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "al2" => Ok(ImageFamily::Al2),
            "bottlerocket" => Ok(ImageFamily::Bottlerocket),
            other => Err(PlannerError::UnsupportedImageFamily(other.to_string())),
        }
    }
}

/// One entry of a publisher catalog
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub architecture: String,
    pub creation_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFilter {
    pub owner: String,
    pub name_prefix: String,
    pub architecture: Architecture,
}

impl ImageFilter {
    pub fn matches(&self, image: &ImageRecord) -> bool {
        image.owner == self.owner
            && image.name.starts_with(&self.name_prefix)
            && image.architecture == self.architecture.as_str()
    }
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "owner={} name={}* architecture={}",
            self.owner, self.name_prefix, self.architecture
        )
    }
}

/// Source of published images
pub trait ImageCatalog {
    fn find_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>>;
}

/// Catalog backed by a fixed snapshot of image records
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    images: Vec<ImageRecord>,
}

impl StaticCatalog {
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self { images }
    }

    /// Parse a YAML list of image records
    pub fn from_yaml(data: &str) -> Result<Self> {
        let images: Vec<ImageRecord> = serde_yaml::from_str(data)
            .map_err(|e| PlannerError::Catalog(format!("failed to parse image catalog: {}", e)))?;
        Ok(Self::new(images))
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageCatalog for StaticCatalog {
    fn find_images(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>> {
        Ok(self
            .images
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ImageSource {
    /// Supplied by the caller, used verbatim
    Explicit,
    /// Most recent catalog match
    Lookup,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedImage {
    pub id: String,
    pub source: ImageSource,
}

/// Resolve the boot image for a node group.
///
/// An explicit id always wins and no lookup happens. Otherwise the most
/// recent image matching family, architecture and cluster version is
/// selected; ties on creation date are broken by image id.
pub fn resolve_image(
    catalog: &dyn ImageCatalog,
    explicit_id: Option<&str>,
    family: ImageFamily,
    arch: Architecture,
    cluster_version: &str,
) -> Result<ResolvedImage> {
    if let Some(id) = explicit_id.filter(|id| !id.is_empty()) {
        debug!("Using explicit image {}", id);
        return Ok(ResolvedImage {
            id: id.to_string(),
            source: ImageSource::Explicit,
        });
    }

    let filter = ImageFilter {
        owner: family.owner().to_string(),
        name_prefix: family.name_prefix(cluster_version),
        architecture: arch,
    };

    let newest = catalog
        .find_images(&filter)?
        .into_iter()
        .filter(|i| filter.matches(i) && !i.id.is_empty())
        .max_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        })
        .ok_or_else(|| PlannerError::ImageNotFound(filter.to_string()))?;

    debug!("Resolved {} to image {} ({})", filter, newest.id, newest.name);

    Ok(ResolvedImage {
        id: newest.id,
        source: ImageSource::Lookup,
    })
}

/// User data joining an AL2 node to the cluster.
///
/// Only catalog images get a generated bootstrap; explicit images are
/// expected to carry their own, and Bottlerocket is configured through its
/// settings API instead of a shell script.
pub fn bootstrap_user_data(
    image: &ResolvedImage,
    family: ImageFamily,
    cluster_name: &str,
) -> Option<String> {
    match (image.source, family) {
        (ImageSource::Lookup, ImageFamily::Al2) => {
            let script = format!("#!/bin/bash\n/etc/eks/bootstrap.sh {}\n", cluster_name);
            Some(base64::engine::general_purpose::STANDARD.encode(script))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, owner: &str, arch: &str, date: &str) -> ImageRecord {
        ImageRecord {
            id: id.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            architecture: arch.to_string(),
            creation_date: date.parse().unwrap(),
        }
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(vec![
            record("ami-old", "amazon-eks-node-1.30-v20240101", AL2_OWNER, "x86_64", "2024-01-01T00:00:00Z"),
            record("ami-new", "amazon-eks-node-1.30-v20240601", AL2_OWNER, "x86_64", "2024-06-01T00:00:00Z"),
            record("ami-arm", "amazon-eks-arm64-node-1.30-v20240601", AL2_OWNER, "arm64", "2024-06-01T00:00:00Z"),
            record("ami-arm2", "amazon-eks-node-1.30-v20240501", AL2_OWNER, "arm64", "2024-05-01T00:00:00Z"),
            record("ami-129", "amazon-eks-node-1.29-v20240701", AL2_OWNER, "x86_64", "2024-07-01T00:00:00Z"),
            record("ami-fake", "amazon-eks-node-1.30-v20250101", "111111111111", "x86_64", "2025-01-01T00:00:00Z"),
            record("ami-br", "bottlerocket-aws-k8s-1.30-aarch64-v1.20.0", BOTTLEROCKET_OWNER, "arm64", "2024-06-02T00:00:00Z"),
        ])
    }

    #[test]
    fn test_explicit_image_skips_lookup() {
        let empty = StaticCatalog::default();
        let img = resolve_image(&empty, Some("ami-custom"), ImageFamily::Al2, Architecture::X86_64, "1.30").unwrap();
        assert_eq!(img.id, "ami-custom");
        assert_eq!(img.source, ImageSource::Explicit);
        assert!(bootstrap_user_data(&img, ImageFamily::Al2, "demo").is_none());
    }

    #[test]
    fn test_most_recent_matching_image_wins() {
        let img = resolve_image(&catalog(), None, ImageFamily::Al2, Architecture::X86_64, "1.30").unwrap();
        assert_eq!(img.id, "ami-new");
        assert_eq!(img.source, ImageSource::Lookup);
    }

    #[test]
    fn test_architecture_filter_applies() {
        let img = resolve_image(&catalog(), None, ImageFamily::Al2, Architecture::Arm64, "1.30").unwrap();
        assert_eq!(img.id, "ami-arm2");
    }

    #[test]
    fn test_bottlerocket_uses_its_own_namespace() {
        let img = resolve_image(&catalog(), None, ImageFamily::Bottlerocket, Architecture::Arm64, "1.30").unwrap();
        assert_eq!(img.id, "ami-br");
        assert!(bootstrap_user_data(&img, ImageFamily::Bottlerocket, "demo").is_none());
    }

    #[test]
    fn test_no_match_is_fatal() {
        let err = resolve_image(&catalog(), None, ImageFamily::Bottlerocket, Architecture::X86_64, "1.30").unwrap_err();
        assert!(matches!(err, PlannerError::ImageNotFound(_)));
    }

    #[test]
    fn test_resolution_is_deterministic_on_ties() {
        let c = StaticCatalog::new(vec![
            record("ami-b", "amazon-eks-node-1.30-b", AL2_OWNER, "x86_64", "2024-06-01T00:00:00Z"),
            record("ami-a", "amazon-eks-node-1.30-a", AL2_OWNER, "x86_64", "2024-06-01T00:00:00Z"),
        ]);
        let first = resolve_image(&c, None, ImageFamily::Al2, Architecture::X86_64, "1.30").unwrap();
        let second = resolve_image(&c, None, ImageFamily::Al2, Architecture::X86_64, "1.30").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, "ami-b");
    }

    #[test]
    fn test_lookup_al2_gets_bootstrap() {
        let img = resolve_image(&catalog(), None, ImageFamily::Al2, Architecture::X86_64, "1.30").unwrap();
        let data = bootstrap_user_data(&img, ImageFamily::Al2, "demo").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "#!/bin/bash\n/etc/eks/bootstrap.sh demo\n"
        );
    }

    #[test]
    fn test_parse_family() {
        assert_eq!("bottlerocket".parse::<ImageFamily>().unwrap(), ImageFamily::Bottlerocket);
        assert!(matches!(
            "ubuntu".parse::<ImageFamily>(),
            Err(PlannerError::UnsupportedImageFamily(_))
        ));
    }

    #[test]
    fn test_catalog_from_yaml() {
        let yaml = r#"
- id: ami-0123
  name: amazon-eks-node-1.30-v20240601
  owner: "602401143452"
  architecture: x86_64
  creationDate: 2024-06-01T00:00:00Z
"#;
        let c = StaticCatalog::from_yaml(yaml).unwrap();
        assert_eq!(c.len(), 1);
        assert!(StaticCatalog::from_yaml("not: [a list").is_err());
    }
}
