// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CPU architecture and instance family compatibility.

use crate::error::{PlannerError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Instance families built on Graviton / ARM processors
const ARM_FAMILIES: &[&str] = &[
    "a1", "c6g", "c6gd", "c6gn", "c7g", "c7gd", "c7gn", "c8g", "g5g", "hpc7g", "i4g", "im4gn",
    "is4gen", "m6g", "m6gd", "m7g", "m7gd", "m8g", "r6g", "r6gd", "r7g", "r7gd", "r8g", "t4g",
    "x2gd", "x2g",
];

/// x86 families that would otherwise trip the trailing-`g` heuristic
const X86_LOOKALIKES: &[&str] = &["g5", "g4dn", "g4ad", "g6", "g6e"];

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Architecture {
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86_64" => Ok(Architecture::X86_64),
            "arm64" => Ok(Architecture::Arm64),
            other => Err(PlannerError::UnsupportedArchitecture(other.to_string())),
        }
    }
}

/// The family prefix of an instance type, e.g. `c6g` for `c6g.large`
pub fn instance_family(instance_type: &str) -> Result<&str> {
    match instance_type.split_once('.') {
        Some((family, size)) if !family.is_empty() && !size.is_empty() => Ok(family),
        _ => Err(PlannerError::InvalidConfiguration(format!(
            "malformed instance type '{}'",
            instance_type
        ))),
    }
}

pub fn is_arm_family(family: &str) -> bool {
    ARM_FAMILIES.contains(&family) || (family.ends_with('g') && !X86_LOOKALIKES.contains(&family))
}

/// Check that `instance_type` can run images built for `arch`.
pub fn validate_instance_arch(instance_type: &str, arch: Architecture) -> Result<()> {
    let is_arm = is_arm_family(instance_family(instance_type)?);

    let compatible = match arch {
        Architecture::Arm64 => is_arm,
        Architecture::X86_64 => !is_arm,
    };

    if compatible {
        Ok(())
    } else {
        Err(PlannerError::ArchitectureMismatch {
            instance_type: instance_type.to_string(),
            declared_arch: arch.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_instance_declared_x86_is_rejected() {
        let err = validate_instance_arch("c6g.large", Architecture::X86_64).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::ArchitectureMismatch { ref instance_type, ref declared_arch }
                if instance_type == "c6g.large" && declared_arch == "x86_64"
        ));
    }

    #[test]
    fn test_x86_instance_declared_arm_is_rejected() {
        assert!(matches!(
            validate_instance_arch("m5.xlarge", Architecture::Arm64),
            Err(PlannerError::ArchitectureMismatch { .. })
        ));
    }

    #[test]
    fn test_matching_pairs_pass() {
        assert!(validate_instance_arch("m5.xlarge", Architecture::X86_64).is_ok());
        assert!(validate_instance_arch("t4g.medium", Architecture::Arm64).is_ok());
        assert!(validate_instance_arch("m6gd.large", Architecture::Arm64).is_ok());
        assert!(validate_instance_arch("g4dn.xlarge", Architecture::X86_64).is_ok());
    }

    #[test]
    fn test_trailing_g_heuristic_catches_new_families() {
        assert!(is_arm_family("c9g"));
        assert!(!is_arm_family("g5"));
        assert!(!is_arm_family("m5"));
    }

    #[test]
    fn test_verdict_is_repeatable() {
        for (it, arch) in [
            ("c6g.large", Architecture::X86_64),
            ("c6g.large", Architecture::Arm64),
            ("m5.large", Architecture::X86_64),
        ] {
            let first = validate_instance_arch(it, arch).is_ok();
            let second = validate_instance_arch(it, arch).is_ok();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_malformed_instance_type() {
        for bad in ["", "m5", ".large", "m5."] {
            assert!(matches!(
                validate_instance_arch(bad, Architecture::X86_64),
                Err(PlannerError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_parse_architecture() {
        assert_eq!("arm64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert!(matches!(
            "aarch64".parse::<Architecture>(),
            Err(PlannerError::UnsupportedArchitecture(ref a)) if a == "aarch64"
        ));
    }
}
