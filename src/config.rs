// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the image catalog ConfigMap
    pub catalog_namespace: String,
    /// Name of the image catalog ConfigMap
    pub catalog_configmap: String,
    /// When false, plans are computed and reported in status only
    pub publish_plan: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let catalog_namespace = env::var("CATALOG_NAMESPACE")
            .context("CATALOG_NAMESPACE environment variable not set")?;
        let catalog_configmap =
            env::var("CATALOG_CONFIGMAP").unwrap_or_else(|_| "image-catalog".to_string());
        let publish_plan = parse_flag(env::var("PUBLISH_PLAN").ok().as_deref(), true);

        Ok(Config {
            catalog_namespace,
            catalog_configmap,
            publish_plan,
        })
    }
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
