// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery, catalog loading and publishing plans.

pub mod catalog;
pub mod crd;
pub mod publish;

pub use catalog::load_catalog;
pub use crd::wait_for_blueprint_crd;
