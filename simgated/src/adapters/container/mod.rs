// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeSet;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::ContainerSpecPort;
use crate::app::services::scripts::render_definition;
use crate::app::types::{AllowList, ContainerSpec, SimulationRequest};

pub const DEFAULT_BASE_IMAGE: &str = "python:3.11-slim";

/// Renders singularity definitions for requests whose dependencies are all allow-listed.
#[derive(Debug, Clone)]
pub struct DefinitionGenerator {
    base_image: String,
}

impl Default for DefinitionGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_IMAGE)
    }
}

impl DefinitionGenerator {
    pub fn new(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
        }
    }
}

impl ContainerSpecPort for DefinitionGenerator {
    fn derive(
        &self,
        request: &SimulationRequest,
        allow_list: &AllowList,
    ) -> AppResult<ContainerSpec> {
        let mut dependencies = BTreeSet::new();
        for dependency in &request.dependencies {
            let dependency = dependency.trim();
            if dependency.is_empty() {
                continue;
            }
            if !allow_list.contains(dependency) {
                return Err(AppError::with_message(
                    AppErrorKind::InvalidArgument,
                    codes::DEPENDENCY_NOT_ALLOWED,
                    format!("dependency '{dependency}' is not on the allow list"),
                ));
            }
            dependencies.insert(dependency.to_string());
        }

        // Sorted and de-duplicated, so equal dependency sets hash to the same simulator.
        let definition =
            render_definition(&self.base_image, dependencies.iter().map(String::as_str))?;
        tracing::debug!(
            base_image = %self.base_image,
            dependencies = dependencies.len(),
            "derived container definition"
        );
        Ok(ContainerSpec {
            definition,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(dependencies: &[&str]) -> SimulationRequest {
        SimulationRequest {
            archive: PathBuf::from("/tmp/model.omex"),
            dependencies: dependencies.iter().map(|dep| dep.to_string()).collect(),
        }
    }

    fn allow() -> AllowList {
        AllowList::new(["tellurium==2.2.10", "numpy==1.26.4", "copasi-basico"])
    }

    #[test]
    fn order_and_duplicates_do_not_change_definition() {
        let generator = DefinitionGenerator::default();
        let a = generator
            .derive(&request(&["tellurium==2.2.10", "numpy==1.26.4"]), &allow())
            .unwrap();
        let b = generator
            .derive(
                &request(&["numpy==1.26.4", " tellurium==2.2.10", "numpy==1.26.4"]),
                &allow(),
            )
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dependencies.len(), 2);
        assert!(a.definition.contains("From: python:3.11-slim\n"));
        assert!(a.definition.contains("'numpy==1.26.4' 'tellurium==2.2.10'"));
    }

    #[test]
    fn unlisted_dependency_is_named_in_error() {
        let err = DefinitionGenerator::default()
            .derive(&request(&["numpy==1.26.4", "evil-package"]), &allow())
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
        assert_eq!(err.code(), codes::DEPENDENCY_NOT_ALLOWED);
        assert!(err.message().contains("evil-package"));
    }

    #[test]
    fn version_must_match_allow_list_entry() {
        let err = DefinitionGenerator::default()
            .derive(&request(&["numpy==2.0.0"]), &allow())
            .unwrap_err();
        assert_eq!(err.code(), codes::DEPENDENCY_NOT_ALLOWED);
    }

    #[test]
    fn base_image_is_configurable() {
        let spec = DefinitionGenerator::new("ghcr.io/lab/runtime:1.2")
            .derive(&request(&[]), &allow())
            .unwrap();
        assert!(spec.definition.contains("From: ghcr.io/lab/runtime:1.2\n"));
        assert!(spec.dependencies.is_empty());
    }
}
