// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::errors::AppResult;
use crate::app::types::{AllowList, ContainerSpec, SimulationRequest};

/// Derives the container definition for a request.
/// Must reject unapproved dependencies before anything is persisted.
pub trait ContainerSpecPort: Send + Sync {
    fn derive(&self, request: &SimulationRequest, allow_list: &AllowList)
    -> AppResult<ContainerSpec>;
}
