// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{NewSimulation, SimulationRecord};

#[async_trait]
pub trait SimulationStorePort: Send + Sync {
    async fn insert_simulation(&self, simulation: &NewSimulation) -> AppResult<SimulationRecord>;
    async fn get_simulation(&self, id: i64) -> AppResult<Option<SimulationRecord>>;
    /// Sets the back-reference once; returns false if it was already set.
    async fn set_simulation_external_job_id(&self, id: i64, external_job_id: i64)
    -> AppResult<bool>;
}
