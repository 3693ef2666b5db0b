// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{NewSimulator, SimulatorRecord};

#[async_trait]
pub trait SimulatorStorePort: Send + Sync {
    async fn insert_simulator(&self, simulator: &NewSimulator) -> AppResult<SimulatorRecord>;
    async fn get_simulator(&self, id: i64) -> AppResult<Option<SimulatorRecord>>;
    async fn get_simulator_by_hash(&self, definition_hash: &str)
    -> AppResult<Option<SimulatorRecord>>;
    async fn list_simulators(&self) -> AppResult<Vec<SimulatorRecord>>;
}
