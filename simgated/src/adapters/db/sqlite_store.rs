// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::db::{GatewayStore, StoreError};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    JobStorePort, SimulationStorePort, SimulatorStorePort, WorkerEventStorePort,
};
use crate::app::types::{
    JobKind, JobRecord, JobStatus, JobTransition, NewJob, NewSimulation, NewSimulator,
    SimulationRecord, SimulatorRecord, WorkerEvent, WorkerEventMessage,
};

#[derive(Clone)]
pub struct SqliteStoreAdapter {
    store: Arc<GatewayStore>,
}

impl SqliteStoreAdapter {
    pub fn new(store: GatewayStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// Keeps sqlx and row decoding details out of the app core.
fn map_store_error(err: StoreError) -> AppError {
    match &err {
        StoreError::EmptyCorrelationId
        | StoreError::EmptyDefinitionHash
        | StoreError::EmptyExperimentId => AppError::with_message(
            AppErrorKind::InvalidArgument,
            codes::INVALID_ARGUMENT,
            err.to_string(),
        ),
        StoreError::Sqlx(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            AppError::with_message(AppErrorKind::Conflict, codes::CONFLICT, db.message().to_string())
        }
        StoreError::Sqlx(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
            AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                db.message().to_string(),
            )
        }
        StoreError::Sqlx(_) | StoreError::Serde(_) | StoreError::Corrupt(_) => {
            AppError::with_message(AppErrorKind::Internal, codes::INTERNAL_ERROR, err.to_string())
        }
    }
}

#[async_trait]
impl JobStorePort for SqliteStoreAdapter {
    async fn insert_job(&self, job: &NewJob) -> AppResult<JobRecord> {
        self.store.insert_job(job).await.map_err(map_store_error)
    }

    async fn get_job(&self, id: i64) -> AppResult<Option<JobRecord>> {
        self.store.get_job(id).await.map_err(map_store_error)
    }

    async fn get_job_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> AppResult<Option<JobRecord>> {
        self.store
            .get_job_by_correlation_id(correlation_id)
            .await
            .map_err(map_store_error)
    }

    async fn get_job_by_external_id(&self, external_job_id: i64) -> AppResult<Option<JobRecord>> {
        self.store
            .get_job_by_external_id(external_job_id)
            .await
            .map_err(map_store_error)
    }

    async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<JobRecord>> {
        self.store
            .list_jobs_by_status(statuses)
            .await
            .map_err(map_store_error)
    }

    async fn latest_job_for_kind(&self, kind: JobKind) -> AppResult<Option<JobRecord>> {
        self.store
            .latest_job_for_kind(kind)
            .await
            .map_err(map_store_error)
    }

    async fn apply_transition(&self, id: i64, transition: &JobTransition) -> AppResult<bool> {
        self.store
            .apply_transition(id, transition)
            .await
            .map_err(map_store_error)
    }

    async fn record_scheduler_state(&self, id: i64, scheduler_state: &str) -> AppResult<()> {
        self.store
            .update_job_scheduler_state(id, scheduler_state)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl SimulatorStorePort for SqliteStoreAdapter {
    async fn insert_simulator(&self, simulator: &NewSimulator) -> AppResult<SimulatorRecord> {
        self.store
            .insert_simulator(simulator)
            .await
            .map_err(map_store_error)
    }

    async fn get_simulator(&self, id: i64) -> AppResult<Option<SimulatorRecord>> {
        self.store.get_simulator(id).await.map_err(map_store_error)
    }

    async fn get_simulator_by_hash(
        &self,
        definition_hash: &str,
    ) -> AppResult<Option<SimulatorRecord>> {
        self.store
            .get_simulator_by_hash(definition_hash)
            .await
            .map_err(map_store_error)
    }

    async fn list_simulators(&self) -> AppResult<Vec<SimulatorRecord>> {
        self.store.list_simulators().await.map_err(map_store_error)
    }
}

#[async_trait]
impl SimulationStorePort for SqliteStoreAdapter {
    async fn insert_simulation(&self, simulation: &NewSimulation) -> AppResult<SimulationRecord> {
        self.store
            .insert_simulation(simulation)
            .await
            .map_err(map_store_error)
    }

    async fn get_simulation(&self, id: i64) -> AppResult<Option<SimulationRecord>> {
        self.store.get_simulation(id).await.map_err(map_store_error)
    }

    async fn set_simulation_external_job_id(
        &self,
        id: i64,
        external_job_id: i64,
    ) -> AppResult<bool> {
        self.store
            .set_simulation_external_job_id(id, external_job_id)
            .await
            .map_err(map_store_error)
    }
}

#[async_trait]
impl WorkerEventStorePort for SqliteStoreAdapter {
    async fn insert_worker_event(
        &self,
        job_id: i64,
        event: &WorkerEventMessage,
    ) -> AppResult<bool> {
        self.store
            .insert_worker_event(job_id, event)
            .await
            .map_err(map_store_error)
    }

    async fn list_worker_events(
        &self,
        job_id: i64,
        after_sequence: i64,
    ) -> AppResult<Vec<WorkerEvent>> {
        self.store
            .list_worker_events(job_id, after_sequence)
            .await
            .map_err(map_store_error)
    }
}
