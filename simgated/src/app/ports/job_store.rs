// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{JobKind, JobRecord, JobStatus, JobTransition, NewJob};

#[async_trait]
pub trait JobStorePort: Send + Sync {
    async fn insert_job(&self, job: &NewJob) -> AppResult<JobRecord>;
    async fn get_job(&self, id: i64) -> AppResult<Option<JobRecord>>;
    async fn get_job_by_correlation_id(&self, correlation_id: &str)
    -> AppResult<Option<JobRecord>>;
    async fn get_job_by_external_id(&self, external_job_id: i64) -> AppResult<Option<JobRecord>>;
    async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> AppResult<Vec<JobRecord>>;
    /// Most recent job owned by `kind`.
    async fn latest_job_for_kind(&self, kind: JobKind) -> AppResult<Option<JobRecord>>;
    /// Applies the transition only while the job is still in `transition.from`.
    async fn apply_transition(&self, id: i64, transition: &JobTransition) -> AppResult<bool>;
    async fn record_scheduler_state(&self, id: i64, scheduler_state: &str) -> AppResult<()>;
}
