// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::JobState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub local: PathBuf,
    pub remote: String,
}

/// Everything needed to hand one batch script to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub job_name: String,
    pub script: String,
    pub uploads: Vec<FileUpload>,
    /// Created (with parents) before anything is uploaded.
    pub remote_dirs: Vec<String>,
}

#[async_trait]
pub trait SchedulerPort: Send + Sync {
    /// Returns the scheduler-assigned job id.
    async fn submit_job(&self, request: &SubmitRequest) -> AppResult<i64>;

    /// At most one state per id; ids unknown to both the live queue and accounting are absent.
    async fn get_job_status(&self, ids: &[i64]) -> AppResult<Vec<JobState>>;
}
