// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::{WorkerEvent, WorkerEventMessage};

#[async_trait]
pub trait WorkerEventStorePort: Send + Sync {
    /// Returns false when the job already has an event with this sequence number.
    async fn insert_worker_event(&self, job_id: i64, event: &WorkerEventMessage)
    -> AppResult<bool>;
    /// Events with `sequence_number > after_sequence`, ascending.
    async fn list_worker_events(&self, job_id: i64, after_sequence: i64)
    -> AppResult<Vec<WorkerEvent>>;
}
