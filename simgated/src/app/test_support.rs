// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Fakes shared by the orchestration tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::db::{GatewayStore, SqliteStoreAdapter};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, RemoteExecPort, SchedulerPort, SubmitRequest};
use crate::app::services::layout::RemoteLayout;
use crate::app::settings::{MonitorSettings, SchedulerSettings};
use crate::app::types::{JobState, SshConfig};

pub async fn memory_stores() -> Arc<SqliteStoreAdapter> {
    Arc::new(SqliteStoreAdapter::new(
        GatewayStore::open_memory().await.expect("open memory store"),
    ))
}

pub fn sample_ssh_config() -> SshConfig {
    SshConfig {
        session_name: None,
        host: "hpc.example.org".into(),
        addr: SocketAddr::from(([127, 0, 0, 1], 22)),
        username: "sim".into(),
        identity_path: None,
        known_hosts_path: None,
        keepalive_secs: 30,
    }
}

pub fn sample_scheduler_settings() -> SchedulerSettings {
    SchedulerSettings {
        sim_base_path: "/hpc/sims".into(),
        image_base_path: "/hpc/images".into(),
        sbatch_base_path: "/hpc/sbatch".into(),
        log_base_path: "/hpc/logs".into(),
        ..SchedulerSettings::default()
    }
}

pub fn sample_layout() -> RemoteLayout {
    RemoteLayout::new(&sample_scheduler_settings())
}

pub fn fast_monitor_settings() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_millis(10),
        wait_timeout: Duration::from_millis(50),
        max_wait_iterations: 30,
        ..MonitorSettings::default()
    }
}

pub fn job_state(job_id: i64, state: &str) -> JobState {
    JobState {
        job_id,
        name: format!("job-{job_id}"),
        account: "lab".into(),
        user_name: "sim".into(),
        job_state: state.into(),
        start_time: None,
        end_time: None,
        exit_code: None,
    }
}

/// Scheduler double: hands out ids from 1000 and reports whatever state was set.
pub struct ScriptedScheduler {
    next_id: AtomicI64,
    states: Mutex<HashMap<i64, JobState>>,
    failing_ids: Mutex<HashSet<i64>>,
    fail_batches: AtomicBool,
    fail_submit: AtomicBool,
    submissions: Mutex<Vec<SubmitRequest>>,
    status_calls: Mutex<Vec<Vec<i64>>>,
}

impl Default for ScriptedScheduler {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            states: Mutex::default(),
            failing_ids: Mutex::default(),
            fail_batches: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            submissions: Mutex::default(),
            status_calls: Mutex::default(),
        }
    }
}

impl ScriptedScheduler {
    pub fn set_state(&self, state: JobState) {
        self.states.lock().unwrap().insert(state.job_id, state);
    }

    pub fn fail_id(&self, id: i64) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submit(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<Vec<i64>> {
        self.status_calls.lock().unwrap().clone()
    }
}

fn transport_error() -> AppError {
    AppError::with_message(
        AppErrorKind::Unavailable,
        codes::CONNECTION_FAILURE,
        "connection reset",
    )
}

#[async_trait]
impl SchedulerPort for ScriptedScheduler {
    async fn submit_job(&self, request: &SubmitRequest) -> AppResult<i64> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        self.submissions.lock().unwrap().push(request.clone());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_job_status(&self, ids: &[i64]) -> AppResult<Vec<JobState>> {
        self.status_calls.lock().unwrap().push(ids.to_vec());
        if ids.len() > 1 && self.fail_batches.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        let failing = self.failing_ids.lock().unwrap();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(transport_error());
        }
        let states = self.states.lock().unwrap();
        Ok(ids.iter().filter_map(|id| states.get(id).cloned()).collect())
    }
}

/// Transport double that serves downloads from a fixed payload.
#[derive(Default)]
pub struct RecordingRemoteExec {
    pub download_payload: Vec<u8>,
    pub downloads: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteExecPort for RecordingRemoteExec {
    async fn exec_capture(&self, _config: &SshConfig, command: &str) -> AppResult<ExecCapture> {
        panic!("unexpected command: {command}");
    }

    async fn upload(&self, _config: &SshConfig, _local: &Path, remote: &str) -> AppResult<()> {
        panic!("unexpected upload to {remote}");
    }

    async fn download(&self, _config: &SshConfig, remote: &str, local: &Path) -> AppResult<()> {
        self.downloads.lock().unwrap().push(remote.to_string());
        std::fs::write(local, &self.download_payload).unwrap();
        Ok(())
    }
}
