// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::services::slurm;

/// What a tracked batch job is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Simulation,
    BuildContainer,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Simulation => "simulation",
            JobType::BuildContainer => "build_container",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulation" => Ok(JobType::Simulation),
            "build_container" => Ok(JobType::BuildContainer),
            other => Err(format!("unknown job type '{other}'")),
        }
    }
}

/// Lifecycle status persisted for every job.
///
/// Ordered WAITING < QUEUED < RUNNING < {COMPLETED, FAILED}; see [`JobStatus::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub const NON_TERMINAL: [JobStatus; 3] =
        [JobStatus::Waiting, JobStatus::Queued, JobStatus::Running];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "WAITING",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Waiting => 0,
            JobStatus::Queued => 1,
            JobStatus::Running => 2,
            JobStatus::Completed | JobStatus::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Ok(JobStatus::Waiting),
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Owner of a job: a simulation run or a container build for a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ref_id", rename_all = "snake_case")]
pub enum JobKind {
    Simulation(i64),
    Build(i64),
}

impl JobKind {
    pub fn job_type(self) -> JobType {
        match self {
            JobKind::Simulation(_) => JobType::Simulation,
            JobKind::Build(_) => JobType::BuildContainer,
        }
    }

    pub fn simulation_id(self) -> Option<i64> {
        match self {
            JobKind::Simulation(id) => Some(id),
            JobKind::Build(_) => None,
        }
    }

    pub fn simulator_id(self) -> Option<i64> {
        match self {
            JobKind::Build(id) => Some(id),
            JobKind::Simulation(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub kind: JobKind,
    pub correlation_id: String,
    pub external_job_id: Option<i64>,
    pub status: JobStatus,
    /// Last raw scheduler state seen by the poller.
    pub scheduler_state: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub kind: JobKind,
    pub correlation_id: String,
    pub external_job_id: Option<i64>,
    pub status: JobStatus,
    pub start_time: Option<String>,
}

/// A status change the store applies only if the job is still in `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub scheduler_state: Option<String>,
    /// When the scheduler reports the job actually started.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub error_message: Option<String>,
}

/// Built (or building) runtime container, keyed by its definition hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorRecord {
    pub id: i64,
    pub definition_hash: String,
    pub definition: String,
    pub image_path: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSimulator {
    pub definition_hash: String,
    pub definition: String,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub id: i64,
    pub simulator_id: i64,
    pub experiment_id: String,
    pub archive_path: String,
    pub external_job_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSimulation {
    pub simulator_id: i64,
    pub experiment_id: String,
    pub archive_path: String,
}

/// Progress payload published by workers on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEventMessage {
    pub correlation_id: String,
    pub sequence_number: i64,
    pub time: f64,
    #[serde(default)]
    pub mass: BTreeMap<String, f64>,
    /// Workers may report a lifecycle status; plain progress means RUNNING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEvent {
    pub id: i64,
    pub job_id: i64,
    pub correlation_id: String,
    pub sequence_number: i64,
    pub time: f64,
    pub mass: BTreeMap<String, f64>,
    pub created_at: String,
}

/// Incoming execution request: a model archive plus its declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub archive: PathBuf,
    pub dependencies: Vec<String>,
}

/// Container definition derived from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub definition: String,
    pub dependencies: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    entries: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| entry.as_ref().trim().to_string())
                .filter(|entry| !entry.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, dependency: &str) -> bool {
        self.entries.contains(dependency.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One scheduler record, normalized from either the live queue or accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: i64,
    pub name: String,
    pub account: String,
    pub user_name: String,
    pub job_state: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub exit_code: Option<i32>,
}

impl JobState {
    pub fn normalized_state(&self) -> String {
        slurm::normalize_slurm_state(&self.job_state)
    }

    pub fn is_done(&self) -> bool {
        slurm::is_slurm_state_terminal(&self.normalized_state())
    }

    pub fn is_failed(&self) -> bool {
        let state = self.normalized_state();
        slurm::is_slurm_state_terminal(&state) && state != "COMPLETED"
    }

    pub fn status(&self) -> Option<JobStatus> {
        slurm::job_status_for_state(&self.normalized_state())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchHandle {
    pub experiment_id: String,
    pub simulation_id: i64,
    pub simulator_id: i64,
}

/// Ways callers can point at a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRef {
    Job(i64),
    /// Latest simulation run for a simulation record.
    Simulation(i64),
    /// Latest container build for a simulator.
    Simulator(i64),
    Correlation(String),
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobRef::Job(id) => write!(f, "job {id}"),
            JobRef::Simulation(id) => write!(f, "simulation {id}"),
            JobRef::Simulator(id) => write!(f, "simulator {id}"),
            JobRef::Correlation(cid) => write!(f, "correlation id '{cid}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Sessions with a name are cached and reused.
    pub session_name: Option<String>,
    pub host: String,
    pub addr: SocketAddr,
    pub username: String,
    pub identity_path: Option<String>,
    pub known_hosts_path: Option<PathBuf>,
    pub keepalive_secs: u64,
}
