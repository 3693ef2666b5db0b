// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::time::Duration;

/// Batch-scheduler resources and remote directory roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub partition: String,
    pub qos: Option<String>,
    pub time_limit: String,
    pub cpus_per_task: u32,
    pub memory: String,
    pub sim_base_path: String,
    pub image_base_path: String,
    pub sbatch_base_path: String,
    pub log_base_path: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            partition: "general".to_string(),
            qos: None,
            time_limit: "30:00".to_string(),
            cpus_per_task: 2,
            memory: "8GB".to_string(),
            sim_base_path: "simgate/sims".to_string(),
            image_base_path: "simgate/images".to_string(),
            sbatch_base_path: "simgate/sbatch".to_string(),
            log_base_path: "simgate/logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub worker_event_subject: String,
    /// Per-iteration timeout of a completion wait before falling back to the database.
    pub wait_timeout: Duration,
    pub max_wait_iterations: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            worker_event_subject: "worker.events".to_string(),
            wait_timeout: Duration::from_secs(60),
            max_wait_iterations: 30,
        }
    }
}
