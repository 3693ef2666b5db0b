// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::settings::SchedulerSettings;

/// Remote path convention shared with existing batch scripts.
#[derive(Debug, Clone)]
pub struct RemoteLayout {
    sim_base_path: String,
    image_base_path: String,
    sbatch_base_path: String,
    log_base_path: String,
}

impl RemoteLayout {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            sim_base_path: trim_base(&settings.sim_base_path),
            image_base_path: trim_base(&settings.image_base_path),
            sbatch_base_path: trim_base(&settings.sbatch_base_path),
            log_base_path: trim_base(&settings.log_base_path),
        }
    }

    pub fn experiment_dir(&self, experiment_id: &str) -> String {
        format!("{}/experiment-{experiment_id}", self.sim_base_path)
    }

    pub fn archive_path(&self, experiment_id: &str) -> String {
        format!(
            "{}/{experiment_id}.omex",
            self.experiment_dir(experiment_id)
        )
    }

    pub fn simulation_log(&self, experiment_id: &str) -> String {
        format!("{}/logs", self.experiment_dir(experiment_id))
    }

    pub fn output_dir(&self, experiment_id: &str) -> String {
        format!("{}/output", self.experiment_dir(experiment_id))
    }

    pub fn results_zip(&self, experiment_id: &str) -> String {
        format!("{}/results.zip", self.experiment_dir(experiment_id))
    }

    pub fn report_csv(&self, experiment_id: &str) -> String {
        format!("{}/report.csv", self.experiment_dir(experiment_id))
    }

    pub fn image_dir(&self) -> &str {
        &self.image_base_path
    }

    pub fn definition_path(&self, container_hash: &str) -> String {
        format!("{}/{container_hash}.def", self.image_base_path)
    }

    pub fn image_path(&self, container_hash: &str) -> String {
        format!("{}/simulator-{container_hash}.sif", self.image_base_path)
    }

    pub fn sbatch_dir(&self) -> &str {
        &self.sbatch_base_path
    }

    pub fn submit_script(&self, job_name: &str) -> String {
        format!("{}/{job_name}.sbatch", self.sbatch_base_path)
    }

    pub fn log_dir(&self) -> &str {
        &self.log_base_path
    }

    pub fn job_log(&self, job_name: &str) -> String {
        format!("{}/{job_name}.out", self.log_base_path)
    }
}

fn trim_base(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}
