// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{
    AppError, AppErrorKind, AppResult, codes, local_error, scheduler_state,
};
use crate::app::ports::{RemoteExecPort, SchedulerPort, SubmitRequest, run_command};
use crate::app::services::layout::RemoteLayout;
use crate::app::services::{shell, slurm};
use crate::app::types::{JobState, SshConfig};

/// Slurm over the remote transport: `sbatch` to submit, `squeue` then `sacct` to query.
pub struct SlurmClient {
    remote: Arc<dyn RemoteExecPort>,
    ssh: SshConfig,
    layout: RemoteLayout,
}

impl SlurmClient {
    pub fn new(remote: Arc<dyn RemoteExecPort>, ssh: SshConfig, layout: RemoteLayout) -> Self {
        Self {
            remote,
            ssh,
            layout,
        }
    }

    async fn upload_script(&self, job_name: &str, script: &str) -> AppResult<String> {
        let remote_path = self.layout.submit_script(job_name);
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|err| local_error(format!("failed to create script file: {err}")))?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|err| local_error(format!("failed to write script file: {err}")))?;
        self.remote
            .upload(&self.ssh, file.path(), &remote_path)
            .await?;
        Ok(remote_path)
    }

    async fn query_live_queue(&self, ids: &[i64]) -> AppResult<Vec<JobState>> {
        let command = slurm::squeue_command(ids);
        let capture = self.remote.exec_capture(&self.ssh, &command).await?;
        if capture.exit_code != 0 {
            let stderr = capture.stderr_lossy();
            // squeue refuses ids that already left the queue; accounting covers them.
            if slurm::is_invalid_job_id(&stderr) {
                return Ok(Vec::new());
            }
            return Err(AppError::with_message(
                AppErrorKind::Unavailable,
                codes::REMOTE_ERROR,
                format!(
                    "squeue exited with {}: {}",
                    capture.exit_code,
                    stderr.trim()
                ),
            )
            .with_context(command));
        }
        Ok(slurm::parse_squeue_records(&capture.stdout_lossy()))
    }

    async fn query_accounting(&self, ids: &[i64]) -> AppResult<Vec<JobState>> {
        let command = slurm::sacct_command(ids);
        let capture = run_command(self.remote.as_ref(), &self.ssh, &command).await?;
        Ok(slurm::parse_sacct_records(&capture.stdout_lossy()))
    }
}

#[async_trait]
impl SchedulerPort for SlurmClient {
    #[tracing::instrument(
        name = "slurm",
        level = "debug",
        skip(self, request),
        fields(op = "submit", job_name = %request.job_name)
    )]
    async fn submit_job(&self, request: &SubmitRequest) -> AppResult<i64> {
        let mut dirs: Vec<&str> = request.remote_dirs.iter().map(String::as_str).collect();
        if !dirs.contains(&self.layout.sbatch_dir()) {
            dirs.push(self.layout.sbatch_dir());
        }
        run_command(
            self.remote.as_ref(),
            &self.ssh,
            &shell::mkdir_all_command(&dirs),
        )
        .await?;

        for upload in &request.uploads {
            self.remote
                .upload(&self.ssh, &upload.local, &upload.remote)
                .await?;
        }
        let script_path = self.upload_script(&request.job_name, &request.script).await?;

        let command = slurm::sbatch_command(&script_path);
        let capture = self.remote.exec_capture(&self.ssh, &command).await?;
        if capture.exit_code != 0 {
            return Err(AppError::with_message(
                AppErrorKind::Internal,
                codes::SUBMISSION_FAILED,
                format!(
                    "sbatch exited with {}: {}",
                    capture.exit_code,
                    capture.stderr_lossy().trim()
                ),
            )
            .with_context(command));
        }
        let stdout = capture.stdout_lossy();
        let job_id = slurm::parse_sbatch_output(&stdout).ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::SUBMISSION_FAILED,
                format!("could not parse sbatch output: {}", stdout.trim()),
            )
            .with_context(command.clone())
        })?;
        tracing::info!(job_name = %request.job_name, job_id, "submitted batch job");
        Ok(job_id)
    }

    #[tracing::instrument(
        name = "slurm",
        level = "debug",
        skip(self, ids),
        fields(op = "status", count = ids.len())
    )]
    async fn get_job_status(&self, ids: &[i64]) -> AppResult<Vec<JobState>> {
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let wanted_ids: Vec<i64> = wanted.iter().copied().collect();

        let mut found = collect_unique(self.query_live_queue(&wanted_ids).await?, &wanted, "squeue")?;

        let missing: Vec<i64> = wanted
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();
        if !missing.is_empty() {
            let wanted_missing: BTreeSet<i64> = missing.iter().copied().collect();
            let historical = collect_unique(
                self.query_accounting(&missing).await?,
                &wanted_missing,
                "sacct",
            )?;
            found.extend(historical);
        }

        Ok(wanted_ids
            .into_iter()
            .filter_map(|id| found.remove(&id))
            .collect())
    }
}

/// Keys records by job id, rejecting any id reported more than once.
fn collect_unique(
    records: Vec<JobState>,
    wanted: &BTreeSet<i64>,
    backend: &str,
) -> AppResult<BTreeMap<i64, JobState>> {
    let mut by_id = BTreeMap::new();
    for record in records {
        if !wanted.contains(&record.job_id) {
            continue;
        }
        let job_id = record.job_id;
        if by_id.insert(job_id, record).is_some() {
            tracing::error!(job_id, backend, "scheduler reported duplicate records");
            return Err(scheduler_state(format!(
                "{backend} reported more than one record for job {job_id}"
            )));
        }
    }
    Ok(by_id)
}
