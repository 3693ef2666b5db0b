// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::types::{JobState, JobStatus};

const SQUEUE_FORMAT: &str = "%i|%j|%a|%u|%T|%S|%e";
const SACCT_FIELDS: &str = "JobID,JobName,Account,User,State,Start,End,ExitCode";

pub fn squeue_command(ids: &[i64]) -> String {
    format!("squeue -h -j {} -o '{SQUEUE_FORMAT}'", join_ids(ids))
}

pub fn sacct_command(ids: &[i64]) -> String {
    format!("sacct -n -P -X -j {} -o {SACCT_FIELDS}", join_ids(ids))
}

pub fn sbatch_command(remote_script: &str) -> String {
    format!("sbatch {}", super::shell::sh_escape(remote_script))
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_job_id(line: &str) -> Option<i64> {
    // Expect message from sbatch like: "Submitted batch job 11"
    let marker = "job ";
    let idx = line.find(marker)?;
    let after_job = &line[idx + marker.len()..];
    after_job.trim().parse::<i64>().ok()
}

/// Parses sbatch stdout, which may carry warnings before the submission line.
pub fn parse_sbatch_output(output: &str) -> Option<i64> {
    output
        .lines()
        .rev()
        .find_map(|line| parse_job_id(line.trim()))
}

pub fn is_invalid_job_id(text: &str) -> bool {
    text.to_ascii_lowercase().contains("invalid job id")
}

/// Live-queue snapshot rows, in squeue's `SQUEUE_FORMAT` column order.
pub fn parse_squeue_records(output: &str) -> Vec<JobState> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() != 7 {
                tracing::debug!("skipping malformed squeue line: {line}");
                return None;
            }
            let job_id = fields[0].parse::<i64>().ok()?;
            Some(JobState {
                job_id,
                name: fields[1].to_string(),
                account: fields[2].to_string(),
                user_name: fields[3].to_string(),
                job_state: fields[4].to_string(),
                start_time: optional_time(fields[5]),
                end_time: optional_time(fields[6]),
                exit_code: None,
            })
        })
        .collect()
}

/// Accounting rows. Step rows such as `42.batch` are dropped.
pub fn parse_sacct_records(output: &str) -> Vec<JobState> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() != 8 {
                tracing::debug!("skipping malformed sacct line: {line}");
                return None;
            }
            let job_id = fields[0].parse::<i64>().ok()?;
            Some(JobState {
                job_id,
                name: fields[1].to_string(),
                account: fields[2].to_string(),
                user_name: fields[3].to_string(),
                job_state: fields[4].to_string(),
                start_time: optional_time(fields[5]),
                end_time: optional_time(fields[6]),
                exit_code: parse_exit_code(fields[7]),
            })
        })
        .collect()
}

fn optional_time(raw: &str) -> Option<String> {
    match raw.trim() {
        "" | "N/A" | "Unknown" | "None" => None,
        value => Some(value.to_string()),
    }
}

fn parse_exit_code(raw: &str) -> Option<i32> {
    raw.split(':').next()?.trim().parse::<i32>().ok()
}

pub fn normalize_slurm_state(state: &str) -> String {
    let token = state
        .split(|c: char| c == '+' || c == ':' || c == '(' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or(state)
        .trim();
    token.to_ascii_uppercase()
}

pub fn is_slurm_state_active(state: &str) -> bool {
    matches!(
        state,
        "PENDING"
            | "RUNNING"
            | "CONFIGURING"
            | "COMPLETING"
            | "SUSPENDED"
            | "RESIZING"
            | "REQUEUED"
            | "STAGE_OUT"
            | "STAGE_IN"
            | "SIGNALING"
    )
}

pub fn is_slurm_state_terminal(state: &str) -> bool {
    matches!(
        state,
        "COMPLETED"
            | "CANCELLED"
            | "FAILED"
            | "TIMEOUT"
            | "NODE_FAIL"
            | "PREEMPTED"
            | "BOOT_FAIL"
            | "OUT_OF_MEMORY"
            | "DEADLINE"
            | "SPECIAL_EXIT"
            | "REVOKED"
    )
}

/// Maps a normalized scheduler state onto the job lifecycle.
pub fn job_status_for_state(state: &str) -> Option<JobStatus> {
    match state {
        "PENDING" | "CONFIGURING" | "REQUEUED" => Some(JobStatus::Queued),
        "COMPLETED" => Some(JobStatus::Completed),
        s if is_slurm_state_terminal(s) => Some(JobStatus::Failed),
        s if is_slurm_state_active(s) => Some(JobStatus::Running),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sbatch_submission_line() {
        assert_eq!(parse_job_id("Submitted batch job 11"), Some(11));
        assert_eq!(parse_job_id("no job here"), None);
        let out = "sbatch: warning: partition is busy\nSubmitted batch job 4242\n";
        assert_eq!(parse_sbatch_output(out), Some(4242));
        assert_eq!(parse_sbatch_output("sbatch: error: denied"), None);
    }

    #[test]
    fn builds_query_commands() {
        assert_eq!(
            squeue_command(&[3, 4]),
            "squeue -h -j 3,4 -o '%i|%j|%a|%u|%T|%S|%e'"
        );
        assert_eq!(
            sacct_command(&[7]),
            "sacct -n -P -X -j 7 -o JobID,JobName,Account,User,State,Start,End,ExitCode"
        );
        assert_eq!(sbatch_command("/s/job.sbatch"), "sbatch '/s/job.sbatch'");
    }

    #[test]
    fn parses_squeue_rows() {
        let out = "12|simulation-abc|lab|alice|RUNNING|2026-01-02T10:00:00|N/A\n\n";
        let rows = parse_squeue_records(out);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].job_id, 12);
        assert_eq!(rows[0].name, "simulation-abc");
        assert_eq!(rows[0].start_time.as_deref(), Some("2026-01-02T10:00:00"));
        assert_eq!(rows[0].end_time, None);
        assert_eq!(rows[0].exit_code, None);
    }

    #[test]
    fn parses_sacct_rows_and_skips_steps() {
        let out = "\
31|build_container-x|lab|bob|COMPLETED|2026-01-02T10:00:00|2026-01-02T10:05:00|0:0
31.batch|batch|lab||COMPLETED|2026-01-02T10:00:00|2026-01-02T10:05:00|0:0
32|simulation-y|lab|bob|FAILED|Unknown|Unknown|2:0
";
        let rows = parse_sacct_records(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].job_id, 31);
        assert_eq!(rows[0].exit_code, Some(0));
        assert_eq!(rows[1].start_time, None);
        assert_eq!(rows[1].exit_code, Some(2));
    }

    #[test]
    fn normalizes_decorated_states() {
        assert_eq!(normalize_slurm_state("cancelled+"), "CANCELLED");
        assert_eq!(normalize_slurm_state("CANCELLED by 1000"), "CANCELLED");
        assert_eq!(normalize_slurm_state("FAILED(exit)"), "FAILED");
        assert_eq!(normalize_slurm_state("OUT_OF_MEMORY:0"), "OUT_OF_MEMORY");
    }

    #[test]
    fn maps_states_to_lifecycle() {
        assert_eq!(job_status_for_state("PENDING"), Some(JobStatus::Queued));
        assert_eq!(job_status_for_state("COMPLETING"), Some(JobStatus::Running));
        assert_eq!(job_status_for_state("COMPLETED"), Some(JobStatus::Completed));
        assert_eq!(job_status_for_state("TIMEOUT"), Some(JobStatus::Failed));
        assert_eq!(job_status_for_state("WHATEVER"), None);
    }

    #[test]
    fn detects_invalid_job_id_message() {
        assert!(is_invalid_job_id(
            "slurm_load_jobs error: Invalid job id specified"
        ));
        assert!(!is_invalid_job_id("connection refused"));
    }
}
