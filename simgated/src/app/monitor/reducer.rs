// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Single state machine shared by the bus and poll inputs.

use crate::app::types::{JobRecord, JobStatus, JobTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationSource {
    Bus,
    Poll,
}

impl ObservationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationSource::Bus => "bus",
            ObservationSource::Poll => "poll",
        }
    }
}

/// A status reported for one job by either input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status: JobStatus,
    pub source: ObservationSource,
    pub observed_at: String,
    pub scheduler_state: Option<String>,
    pub start_time: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: i64,
    pub status: JobStatus,
}

impl From<&JobRecord> for JobSnapshot {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyTerminal,
    NotAdvanced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply(JobTransition),
    Ignore(IgnoreReason),
}

pub fn reduce(current: &JobSnapshot, observation: &Observation) -> Decision {
    if current.status.is_terminal() {
        return Decision::Ignore(IgnoreReason::AlreadyTerminal);
    }
    let target = observation.status;
    if target != JobStatus::Failed && target.rank() <= current.status.rank() {
        return Decision::Ignore(IgnoreReason::NotAdvanced);
    }

    let end_time = target
        .is_terminal()
        .then(|| observation.observed_at.clone());
    let error_message = (target == JobStatus::Failed).then(|| {
        observation
            .error_message
            .clone()
            .unwrap_or_else(|| format!("job failed ({})", observation.source.as_str()))
    });

    Decision::Apply(JobTransition {
        from: current.status,
        to: target,
        scheduler_state: observation.scheduler_state.clone(),
        start_time: observation.start_time.clone(),
        end_time,
        error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(status: JobStatus) -> Observation {
        Observation {
            status,
            source: ObservationSource::Poll,
            observed_at: "2026-01-01T00:00:00Z".into(),
            scheduler_state: None,
            start_time: None,
            error_message: None,
        }
    }

    fn snapshot(status: JobStatus) -> JobSnapshot {
        JobSnapshot { id: 1, status }
    }

    #[test]
    fn forward_moves_apply() {
        let Decision::Apply(t) = reduce(&snapshot(JobStatus::Queued), &observe(JobStatus::Running))
        else {
            panic!("expected transition");
        };
        assert_eq!(t.from, JobStatus::Queued);
        assert_eq!(t.to, JobStatus::Running);
        assert_eq!(t.end_time, None);
        assert_eq!(t.error_message, None);
    }

    #[test]
    fn scheduler_start_time_is_carried_into_the_transition() {
        let mut obs = observe(JobStatus::Running);
        obs.start_time = Some("2026-01-01T10:00:00".into());
        let Decision::Apply(t) = reduce(&snapshot(JobStatus::Queued), &obs) else {
            panic!("expected transition");
        };
        assert_eq!(t.start_time.as_deref(), Some("2026-01-01T10:00:00"));
    }

    #[test]
    fn backward_and_equal_moves_are_ignored() {
        assert_eq!(
            reduce(&snapshot(JobStatus::Running), &observe(JobStatus::Queued)),
            Decision::Ignore(IgnoreReason::NotAdvanced)
        );
        assert_eq!(
            reduce(&snapshot(JobStatus::Running), &observe(JobStatus::Running)),
            Decision::Ignore(IgnoreReason::NotAdvanced)
        );
    }

    #[test]
    fn failure_is_reachable_from_any_live_state() {
        for status in JobStatus::NON_TERMINAL {
            let mut obs = observe(JobStatus::Failed);
            obs.error_message = Some("scheduler reported TIMEOUT".into());
            let Decision::Apply(t) = reduce(&snapshot(status), &obs) else {
                panic!("expected failure from {status}");
            };
            assert_eq!(t.to, JobStatus::Failed);
            assert_eq!(t.end_time.as_deref(), Some("2026-01-01T00:00:00Z"));
            assert_eq!(t.error_message.as_deref(), Some("scheduler reported TIMEOUT"));
        }
    }

    #[test]
    fn failure_without_message_gets_a_default() {
        let mut obs = observe(JobStatus::Failed);
        obs.source = ObservationSource::Bus;
        let Decision::Apply(t) = reduce(&snapshot(JobStatus::Running), &obs) else {
            panic!("expected transition");
        };
        assert_eq!(t.error_message.as_deref(), Some("job failed (bus)"));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        assert_eq!(
            reduce(&snapshot(JobStatus::Completed), &observe(JobStatus::Failed)),
            Decision::Ignore(IgnoreReason::AlreadyTerminal)
        );
        assert_eq!(
            reduce(&snapshot(JobStatus::Failed), &observe(JobStatus::Completed)),
            Decision::Ignore(IgnoreReason::AlreadyTerminal)
        );
    }

    #[test]
    fn interleaved_observations_never_move_backwards() {
        let sequence = [
            JobStatus::Running,
            JobStatus::Queued,
            JobStatus::Waiting,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Running,
            JobStatus::Failed,
        ];
        let mut current = snapshot(JobStatus::Waiting);
        let mut history = vec![current.status];
        for status in sequence {
            if let Decision::Apply(t) = reduce(&current, &observe(status)) {
                assert_eq!(t.from, current.status);
                current.status = t.to;
                history.push(t.to);
            }
        }
        assert_eq!(
            history,
            vec![JobStatus::Waiting, JobStatus::Running, JobStatus::Completed]
        );
        assert!(history.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    }
}
