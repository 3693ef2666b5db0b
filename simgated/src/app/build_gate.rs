// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io::Write;
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;

use crate::app::errors::{AppResult, local_error};
use crate::app::monitor::{JobMonitor, JobSubscription};
use crate::app::ports::{
    ClockPort, FileUpload, JobStorePort, SchedulerPort, SimulatorStorePort, SubmitRequest,
    TelemetryEvent, TelemetryPort,
};
use crate::app::services::identity;
use crate::app::services::layout::RemoteLayout;
use crate::app::services::scripts::{BuildScriptParams, render_build_script};
use crate::app::settings::SchedulerSettings;
use crate::app::types::{
    ContainerSpec, JobKind, JobRecord, JobStatus, JobType, NewJob, NewSimulator, SimulatorRecord,
};

/// Result of resolving a container: usable now, or behind a build job.
#[derive(Debug)]
pub enum GateOutcome {
    Ready(SimulatorRecord),
    Building {
        simulator: SimulatorRecord,
        job: JobRecord,
        /// Registered before `job` was visible to the monitor.
        subscription: JobSubscription,
    },
}

impl GateOutcome {
    pub fn simulator(&self) -> &SimulatorRecord {
        match self {
            GateOutcome::Ready(simulator) => simulator,
            GateOutcome::Building { simulator, .. } => simulator,
        }
    }
}

/// Build-or-reuse for simulator images, keyed by the definition hash.
pub struct BuildGate {
    simulators: Arc<dyn SimulatorStorePort>,
    jobs: Arc<dyn JobStorePort>,
    scheduler: Arc<dyn SchedulerPort>,
    monitor: Arc<JobMonitor>,
    clock: Arc<dyn ClockPort>,
    telemetry: Arc<dyn TelemetryPort>,
    layout: RemoteLayout,
    settings: SchedulerSettings,
}

impl BuildGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        simulators: Arc<dyn SimulatorStorePort>,
        jobs: Arc<dyn JobStorePort>,
        scheduler: Arc<dyn SchedulerPort>,
        monitor: Arc<JobMonitor>,
        clock: Arc<dyn ClockPort>,
        telemetry: Arc<dyn TelemetryPort>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            simulators,
            jobs,
            scheduler,
            monitor,
            clock,
            telemetry,
            layout: RemoteLayout::new(&settings),
            settings,
        }
    }

    pub async fn resolve(&self, spec: &ContainerSpec) -> AppResult<GateOutcome> {
        let hash = identity::container_hash(&spec.definition);

        // TODO: make definition_hash unique and switch to insert-or-fetch so
        // concurrent first requests for one definition share a single build.
        if let Some(simulator) = self.simulators.get_simulator_by_hash(&hash).await? {
            return self.reuse(simulator).await;
        }

        let simulator = self
            .simulators
            .insert_simulator(&NewSimulator {
                definition_hash: hash.clone(),
                definition: spec.definition.clone(),
                image_path: self.layout.image_path(&hash),
            })
            .await?;
        tracing::info!(simulator_id = simulator.id, hash = %hash, "new simulator definition");
        self.submit_build(simulator).await
    }

    async fn reuse(&self, simulator: SimulatorRecord) -> AppResult<GateOutcome> {
        let latest = self
            .jobs
            .latest_job_for_kind(JobKind::Build(simulator.id))
            .await?;
        match latest {
            Some(job) if job.status == JobStatus::Completed => {
                self.telemetry.event(
                    "build.reused",
                    TelemetryEvent {
                        simulator_id: Some(simulator.id),
                        job_id: Some(job.id),
                        ..TelemetryEvent::default()
                    },
                );
                Ok(GateOutcome::Ready(simulator))
            }
            Some(
                job @ JobRecord {
                    external_job_id: Some(external_job_id),
                    ..
                },
            ) if !job.status.is_terminal() => {
                let subscription = self.monitor.subscribe(external_job_id).await;
                tracing::info!(
                    simulator_id = simulator.id,
                    correlation_id = %job.correlation_id,
                    "joining build already in flight"
                );
                self.telemetry.event(
                    "build.awaited",
                    TelemetryEvent {
                        simulator_id: Some(simulator.id),
                        job_id: Some(job.id),
                        external_job_id: Some(external_job_id),
                        correlation_id: Some(job.correlation_id.clone()),
                        ..TelemetryEvent::default()
                    },
                );
                Ok(GateOutcome::Building {
                    simulator,
                    job,
                    subscription,
                })
            }
            other => {
                tracing::warn!(
                    simulator_id = simulator.id,
                    previous = ?other.map(|job| job.status),
                    "simulator has no usable image, rebuilding"
                );
                self.submit_build(simulator).await
            }
        }
    }

    async fn submit_build(&self, simulator: SimulatorRecord) -> AppResult<GateOutcome> {
        let correlation_id = identity::correlation_id(JobType::BuildContainer);
        let definition_path = self.layout.definition_path(&simulator.definition_hash);
        let script = render_build_script(
            &self.settings,
            BuildScriptParams {
                job_name: &correlation_id,
                image_path: &simulator.image_path,
                definition_path: &definition_path,
                log_path: &self.layout.job_log(&correlation_id),
            },
        )?;

        let mut definition_file = tempfile::NamedTempFile::new()
            .map_err(|err| local_error(format!("failed to create definition file: {err}")))?;
        definition_file
            .write_all(simulator.definition.as_bytes())
            .and_then(|_| definition_file.flush())
            .map_err(|err| local_error(format!("failed to write definition file: {err}")))?;

        let request = SubmitRequest {
            job_name: correlation_id.clone(),
            script,
            uploads: vec![FileUpload {
                local: definition_file.path().to_path_buf(),
                remote: definition_path,
            }],
            remote_dirs: vec![
                self.layout.image_dir().to_string(),
                self.layout.log_dir().to_string(),
            ],
        };
        let external_job_id = self.scheduler.submit_job(&request).await?;

        let subscription = self.monitor.subscribe(external_job_id).await;
        let job = match self
            .jobs
            .insert_job(&NewJob {
                kind: JobKind::Build(simulator.id),
                correlation_id: correlation_id.clone(),
                external_job_id: Some(external_job_id),
                status: JobStatus::Queued,
                start_time: Some(self.now_rfc3339()),
            })
            .await
        {
            Ok(job) => job,
            Err(err) => {
                self.monitor.unsubscribe(&subscription).await;
                return Err(err);
            }
        };

        tracing::info!(
            simulator_id = simulator.id,
            external_job_id,
            correlation_id = %correlation_id,
            "container build submitted"
        );
        self.telemetry.event(
            "build.submitted",
            TelemetryEvent {
                simulator_id: Some(simulator.id),
                job_id: Some(job.id),
                external_job_id: Some(external_job_id),
                correlation_id: Some(correlation_id),
                ..TelemetryEvent::default()
            },
        );
        Ok(GateOutcome::Building {
            simulator,
            job,
            subscription,
        })
    }

    fn now_rfc3339(&self) -> String {
        let now = self.clock.now_utc();
        now.format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string())
    }
}
