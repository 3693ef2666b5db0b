// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::app::build_gate::{BuildGate, GateOutcome};
use crate::app::errors::{AppError, AppErrorKind, AppResult, codes, invalid_argument};
use crate::app::monitor::{JobMonitor, JobSubscription};
use crate::app::ports::{
    ClockPort, ContainerSpecPort, FileUpload, JobStorePort, SchedulerPort, SimulationStorePort,
    SubmitRequest, TelemetryEvent, TelemetryPort,
};
use crate::app::services::identity;
use crate::app::services::layout::RemoteLayout;
use crate::app::services::scripts::{SimulationScriptParams, render_simulation_script};
use crate::app::settings::SchedulerSettings;
use crate::app::types::{
    AllowList, DispatchHandle, JobKind, JobRecord, JobStatus, JobType, NewJob, NewSimulation,
    SimulationRecord, SimulationRequest, SimulatorRecord,
};

/// Accepted dispatch: the handle plus the task that finishes submission.
#[derive(Debug)]
pub struct Dispatch {
    pub handle: DispatchHandle,
    /// Resolves to the SIMULATION job once it is submitted and recorded.
    pub continuation: JoinHandle<AppResult<JobRecord>>,
}

pub struct Dispatcher {
    specs: Arc<dyn ContainerSpecPort>,
    allow_list: AllowList,
    gate: BuildGate,
    simulations: Arc<dyn SimulationStorePort>,
    jobs: Arc<dyn JobStorePort>,
    scheduler: Arc<dyn SchedulerPort>,
    monitor: Arc<JobMonitor>,
    clock: Arc<dyn ClockPort>,
    telemetry: Arc<dyn TelemetryPort>,
    layout: RemoteLayout,
    settings: SchedulerSettings,
}

struct PendingRun {
    simulation: SimulationRecord,
    simulator: SimulatorRecord,
    build: Option<(JobRecord, JobSubscription)>,
    archive: PathBuf,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        specs: Arc<dyn ContainerSpecPort>,
        allow_list: AllowList,
        gate: BuildGate,
        simulations: Arc<dyn SimulationStorePort>,
        jobs: Arc<dyn JobStorePort>,
        scheduler: Arc<dyn SchedulerPort>,
        monitor: Arc<JobMonitor>,
        clock: Arc<dyn ClockPort>,
        telemetry: Arc<dyn TelemetryPort>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            specs,
            allow_list,
            gate,
            simulations,
            jobs,
            scheduler,
            monitor,
            clock,
            telemetry,
            layout: RemoteLayout::new(&settings),
            settings,
        }
    }

    /// Validates the request, resolves the container and records the simulation,
    /// then hands the rest to a background continuation.
    pub async fn dispatch(self: &Arc<Self>, request: SimulationRequest) -> AppResult<Dispatch> {
        let is_file = tokio::fs::metadata(&request.archive)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(invalid_argument(format!(
                "archive '{}' is not a readable file",
                request.archive.display()
            )));
        }
        let spec = self.specs.derive(&request, &self.allow_list)?;

        let outcome = self.gate.resolve(&spec).await?;
        let simulator = outcome.simulator().clone();
        let experiment_id =
            identity::experiment_id(&simulator.definition_hash, &identity::random_suffix());

        let inserted = self
            .simulations
            .insert_simulation(&NewSimulation {
                simulator_id: simulator.id,
                experiment_id: experiment_id.clone(),
                archive_path: self.layout.archive_path(&experiment_id),
            })
            .await;
        let build = match outcome {
            GateOutcome::Ready(_) => None,
            GateOutcome::Building {
                job, subscription, ..
            } => Some((job, subscription)),
        };
        let simulation = match inserted {
            Ok(simulation) => simulation,
            Err(err) => {
                if let Some((_, subscription)) = &build {
                    self.monitor.unsubscribe(subscription).await;
                }
                return Err(err);
            }
        };

        let handle = DispatchHandle {
            experiment_id: experiment_id.clone(),
            simulation_id: simulation.id,
            simulator_id: simulator.id,
        };
        tracing::info!(
            experiment_id = %experiment_id,
            simulation_id = simulation.id,
            simulator_id = simulator.id,
            awaiting_build = build.is_some(),
            "simulation accepted"
        );

        let span = tracing::info_span!("dispatch", experiment_id = %experiment_id);
        let this = Arc::clone(self);
        let pending = PendingRun {
            simulation,
            simulator,
            build,
            archive: request.archive,
        };
        let continuation = tokio::spawn(
            async move {
                let result = this.complete(pending).await;
                if let Err(err) = &result {
                    tracing::error!(code = err.code(), "dispatch failed: {err}");
                }
                result
            }
            .instrument(span),
        );
        Ok(Dispatch {
            handle,
            continuation,
        })
    }

    async fn complete(&self, pending: PendingRun) -> AppResult<JobRecord> {
        let PendingRun {
            simulation,
            simulator,
            build,
            archive,
        } = pending;

        if let Some((build_job, subscription)) = build {
            tracing::info!(correlation_id = %build_job.correlation_id, "waiting for container build");
            self.monitor
                .wait_for_completion(subscription)
                .await
                .map_err(|err| {
                    if err.code() == codes::JOB_FAILED {
                        AppError::with_message(
                            AppErrorKind::Internal,
                            codes::BUILD_FAILED,
                            format!("container build failed: {}", err.message()),
                        )
                        .with_context(build_job.correlation_id.clone())
                    } else {
                        err
                    }
                })?;
        }

        let experiment_id = &simulation.experiment_id;
        let correlation_id = identity::correlation_id(JobType::Simulation);
        let experiment_dir = self.layout.experiment_dir(experiment_id);
        let script = render_simulation_script(
            &self.settings,
            SimulationScriptParams {
                job_name: &correlation_id,
                experiment_id,
                experiment_dir: &experiment_dir,
                image_path: &simulator.image_path,
                log_path: &self.layout.simulation_log(experiment_id),
            },
        )?;
        let external_job_id = self
            .scheduler
            .submit_job(&SubmitRequest {
                job_name: correlation_id.clone(),
                script,
                uploads: vec![FileUpload {
                    local: archive,
                    remote: simulation.archive_path.clone(),
                }],
                remote_dirs: vec![experiment_dir],
            })
            .await?;

        let job = self
            .jobs
            .insert_job(&NewJob {
                kind: JobKind::Simulation(simulation.id),
                correlation_id: correlation_id.clone(),
                external_job_id: Some(external_job_id),
                status: JobStatus::Queued,
                start_time: Some(self.now_rfc3339()),
            })
            .await?;
        if !self
            .simulations
            .set_simulation_external_job_id(simulation.id, external_job_id)
            .await?
        {
            tracing::warn!(simulation_id = simulation.id, "simulation already had a scheduler job");
        }

        tracing::info!(
            simulation_id = simulation.id,
            external_job_id,
            correlation_id = %correlation_id,
            "simulation submitted"
        );
        self.telemetry.event(
            "simulation.submitted",
            TelemetryEvent {
                simulation_id: Some(simulation.id),
                simulator_id: Some(simulator.id),
                job_id: Some(job.id),
                external_job_id: Some(external_job_id),
                correlation_id: Some(correlation_id),
                experiment_id: Some(simulation.experiment_id.clone()),
            },
        );
        Ok(job)
    }

    fn now_rfc3339(&self) -> String {
        let now = self.clock.now_utc();
        now.format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string())
    }
}
