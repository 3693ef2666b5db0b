// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::context::AppContext;
use crate::app::dispatch::Dispatch;
use crate::app::errors::{AppResult, local_error, not_found};
use crate::app::types::{
    JobKind, JobRecord, JobRef, SimulationRecord, SimulationRequest, SimulatorRecord, WorkerEvent,
};

/// Operations exposed to the command line.
#[derive(Clone)]
pub struct UseCases {
    pub(crate) context: Arc<AppContext>,
}

impl UseCases {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn dispatch(&self, request: SimulationRequest) -> AppResult<Dispatch> {
        self.context.dispatcher.dispatch(request).await
    }

    pub async fn get_status(&self, job_ref: &JobRef) -> AppResult<JobRecord> {
        let jobs = &self.context.jobs;
        let found = match job_ref {
            JobRef::Job(id) => jobs.get_job(*id).await?,
            JobRef::Simulation(id) => jobs.latest_job_for_kind(JobKind::Simulation(*id)).await?,
            JobRef::Simulator(id) => jobs.latest_job_for_kind(JobKind::Build(*id)).await?,
            JobRef::Correlation(cid) => jobs.get_job_by_correlation_id(cid).await?,
        };
        found.ok_or_else(|| not_found(format!("no job found for {job_ref}")))
    }

    /// Events recorded after `after` (exclusive); `None` returns all of them.
    pub async fn list_events(
        &self,
        job_ref: &JobRef,
        after: Option<i64>,
    ) -> AppResult<Vec<WorkerEvent>> {
        let job = self.get_status(job_ref).await?;
        self.context
            .worker_events
            .list_worker_events(job.id, after.unwrap_or(i64::MIN))
            .await
    }

    /// Simulators registered so far, oldest first.
    pub async fn list_simulators(&self) -> AppResult<Vec<SimulatorRecord>> {
        self.context.simulators.list_simulators().await
    }

    pub async fn get_simulation(&self, simulation_id: i64) -> AppResult<SimulationRecord> {
        self.context
            .simulations
            .get_simulation(simulation_id)
            .await?
            .ok_or_else(|| not_found(format!("simulation {simulation_id} not found")))
    }

    /// Downloads `results.zip` into `dest_dir` as `{experiment_id}_results.zip`.
    pub async fn fetch_results(&self, simulation_id: i64, dest_dir: &Path) -> AppResult<PathBuf> {
        let simulation = self.get_simulation(simulation_id).await?;
        tokio::fs::create_dir_all(dest_dir).await.map_err(|err| {
            local_error(format!(
                "failed to create '{}': {err}",
                dest_dir.display()
            ))
        })?;
        let remote = self.context.layout.results_zip(&simulation.experiment_id);
        let local = dest_dir.join(format!("{}_results.zip", simulation.experiment_id));
        self.context
            .remote
            .download(&self.context.ssh, &remote, &local)
            .await?;
        tracing::info!(
            simulation_id,
            remote = %remote,
            local = %local.display(),
            "downloaded simulation results"
        );
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::bus::LocalEventBus;
    use crate::adapters::container::DefinitionGenerator;
    use crate::adapters::db::SqliteStoreAdapter;
    use crate::adapters::time::SystemClock;
    use crate::app::context::ContextParts;
    use crate::app::errors::codes;
    use crate::app::ports::{
        JobStorePort, NoopTelemetry, SimulationStorePort, SimulatorStorePort,
        WorkerEventStorePort,
    };
    use crate::app::test_support::{
        RecordingRemoteExec, ScriptedScheduler, fast_monitor_settings, memory_stores,
        sample_scheduler_settings, sample_ssh_config,
    };
    use crate::app::types::{
        AllowList, JobStatus, NewJob, NewSimulation, NewSimulator, WorkerEventMessage,
    };
    use std::collections::BTreeMap;

    async fn build_usecases(remote: Arc<RecordingRemoteExec>) -> (UseCases, Arc<SqliteStoreAdapter>) {
        let store = memory_stores().await;
        let context = AppContext::build(ContextParts {
            jobs: store.clone(),
            simulators: store.clone(),
            simulations: store.clone(),
            worker_events: store.clone(),
            remote,
            scheduler: Arc::new(ScriptedScheduler::default()),
            bus: Arc::new(LocalEventBus::default()),
            specs: Arc::new(DefinitionGenerator::default()),
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(NoopTelemetry),
            ssh: sample_ssh_config(),
            scheduler_settings: sample_scheduler_settings(),
            monitor_settings: fast_monitor_settings(),
            allow_list: AllowList::new(["numpy==1.26.4"]),
        });
        (UseCases::new(Arc::new(context)), store)
    }

    async fn seed(store: &SqliteStoreAdapter) -> (i64, i64, JobRecord, JobRecord) {
        let simulator = store
            .insert_simulator(&NewSimulator {
                definition_hash: "abc".into(),
                definition: "Bootstrap: docker".into(),
                image_path: "/hpc/images/simulator-abc.sif".into(),
            })
            .await
            .unwrap();
        let simulation = store
            .insert_simulation(&NewSimulation {
                simulator_id: simulator.id,
                experiment_id: "abc_1234567".into(),
                archive_path: "/hpc/sims/experiment-abc_1234567/abc_1234567.omex".into(),
            })
            .await
            .unwrap();
        let build = store
            .insert_job(&NewJob {
                kind: JobKind::Build(simulator.id),
                correlation_id: "build_container-aaaaaaaaaaaa".into(),
                external_job_id: Some(10),
                status: JobStatus::Completed,
                start_time: None,
            })
            .await
            .unwrap();
        let run = store
            .insert_job(&NewJob {
                kind: JobKind::Simulation(simulation.id),
                correlation_id: "simulation-bbbbbbbbbbbb".into(),
                external_job_id: Some(11),
                status: JobStatus::Running,
                start_time: None,
            })
            .await
            .unwrap();
        (simulator.id, simulation.id, build, run)
    }

    #[tokio::test]
    async fn status_resolves_every_reference_kind() {
        let (usecases, store) = build_usecases(Arc::new(RecordingRemoteExec::default())).await;
        let (simulator_id, simulation_id, build, run) = seed(&store).await;

        assert_eq!(usecases.get_status(&JobRef::Job(run.id)).await.unwrap().id, run.id);
        assert_eq!(
            usecases.get_status(&JobRef::Simulation(simulation_id)).await.unwrap().id,
            run.id
        );
        assert_eq!(
            usecases.get_status(&JobRef::Simulator(simulator_id)).await.unwrap().id,
            build.id
        );
        assert_eq!(
            usecases
                .get_status(&JobRef::Correlation(build.correlation_id.clone()))
                .await
                .unwrap()
                .id,
            build.id
        );
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let (usecases, store) = build_usecases(Arc::new(RecordingRemoteExec::default())).await;
        seed(&store).await;

        for job_ref in [
            JobRef::Job(999),
            JobRef::Simulation(999),
            JobRef::Simulator(999),
            JobRef::Correlation("simulation-zzzzzzzzzzzz".into()),
            JobRef::Correlation("not a correlation id".into()),
        ] {
            let err = usecases.get_status(&job_ref).await.unwrap_err();
            assert_eq!(err.code(), codes::NOT_FOUND);
            assert_eq!(err.http_status(), 404);
        }
    }

    #[tokio::test]
    async fn list_events_returns_events_after_sequence() {
        let (usecases, store) = build_usecases(Arc::new(RecordingRemoteExec::default())).await;
        let (_, simulation_id, _, run) = seed(&store).await;
        for seq in [1, 3, 2, 3, 4] {
            store
                .insert_worker_event(
                    run.id,
                    &WorkerEventMessage {
                        correlation_id: run.correlation_id.clone(),
                        sequence_number: seq,
                        time: seq as f64,
                        mass: BTreeMap::from([("S1".to_string(), seq as f64)]),
                        status: None,
                        error_message: None,
                    },
                )
                .await
                .unwrap();
        }

        let all = usecases
            .list_events(&JobRef::Simulation(simulation_id), None)
            .await
            .unwrap();
        let seqs: Vec<i64> = all.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let tail = usecases
            .list_events(&JobRef::Job(run.id), Some(2))
            .await
            .unwrap();
        let seqs: Vec<i64> = tail.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[tokio::test]
    async fn fetch_results_downloads_zip_named_after_experiment() {
        let remote = Arc::new(RecordingRemoteExec {
            download_payload: b"PK\x05\x06".to_vec(),
            ..RecordingRemoteExec::default()
        });
        let (usecases, store) = build_usecases(remote.clone()).await;
        let (_, simulation_id, _, _) = seed(&store).await;
        let dest = tempfile::tempdir().unwrap();

        let path = usecases
            .fetch_results(simulation_id, &dest.path().join("out"))
            .await
            .unwrap();

        assert_eq!(path, dest.path().join("out").join("abc_1234567_results.zip"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x05\x06");
        assert_eq!(
            remote.downloads.lock().unwrap().clone(),
            vec!["/hpc/sims/experiment-abc_1234567/results.zip".to_string()]
        );
    }

    #[tokio::test]
    async fn list_simulators_returns_registered_definitions() {
        let (usecases, store) = build_usecases(Arc::new(RecordingRemoteExec::default())).await;
        assert!(usecases.list_simulators().await.unwrap().is_empty());

        let (simulator_id, _, _, _) = seed(&store).await;
        let listed = usecases.list_simulators().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, simulator_id);
        assert_eq!(listed[0].definition_hash, "abc");
    }

    #[tokio::test]
    async fn fetch_results_for_unknown_simulation_is_not_found() {
        let (usecases, _) = build_usecases(Arc::new(RecordingRemoteExec::default())).await;
        let dest = tempfile::tempdir().unwrap();
        let err = usecases.fetch_results(42, dest.path()).await.unwrap_err();
        assert_eq!(err.code(), codes::NOT_FOUND);
    }
}
