// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Job monitor: reconciles worker events from the bus and scheduler polls
//! into the job table, and wakes in-process waiters.

pub mod reducer;
pub mod waiters;

use std::collections::HashMap;
use std::sync::Arc;

use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::errors::{
    AppError, AppErrorKind, AppResult, codes, invalid_argument, not_found,
};
use crate::app::ports::{
    BusSubscription, ClockPort, EventBusPort, JobStorePort, SchedulerPort, WorkerEventStorePort,
};
use crate::app::services::identity;
use crate::app::settings::MonitorSettings;
use crate::app::types::{JobRecord, JobState, JobStatus, WorkerEventMessage};

use reducer::{Decision, JobSnapshot, Observation, ObservationSource, reduce};
pub use waiters::JobSubscription;
use waiters::WaiterRegistry;

/// Lost compare-and-set races tolerated before an observation is dropped.
const MAX_APPLY_ATTEMPTS: usize = 3;

struct RunningTasks {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

pub struct JobMonitor {
    jobs: Arc<dyn JobStorePort>,
    events: Arc<dyn WorkerEventStorePort>,
    scheduler: Arc<dyn SchedulerPort>,
    bus: Arc<dyn EventBusPort>,
    clock: Arc<dyn ClockPort>,
    settings: MonitorSettings,
    waiters: WaiterRegistry,
    running: Mutex<Option<RunningTasks>>,
}

impl JobMonitor {
    pub fn new(
        jobs: Arc<dyn JobStorePort>,
        events: Arc<dyn WorkerEventStorePort>,
        scheduler: Arc<dyn SchedulerPort>,
        bus: Arc<dyn EventBusPort>,
        clock: Arc<dyn ClockPort>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            jobs,
            events,
            scheduler,
            bus,
            clock,
            settings,
            waiters: WaiterRegistry::default(),
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Subscribes to worker events and spawns the bus and poll tasks.
    pub async fn start(self: &Arc<Self>) -> AppResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(AppError::with_message(
                AppErrorKind::Conflict,
                codes::CONFLICT,
                "job monitor is already running",
            ));
        }
        let subscription = self
            .bus
            .subscribe(&self.settings.worker_event_subject)
            .await?;
        let (stop_tx, stop_rx) = watch::channel(false);

        let bus_task = tokio::spawn(Arc::clone(self).run_bus(subscription, stop_rx.clone()));
        let poll_task = tokio::spawn(Arc::clone(self).run_poll(stop_rx));
        *running = Some(RunningTasks {
            stop_tx,
            handles: vec![bus_task, poll_task],
        });
        tracing::info!(
            subject = %self.settings.worker_event_subject,
            interval_secs = self.settings.poll_interval.as_secs(),
            "job monitor started"
        );
        Ok(())
    }

    /// Signals both tasks and waits for them to finish. No-op when not running.
    pub async fn stop(&self) {
        let Some(tasks) = self.running.lock().await.take() else {
            return;
        };
        let _ = tasks.stop_tx.send(true);
        for handle in tasks.handles {
            if let Err(err) = handle.await {
                tracing::warn!("job monitor task ended abnormally: {err}");
            }
        }
        tracing::info!("job monitor stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn run_bus(self: Arc<Self>, mut subscription: BusSubscription, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                payload = subscription.next() => {
                    let Some(payload) = payload else {
                        tracing::warn!(subject = %subscription.subject(), "event bus closed");
                        break;
                    };
                    if let Err(err) = self.handle_worker_message(&payload).await {
                        tracing::warn!(code = err.code(), "dropping worker event: {err}");
                    }
                }
            }
        }
    }

    async fn run_poll(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::warn!(code = err.code(), "job poll failed: {err}");
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns how many jobs changed status.
    pub async fn poll_once(&self) -> AppResult<usize> {
        let jobs = self.jobs.list_jobs_by_status(&JobStatus::NON_TERMINAL).await?;
        let tracked: HashMap<i64, JobRecord> = jobs
            .into_iter()
            .filter_map(|job| job.external_job_id.map(|ext| (ext, job)))
            .collect();
        if tracked.is_empty() {
            return Ok(0);
        }
        let mut ids: Vec<i64> = tracked.keys().copied().collect();
        ids.sort_unstable();

        let states = match self.scheduler.get_job_status(&ids).await {
            Ok(states) => states,
            Err(err) => {
                tracing::warn!(
                    count = ids.len(),
                    code = err.code(),
                    "batch status query failed, retrying per job: {err}"
                );
                self.query_individually(&ids).await
            }
        };

        let mut updated = 0;
        for state in states {
            let Some(job) = tracked.get(&state.job_id) else {
                continue;
            };
            match self.apply_scheduler_state(job, &state).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(job_id = job.id, external_job_id = state.job_id, "failed to apply scheduler state: {err}");
                }
            }
        }
        Ok(updated)
    }

    async fn query_individually(&self, ids: &[i64]) -> Vec<JobState> {
        let mut states = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.scheduler.get_job_status(&[id]).await {
                Ok(found) => states.extend(found),
                Err(err) => {
                    // left for the next tick
                    tracing::warn!(external_job_id = id, code = err.code(), "status query failed: {err}");
                }
            }
        }
        states
    }

    async fn apply_scheduler_state(&self, job: &JobRecord, state: &JobState) -> AppResult<bool> {
        let raw_state = state.normalized_state();
        if job.scheduler_state.as_deref() != Some(raw_state.as_str()) {
            self.jobs.record_scheduler_state(job.id, &raw_state).await?;
        }
        let Some(status) = state.status() else {
            tracing::debug!(job_id = job.id, state = %state.job_state, "unmapped scheduler state");
            return Ok(false);
        };
        let error_message = (status == JobStatus::Failed).then(|| match state.exit_code {
            Some(code) => format!("scheduler reported {raw_state} (exit code {code})"),
            None => format!("scheduler reported {raw_state}"),
        });
        let observation = Observation {
            status,
            source: ObservationSource::Poll,
            observed_at: state.end_time.clone().unwrap_or_else(|| self.now_rfc3339()),
            scheduler_state: Some(raw_state),
            start_time: state.start_time.clone(),
            error_message,
        };
        Ok(self.apply_observation(job.clone(), &observation).await?.is_some())
    }

    /// Decodes and records one bus payload. Unknown correlation ids are dropped.
    pub async fn handle_worker_message(&self, payload: &[u8]) -> AppResult<()> {
        let message: WorkerEventMessage = serde_json::from_slice(payload)
            .map_err(|err| invalid_argument(format!("malformed worker event: {err}")))?;
        if identity::parse_correlation_id(&message.correlation_id).is_none() {
            tracing::warn!(correlation_id = %message.correlation_id, "worker event with unrecognized correlation id");
            return Ok(());
        }
        let Some(job) = self
            .jobs
            .get_job_by_correlation_id(&message.correlation_id)
            .await?
        else {
            tracing::warn!(correlation_id = %message.correlation_id, "worker event for untracked job");
            return Ok(());
        };

        let inserted = self.events.insert_worker_event(job.id, &message).await?;
        if !inserted {
            tracing::debug!(
                job_id = job.id,
                sequence_number = message.sequence_number,
                "duplicate worker event"
            );
        }

        let observation = Observation {
            status: message.status.unwrap_or(JobStatus::Running),
            source: ObservationSource::Bus,
            observed_at: self.now_rfc3339(),
            scheduler_state: None,
            start_time: None,
            error_message: message.error_message.clone(),
        };
        self.apply_observation(job, &observation).await?;
        Ok(())
    }

    /// Runs the reducer against the stored row and persists with compare-and-set.
    async fn apply_observation(
        &self,
        mut job: JobRecord,
        observation: &Observation,
    ) -> AppResult<Option<JobRecord>> {
        for _ in 0..MAX_APPLY_ATTEMPTS {
            let transition = match reduce(&JobSnapshot::from(&job), observation) {
                Decision::Apply(transition) => transition,
                Decision::Ignore(reason) => {
                    tracing::trace!(job_id = job.id, current = %job.status, observed = %observation.status, ?reason, "observation ignored");
                    return Ok(None);
                }
            };
            if self.jobs.apply_transition(job.id, &transition).await? {
                tracing::info!(
                    job_id = job.id,
                    correlation_id = %job.correlation_id,
                    from = %transition.from,
                    to = %transition.to,
                    source = observation.source.as_str(),
                    "job status changed"
                );
                let updated = self
                    .jobs
                    .get_job(job.id)
                    .await?
                    .ok_or_else(|| not_found(format!("job {} disappeared", job.id)))?;
                if let Some(ext) = updated.external_job_id {
                    self.waiters.notify(ext, updated.status).await;
                }
                return Ok(Some(updated));
            }
            job = self
                .jobs
                .get_job(job.id)
                .await?
                .ok_or_else(|| not_found(format!("job {} disappeared", job.id)))?;
        }
        tracing::warn!(job_id = job.id, observed = %observation.status, "gave up applying observation after repeated races");
        Ok(None)
    }

    /// Registers a waiter. Must happen before the job can produce updates.
    pub async fn subscribe(&self, external_job_id: i64) -> JobSubscription {
        self.waiters.subscribe(external_job_id).await
    }

    pub async fn unsubscribe(&self, subscription: &JobSubscription) {
        self.waiters.unsubscribe(subscription).await;
    }

    pub async fn waiter_count(&self) -> usize {
        self.waiters.len().await
    }

    /// Blocks this task until the job is terminal. COMPLETED returns the row,
    /// FAILED returns an error carrying its message. Always unsubscribes.
    pub async fn wait_for_completion(&self, mut subscription: JobSubscription) -> AppResult<JobRecord> {
        let result = self
            .wait_loop(&mut subscription, Some(self.settings.max_wait_iterations))
            .await;
        self.waiters.unsubscribe(&subscription).await;
        result
    }

    /// Like [`wait_for_completion`](Self::wait_for_completion) without the
    /// iteration bound. Simulations may run far longer than a container build.
    pub async fn wait_until_terminal(&self, mut subscription: JobSubscription) -> AppResult<JobRecord> {
        let result = self.wait_loop(&mut subscription, None).await;
        self.waiters.unsubscribe(&subscription).await;
        result
    }

    async fn wait_loop(
        &self,
        subscription: &mut JobSubscription,
        max_iterations: Option<u32>,
    ) -> AppResult<JobRecord> {
        let external_job_id = subscription.external_job_id();
        let mut iteration: u32 = 0;
        while max_iterations.is_none_or(|max| iteration < max) {
            iteration = iteration.saturating_add(1);
            match tokio::time::timeout(self.settings.wait_timeout, subscription.recv()).await {
                Ok(Some(status)) if !status.is_terminal() => {
                    tracing::debug!(external_job_id, %status, iteration, "waiter update");
                    continue;
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::debug!(external_job_id, "waiter queue closed, reading database");
                    if iteration > 1 {
                        tokio::time::sleep(self.settings.wait_timeout).await;
                    }
                }
                Err(_) => {
                    tracing::debug!(external_job_id, iteration, "waiter timed out, reading database");
                }
            }
            if let Some(job) = self.jobs.get_job_by_external_id(external_job_id).await? {
                match job.status {
                    JobStatus::Completed => return Ok(job),
                    JobStatus::Failed => {
                        let message = job
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "job failed".to_string());
                        return Err(AppError::with_message(
                            AppErrorKind::Internal,
                            codes::JOB_FAILED,
                            message,
                        )
                        .with_context(format!("job {}", job.correlation_id)));
                    }
                    _ => {}
                }
            }
        }
        tracing::error!(
            external_job_id,
            iterations = iteration,
            "job did not finish within the wait bound"
        );
        Err(AppError::with_message(
            AppErrorKind::Internal,
            codes::WAIT_BOUND_EXCEEDED,
            format!("job {external_job_id} did not reach a terminal state after {iteration} waits"),
        ))
    }

    fn now_rfc3339(&self) -> String {
        let now = self.clock.now_utc();
        now.format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::{
        ScriptedScheduler, fast_monitor_settings, job_state, memory_stores,
    };
    use crate::app::types::{JobKind, NewJob, NewSimulation, NewSimulator};
    use crate::adapters::bus::LocalEventBus;
    use crate::adapters::db::SqliteStoreAdapter;
    use crate::adapters::time::SystemClock;
    use crate::app::ports::{SimulationStorePort, SimulatorStorePort};
    use std::time::Duration;

    struct Harness {
        store: Arc<SqliteStoreAdapter>,
        scheduler: Arc<ScriptedScheduler>,
        bus: Arc<LocalEventBus>,
        monitor: Arc<JobMonitor>,
    }

    async fn harness(settings: MonitorSettings) -> Harness {
        let store = memory_stores().await;
        let scheduler = Arc::new(ScriptedScheduler::default());
        let bus = Arc::new(LocalEventBus::default());
        let monitor = Arc::new(JobMonitor::new(
            store.clone(),
            store.clone(),
            scheduler.clone(),
            bus.clone(),
            Arc::new(SystemClock),
            settings,
        ));
        Harness {
            store,
            scheduler,
            bus,
            monitor,
        }
    }

    async fn simulation_job(h: &Harness, cid: &str, ext: i64, status: JobStatus) -> JobRecord {
        let simulator = h
            .store
            .insert_simulator(&NewSimulator {
                definition_hash: format!("hash-{cid}"),
                definition: "Bootstrap: docker".into(),
                image_path: "/img".into(),
            })
            .await
            .unwrap();
        let simulation = h
            .store
            .insert_simulation(&NewSimulation {
                simulator_id: simulator.id,
                experiment_id: format!("exp-{cid}"),
                archive_path: "/a.omex".into(),
            })
            .await
            .unwrap();
        h.store
            .insert_job(&NewJob {
                kind: JobKind::Simulation(simulation.id),
                correlation_id: cid.into(),
                external_job_id: Some(ext),
                status,
                start_time: None,
            })
            .await
            .unwrap()
    }

    fn progress(cid: &str, seq: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "correlation_id": cid,
            "sequence_number": seq,
            "time": seq as f64 * 0.5,
            "mass": {"S1": 1.5, "S2": 0.25},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn bus_progress_moves_job_to_running_and_stores_event() {
        let h = harness(fast_monitor_settings()).await;
        let job = simulation_job(&h, "simulation-aaaa11112222", 100, JobStatus::Queued).await;

        h.monitor
            .handle_worker_message(&progress("simulation-aaaa11112222", 1))
            .await
            .unwrap();

        let stored = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        let events = h.store.list_worker_events(job.id, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mass.get("S1"), Some(&1.5));
    }

    #[tokio::test]
    async fn concurrent_bus_and_poll_keep_running_without_duplicates() {
        let h = harness(fast_monitor_settings()).await;
        let cid = "simulation-bbbb11112222";
        let job = simulation_job(&h, cid, 200, JobStatus::Running).await;
        h.scheduler.set_state(job_state(200, "RUNNING"));

        let bus = {
            let monitor = h.monitor.clone();
            tokio::spawn(async move {
                monitor.handle_worker_message(&progress(cid, 5)).await?;
                monitor.handle_worker_message(&progress(cid, 5)).await
            })
        };
        let poll = {
            let monitor = h.monitor.clone();
            tokio::spawn(async move { monitor.poll_once().await })
        };
        bus.await.unwrap().unwrap();
        assert_eq!(poll.await.unwrap().unwrap(), 0);

        let stored = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.scheduler_state.as_deref(), Some("RUNNING"));
        let events = h.store.list_worker_events(job.id, 4).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, 5);
    }

    #[tokio::test]
    async fn poll_records_scheduler_start_time() {
        let h = harness(fast_monitor_settings()).await;
        let simulator = h
            .store
            .insert_simulator(&NewSimulator {
                definition_hash: "hash-start".into(),
                definition: "Bootstrap: docker".into(),
                image_path: "/img".into(),
            })
            .await
            .unwrap();
        let job = h
            .store
            .insert_job(&NewJob {
                kind: JobKind::Build(simulator.id),
                correlation_id: "build_container-ssss11112222".into(),
                external_job_id: Some(250),
                status: JobStatus::Queued,
                start_time: Some("2026-01-01T09:00:00Z".into()),
            })
            .await
            .unwrap();
        h.scheduler.set_state(JobState {
            start_time: Some("2026-01-01T10:00:00".into()),
            ..job_state(250, "RUNNING")
        });

        assert_eq!(h.monitor.poll_once().await.unwrap(), 1);

        let stored = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.start_time.as_deref(), Some("2026-01-01T10:00:00"));
    }

    #[tokio::test]
    async fn unknown_correlation_ids_are_dropped() {
        let h = harness(fast_monitor_settings()).await;
        h.monitor
            .handle_worker_message(&progress("simulation-doesnotexist", 1))
            .await
            .unwrap();
        h.monitor
            .handle_worker_message(&progress("garbage_id_format", 1))
            .await
            .unwrap();
        assert!(h
            .store
            .get_job_by_correlation_id("simulation-doesnotexist")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let h = harness(fast_monitor_settings()).await;
        let err = h.monitor.handle_worker_message(b"not json").await.unwrap_err();
        assert_eq!(err.code(), codes::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn poll_marks_failed_jobs_with_scheduler_message() {
        let h = harness(fast_monitor_settings()).await;
        let job = simulation_job(&h, "simulation-cccc11112222", 300, JobStatus::Running).await;
        let mut state = job_state(300, "TIMEOUT");
        state.exit_code = Some(0);
        state.end_time = Some("2026-01-01T12:00:00".into());
        h.scheduler.set_state(state);

        assert_eq!(h.monitor.poll_once().await.unwrap(), 1);
        let stored = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.end_time.as_deref(), Some("2026-01-01T12:00:00"));
        assert_eq!(
            stored.error_message.as_deref(),
            Some("scheduler reported TIMEOUT (exit code 0)")
        );
    }

    #[tokio::test]
    async fn poll_ignores_backward_scheduler_snapshots() {
        let h = harness(fast_monitor_settings()).await;
        let job = simulation_job(&h, "simulation-dddd11112222", 400, JobStatus::Running).await;
        h.scheduler.set_state(job_state(400, "PENDING"));

        assert_eq!(h.monitor.poll_once().await.unwrap(), 0);
        let stored = h.store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.scheduler_state.as_deref(), Some("PENDING"));
    }

    #[tokio::test]
    async fn poll_tolerates_partial_scheduler_failures() {
        let h = harness(fast_monitor_settings()).await;
        let ok = simulation_job(&h, "simulation-eeee11112222", 501, JobStatus::Queued).await;
        let broken = simulation_job(&h, "simulation-ffff11112222", 502, JobStatus::Queued).await;
        h.scheduler.set_state(job_state(501, "COMPLETED"));
        h.scheduler.set_state(job_state(502, "COMPLETED"));
        h.scheduler.fail_batches(true);
        h.scheduler.fail_id(502);

        assert_eq!(h.monitor.poll_once().await.unwrap(), 1);
        assert_eq!(
            h.store.get_job(ok.id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
        assert_eq!(
            h.store.get_job(broken.id).await.unwrap().unwrap().status,
            JobStatus::Queued
        );
        let calls = h.scheduler.status_calls();
        assert_eq!(calls, vec![vec![501, 502], vec![501], vec![502]]);
    }

    #[tokio::test]
    async fn poll_skips_terminal_jobs_and_jobs_without_external_id() {
        let h = harness(fast_monitor_settings()).await;
        simulation_job(&h, "simulation-gggg11112222", 600, JobStatus::Completed).await;
        assert_eq!(h.monitor.poll_once().await.unwrap(), 0);
        assert!(h.scheduler.status_calls().is_empty());
    }

    #[tokio::test]
    async fn waiter_wakes_on_completion_and_unsubscribes() {
        let h = harness(fast_monitor_settings()).await;
        let sub = h.monitor.subscribe(700).await;
        let job = simulation_job(&h, "simulation-hhhh11112222", 700, JobStatus::Queued).await;
        assert_eq!(h.monitor.waiter_count().await, 1);

        let waiter = {
            let monitor = h.monitor.clone();
            tokio::spawn(async move { monitor.wait_for_completion(sub).await })
        };
        h.scheduler.set_state(job_state(700, "COMPLETED"));
        h.monitor.poll_once().await.unwrap();

        let done = waiter.await.unwrap().unwrap();
        assert_eq!(done.id, job.id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(h.monitor.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn waiter_falls_back_to_database_when_updates_are_missed() {
        let h = harness(fast_monitor_settings()).await;
        let sub = h.monitor.subscribe(800).await;
        let job = simulation_job(&h, "simulation-iiii11112222", 800, JobStatus::Running).await;
        // status changes without passing through the monitor
        h.store
            .apply_transition(
                job.id,
                &crate::app::types::JobTransition {
                    from: JobStatus::Running,
                    to: JobStatus::Completed,
                    scheduler_state: None,
                    start_time: None,
                    end_time: None,
                    error_message: None,
                },
            )
            .await
            .unwrap();

        let done = h.monitor.wait_for_completion(sub).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(h.monitor.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn waiter_surfaces_failure_message() {
        let h = harness(fast_monitor_settings()).await;
        let sub = h.monitor.subscribe(900).await;
        simulation_job(&h, "simulation-jjjj11112222", 900, JobStatus::Running).await;
        h.scheduler.set_state(job_state(900, "OUT_OF_MEMORY"));
        h.monitor.poll_once().await.unwrap();

        let err = h.monitor.wait_for_completion(sub).await.unwrap_err();
        assert_eq!(err.code(), codes::JOB_FAILED);
        assert!(err.message().contains("OUT_OF_MEMORY"));
        assert_eq!(h.monitor.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn waiter_gives_up_after_the_wait_bound() {
        let settings = MonitorSettings {
            wait_timeout: Duration::from_millis(5),
            max_wait_iterations: 3,
            ..fast_monitor_settings()
        };
        let h = harness(settings).await;
        let sub = h.monitor.subscribe(1000).await;
        simulation_job(&h, "simulation-kkkk11112222", 1000, JobStatus::Running).await;

        let err = h.monitor.wait_for_completion(sub).await.unwrap_err();
        assert_eq!(err.code(), codes::WAIT_BOUND_EXCEEDED);
        assert_eq!(err.kind(), AppErrorKind::Internal);
        assert_eq!(h.monitor.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn unbounded_waiter_outlasts_the_wait_bound() {
        let settings = MonitorSettings {
            wait_timeout: Duration::from_millis(5),
            max_wait_iterations: 2,
            ..fast_monitor_settings()
        };
        let h = harness(settings).await;
        let sub = h.monitor.subscribe(1050).await;
        let job = simulation_job(&h, "simulation-kkkk33334444", 1050, JobStatus::Running).await;
        let job_id = job.id;

        let finisher = {
            let store = h.store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                store
                    .apply_transition(
                        job_id,
                        &crate::app::types::JobTransition {
                            from: JobStatus::Running,
                            to: JobStatus::Completed,
                            scheduler_state: Some("COMPLETED".into()),
                            start_time: None,
                            end_time: None,
                            error_message: None,
                        },
                    )
                    .await
                    .unwrap();
            })
        };

        let done = h.monitor.wait_until_terminal(sub).await.unwrap();
        finisher.await.unwrap();
        assert_eq!(done.id, job_id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(h.monitor.waiter_count().await, 0);
    }

    #[tokio::test]
    async fn start_runs_both_inputs_and_stop_drains() {
        let h = harness(fast_monitor_settings()).await;
        let cid = "simulation-llll11112222";
        let job = simulation_job(&h, cid, 1100, JobStatus::Queued).await;
        h.scheduler.set_state(job_state(1100, "COMPLETED"));
        let sub = h.monitor.subscribe(1100).await;

        h.monitor.start().await.unwrap();
        let err = h.monitor.start().await.unwrap_err();
        assert_eq!(err.code(), codes::CONFLICT);

        h.bus
            .publish(&h.monitor.settings().worker_event_subject, progress(cid, 1))
            .await
            .unwrap();
        let done = h.monitor.wait_for_completion(sub).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);

        h.monitor.stop().await;
        assert!(!h.monitor.is_running().await);
        h.monitor.stop().await;

        // the progress event may land before or after completion; either way it is stored once
        let events = h.store.list_worker_events(job.id, 0).await.unwrap();
        assert!(events.len() <= 1);
        assert!(h.scheduler.status_calls().iter().all(|ids| ids == &vec![1100]));
    }
}
