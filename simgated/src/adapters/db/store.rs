// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{path::Path, str::FromStr, time::Duration};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::app::types::{
    JobKind, JobRecord, JobStatus, JobTransition, NewJob, NewSimulation, NewSimulator,
    SimulationRecord, SimulatorRecord, WorkerEvent, WorkerEventMessage,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("empty correlation id")]
    EmptyCorrelationId,
    #[error("empty definition hash")]
    EmptyDefinitionHash,
    #[error("empty experiment id")]
    EmptyExperimentId,
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const JOB_COLUMNS: &str = "id, job_type, correlation_id, external_job_id, status, scheduler_state, \
     start_time, end_time, error_message, simulation_id, simulator_id, created_at";

/// Async store for simulators, simulations, jobs and worker events.
#[derive(Clone)]
pub struct GatewayStore {
    pool: SqlitePool,
}

impl GatewayStore {
    /// Open (or create) a file-backed SQLite DB.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let url = format!("sqlite://{}", path_ref.to_string_lossy());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open an in-memory store (handy for tests).
    #[allow(dead_code)]
    pub async fn open_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        // Improve concurrency for file DBs.
        let _ = sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await;

        self.ensure_simulators_table().await?;
        self.ensure_simulations_table().await?;
        self.ensure_jobs_table().await?;
        self.ensure_worker_events_table().await?;
        Ok(())
    }

    async fn ensure_simulators_table(&self) -> Result<()> {
        // The hash index is deliberately not unique yet: the build gate does lookup-before-insert.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS simulators (
            id integer primary key autoincrement,
            definition_hash text not null,
            definition text not null,
            image_path text not null,
            created_at text not null default (strftime('%Y-%m-%dT%H:%M:%fZ','now')));
            CREATE INDEX IF NOT EXISTS idx_simulators_definition_hash ON simulators(definition_hash);
    "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_simulations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS simulations (
            id integer primary key autoincrement,
            simulator_id integer not null references simulators(id) on delete cascade,
            experiment_id text not null unique,
            archive_path text not null,
            external_job_id integer,
            created_at text not null default (strftime('%Y-%m-%dT%H:%M:%fZ','now')));
            CREATE INDEX IF NOT EXISTS idx_simulations_simulator_id ON simulations(simulator_id);
    "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_jobs_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
            id integer primary key autoincrement,
            job_type text not null check (job_type in ('simulation', 'build_container')),
            correlation_id text not null unique,
            external_job_id integer,
            status text not null check (status in ('WAITING', 'QUEUED', 'RUNNING', 'COMPLETED', 'FAILED')),
            scheduler_state text,
            start_time text,
            end_time text,
            error_message text,
            simulation_id integer references simulations(id) on delete cascade,
            simulator_id integer references simulators(id) on delete cascade,
            created_at text not null default (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            check ((simulation_id is null) <> (simulator_id is null)),
            check ((job_type = 'simulation') = (simulation_id is not null)));
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_external_job_id ON jobs(external_job_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_simulation_id ON jobs(simulation_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_simulator_id ON jobs(simulator_id);
            CREATE TRIGGER IF NOT EXISTS jobs_identity_immutable
            BEFORE UPDATE OF correlation_id, external_job_id ON jobs
            WHEN NEW.correlation_id IS NOT OLD.correlation_id
              OR (OLD.external_job_id IS NOT NULL AND NEW.external_job_id IS NOT OLD.external_job_id)
            BEGIN
              SELECT RAISE(ABORT, 'job identity is immutable');
            END;
    "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_worker_events_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS worker_events (
            id integer primary key autoincrement,
            job_id integer not null references jobs(id) on delete cascade,
            correlation_id text not null,
            sequence_number integer not null,
            sim_time real not null,
            mass text not null,
            created_at text not null default (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
            unique (job_id, sequence_number));
    "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- simulators

    pub async fn insert_simulator(&self, simulator: &NewSimulator) -> Result<SimulatorRecord> {
        if simulator.definition_hash.trim().is_empty() {
            return Err(StoreError::EmptyDefinitionHash);
        }
        let row = sqlx::query(
            r#"
        insert into simulators(definition_hash, definition, image_path)
        values (?1, ?2, ?3)
        returning id, definition_hash, definition, image_path, created_at;
    "#,
        )
        .bind(&simulator.definition_hash)
        .bind(&simulator.definition)
        .bind(&simulator.image_path)
        .fetch_one(&self.pool)
        .await?;
        row_to_simulator(row)
    }

    pub async fn get_simulator(&self, id: i64) -> Result<Option<SimulatorRecord>> {
        let row = sqlx::query(
            r#"
            select id, definition_hash, definition, image_path, created_at
            from simulators
            where id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_simulator).transpose()
    }

    /// Oldest simulator with this hash; later duplicates only come from the build race.
    pub async fn get_simulator_by_hash(&self, hash: &str) -> Result<Option<SimulatorRecord>> {
        let row = sqlx::query(
            r#"
            select id, definition_hash, definition, image_path, created_at
            from simulators
            where definition_hash = ?1
            order by id asc
            limit 1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_simulator).transpose()
    }

    /// Every registered simulator, oldest first.
    pub async fn list_simulators(&self) -> Result<Vec<SimulatorRecord>> {
        let rows = sqlx::query(
            r#"
            select id, definition_hash, definition, image_path, created_at
            from simulators
            order by id asc
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_simulator).collect()
    }

    // -- simulations

    pub async fn insert_simulation(&self, simulation: &NewSimulation) -> Result<SimulationRecord> {
        if simulation.experiment_id.trim().is_empty() {
            return Err(StoreError::EmptyExperimentId);
        }
        let row = sqlx::query(
            r#"
        insert into simulations(simulator_id, experiment_id, archive_path)
        values (?1, ?2, ?3)
        returning id, simulator_id, experiment_id, archive_path, external_job_id, created_at;
    "#,
        )
        .bind(simulation.simulator_id)
        .bind(&simulation.experiment_id)
        .bind(&simulation.archive_path)
        .fetch_one(&self.pool)
        .await?;
        row_to_simulation(row)
    }

    pub async fn get_simulation(&self, id: i64) -> Result<Option<SimulationRecord>> {
        let row = sqlx::query(
            r#"
            select id, simulator_id, experiment_id, archive_path, external_job_id, created_at
            from simulations
            where id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_simulation).transpose()
    }

    pub async fn set_simulation_external_job_id(&self, id: i64, external_job_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            update simulations
            set external_job_id = ?1
            where id = ?2 and external_job_id is null
            "#,
        )
        .bind(external_job_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- jobs

    pub async fn insert_job(&self, job: &NewJob) -> Result<JobRecord> {
        if job.correlation_id.trim().is_empty() {
            return Err(StoreError::EmptyCorrelationId);
        }
        let row = sqlx::query(&format!(
            r#"
        insert into jobs(
            job_type, correlation_id, external_job_id, status, start_time,
            simulation_id, simulator_id
        )
        values (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        returning {JOB_COLUMNS};
    "#
        ))
        .bind(job.kind.job_type().as_str())
        .bind(&job.correlation_id)
        .bind(job.external_job_id)
        .bind(job.status.as_str())
        .bind(job.start_time.as_deref())
        .bind(job.kind.simulation_id())
        .bind(job.kind.simulator_id())
        .fetch_one(&self.pool)
        .await?;
        row_to_job(row)
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!("select {JOB_COLUMNS} from jobs where id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn get_job_by_correlation_id(&self, correlation_id: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "select {JOB_COLUMNS} from jobs where correlation_id = ?1"
        ))
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn get_job_by_external_id(&self, external_job_id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "select {JOB_COLUMNS} from jobs where external_job_id = ?1 order by id desc limit 1"
        ))
        .bind(external_job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    pub async fn list_jobs_by_status(&self, statuses: &[JobStatus]) -> Result<Vec<JobRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "select {JOB_COLUMNS} from jobs where status in ({placeholders}) order by id asc"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_job).collect()
    }

    pub async fn latest_job_for_kind(&self, kind: JobKind) -> Result<Option<JobRecord>> {
        let (column, owner_id) = match kind {
            JobKind::Simulation(id) => ("simulation_id", id),
            JobKind::Build(id) => ("simulator_id", id),
        };
        let row = sqlx::query(&format!(
            "select {JOB_COLUMNS} from jobs where {column} = ?1 order by id desc limit 1"
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    /// Compare-and-set on `status`; false when another writer moved the job first.
    pub async fn apply_transition(&self, id: i64, transition: &JobTransition) -> Result<bool> {
        let result = sqlx::query(
            r#"
            update jobs
            set status = ?1,
                scheduler_state = coalesce(?2, scheduler_state),
                start_time = coalesce(?3, start_time),
                end_time = coalesce(?4, end_time),
                error_message = coalesce(?5, error_message)
            where id = ?6 and status = ?7
            "#,
        )
        .bind(transition.to.as_str())
        .bind(transition.scheduler_state.as_deref())
        .bind(transition.start_time.as_deref())
        .bind(transition.end_time.as_deref())
        .bind(transition.error_message.as_deref())
        .bind(id)
        .bind(transition.from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_job_scheduler_state(&self, id: i64, scheduler_state: &str) -> Result<()> {
        sqlx::query(
            r#"
            update jobs
            set scheduler_state = ?1
            where id = ?2
            "#,
        )
        .bind(scheduler_state)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- worker events

    /// Idempotent on (job_id, sequence_number).
    pub async fn insert_worker_event(&self, job_id: i64, event: &WorkerEventMessage) -> Result<bool> {
        let mass = serde_json::to_string(&event.mass)?;
        let result = sqlx::query(
            r#"
            insert into worker_events(job_id, correlation_id, sequence_number, sim_time, mass, created_at)
            values (?1, ?2, ?3, ?4, ?5, ?6)
            on conflict(job_id, sequence_number) do nothing
            "#,
        )
        .bind(job_id)
        .bind(&event.correlation_id)
        .bind(event.sequence_number)
        .bind(event.time)
        .bind(mass)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_worker_events(&self, job_id: i64, after_sequence: i64) -> Result<Vec<WorkerEvent>> {
        let rows = sqlx::query(
            r#"
            select id, job_id, correlation_id, sequence_number, sim_time, mass, created_at
            from worker_events
            where job_id = ?1 and sequence_number > ?2
            order by sequence_number asc
            "#,
        )
        .bind(job_id)
        .bind(after_sequence)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_worker_event).collect()
    }
}

// -- helpers

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".into())
}

fn row_to_simulator(row: SqliteRow) -> Result<SimulatorRecord> {
    Ok(SimulatorRecord {
        id: row.try_get("id")?,
        definition_hash: row.try_get("definition_hash")?,
        definition: row.try_get("definition")?,
        image_path: row.try_get("image_path")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_simulation(row: SqliteRow) -> Result<SimulationRecord> {
    Ok(SimulationRecord {
        id: row.try_get("id")?,
        simulator_id: row.try_get("simulator_id")?,
        experiment_id: row.try_get("experiment_id")?,
        archive_path: row.try_get("archive_path")?,
        external_job_id: row.try_get("external_job_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_job(row: SqliteRow) -> Result<JobRecord> {
    let id: i64 = row.try_get("id")?;
    let job_type: String = row.try_get("job_type")?;
    let simulation_id: Option<i64> = row.try_get("simulation_id")?;
    let simulator_id: Option<i64> = row.try_get("simulator_id")?;
    let kind = match (job_type.as_str(), simulation_id, simulator_id) {
        ("simulation", Some(sim), None) => JobKind::Simulation(sim),
        ("build_container", None, Some(simulator)) => JobKind::Build(simulator),
        _ => {
            return Err(StoreError::Corrupt(format!(
                "job {id} has type '{job_type}' with simulation={simulation_id:?} simulator={simulator_id:?}"
            )));
        }
    };
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<JobStatus>()
        .map_err(|err| StoreError::Corrupt(format!("job {id}: {err}")))?;
    Ok(JobRecord {
        id,
        kind,
        correlation_id: row.try_get("correlation_id")?,
        external_job_id: row.try_get("external_job_id")?,
        status,
        scheduler_state: row.try_get("scheduler_state")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_worker_event(row: SqliteRow) -> Result<WorkerEvent> {
    let mass: String = row.try_get("mass")?;
    let mass: BTreeMap<String, f64> = serde_json::from_str(&mass)?;
    Ok(WorkerEvent {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        correlation_id: row.try_get("correlation_id")?,
        sequence_number: row.try_get("sequence_number")?,
        time: row.try_get("sim_time")?,
        mass,
        created_at: row.try_get("created_at")?,
    })
}
