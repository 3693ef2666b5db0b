// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod clock;
pub mod container_spec;
pub mod event_bus;
pub mod job_store;
pub mod remote_exec;
pub mod scheduler;
pub mod simulation_store;
pub mod simulator_store;
pub mod telemetry;
pub mod worker_event_store;

pub use clock::ClockPort;
pub use container_spec::ContainerSpecPort;
pub use event_bus::{BusSubscription, EventBusPort};
pub use job_store::JobStorePort;
pub use remote_exec::{ExecCapture, RemoteExecPort, run_command};
pub use scheduler::{FileUpload, SchedulerPort, SubmitRequest};
pub use simulation_store::SimulationStorePort;
pub use simulator_store::SimulatorStorePort;
#[allow(unused_imports)]
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
pub use worker_event_store::WorkerEventStorePort;
