// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use crate::app::build_gate::BuildGate;
use crate::app::dispatch::Dispatcher;
use crate::app::monitor::JobMonitor;
use crate::app::ports::{
    ClockPort, ContainerSpecPort, EventBusPort, JobStorePort, RemoteExecPort, SchedulerPort,
    SimulationStorePort, SimulatorStorePort, TelemetryPort, WorkerEventStorePort,
};
use crate::app::services::layout::RemoteLayout;
use crate::app::settings::{MonitorSettings, SchedulerSettings};
use crate::app::types::{AllowList, SshConfig};

/// Collaborators handed to [`AppContext::build`].
pub struct ContextParts {
    pub jobs: Arc<dyn JobStorePort>,
    pub simulators: Arc<dyn SimulatorStorePort>,
    pub simulations: Arc<dyn SimulationStorePort>,
    pub worker_events: Arc<dyn WorkerEventStorePort>,
    pub remote: Arc<dyn RemoteExecPort>,
    pub scheduler: Arc<dyn SchedulerPort>,
    pub bus: Arc<dyn EventBusPort>,
    pub specs: Arc<dyn ContainerSpecPort>,
    pub clock: Arc<dyn ClockPort>,
    pub telemetry: Arc<dyn TelemetryPort>,
    pub ssh: SshConfig,
    pub scheduler_settings: SchedulerSettings,
    pub monitor_settings: MonitorSettings,
    pub allow_list: AllowList,
}

/// Process-wide services, built once at startup and passed down explicitly.
pub struct AppContext {
    pub jobs: Arc<dyn JobStorePort>,
    pub simulators: Arc<dyn SimulatorStorePort>,
    pub simulations: Arc<dyn SimulationStorePort>,
    pub worker_events: Arc<dyn WorkerEventStorePort>,
    pub remote: Arc<dyn RemoteExecPort>,
    pub bus: Arc<dyn EventBusPort>,
    pub monitor: Arc<JobMonitor>,
    pub dispatcher: Arc<Dispatcher>,
    pub ssh: SshConfig,
    pub layout: RemoteLayout,
}

impl AppContext {
    pub fn build(parts: ContextParts) -> Self {
        let monitor = Arc::new(JobMonitor::new(
            parts.jobs.clone(),
            parts.worker_events.clone(),
            parts.scheduler.clone(),
            parts.bus.clone(),
            parts.clock.clone(),
            parts.monitor_settings,
        ));
        let gate = BuildGate::new(
            parts.simulators.clone(),
            parts.jobs.clone(),
            parts.scheduler.clone(),
            monitor.clone(),
            parts.clock.clone(),
            parts.telemetry.clone(),
            parts.scheduler_settings.clone(),
        );
        let layout = RemoteLayout::new(&parts.scheduler_settings);
        let dispatcher = Arc::new(Dispatcher::new(
            parts.specs,
            parts.allow_list,
            gate,
            parts.simulations.clone(),
            parts.jobs.clone(),
            parts.scheduler,
            monitor.clone(),
            parts.clock,
            parts.telemetry,
            parts.scheduler_settings,
        ));
        Self {
            jobs: parts.jobs,
            simulators: parts.simulators,
            simulations: parts.simulations,
            worker_events: parts.worker_events,
            remote: parts.remote,
            bus: parts.bus,
            monitor,
            dispatcher,
            ssh: parts.ssh,
            layout,
        }
    }
}
