// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            simulation_id,
            simulator_id,
            job_id,
            external_job_id,
            correlation_id,
            experiment_id,
        } = fields;

        tracing::info!(
            target: "simgated::telemetry",
            event = name,
            simulation_id = simulation_id,
            simulator_id = simulator_id,
            job_id = job_id,
            external_job_id = external_job_id,
            correlation_id = correlation_id.as_deref(),
            experiment_id = experiment_id.as_deref(),
        );
    }
}
