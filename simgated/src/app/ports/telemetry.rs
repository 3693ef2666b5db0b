// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

#[derive(Clone, Debug, Default)]
pub struct TelemetryEvent {
    pub simulation_id: Option<i64>,
    pub simulator_id: Option<i64>,
    pub job_id: Option<i64>,
    pub external_job_id: Option<i64>,
    pub correlation_id: Option<String>,
    pub experiment_id: Option<String>,
}

pub trait TelemetryPort: Send + Sync {
    fn event(&self, name: &'static str, fields: TelemetryEvent);
}

// Dummy telemetry port for tests.
#[derive(Clone, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn event(&self, _name: &'static str, _fields: TelemetryEvent) {}
}
