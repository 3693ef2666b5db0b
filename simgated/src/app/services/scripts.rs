// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use serde::Serialize;
use tera::Context;

use crate::app::errors::{AppResult, local_error};
use crate::app::services::shell::sh_escape;
use crate::app::settings::SchedulerSettings;

const SIMULATION_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --job-name={{ job_name }}
#SBATCH --time={{ time_limit }}
#SBATCH --cpus-per-task {{ cpus_per_task }}
#SBATCH --mem={{ memory }}
#SBATCH --partition={{ partition }}
{% if qos %}#SBATCH --qos={{ qos }}
{% endif %}#SBATCH --output={{ log_path }}

set -e

# --compat isolates the container the way docker would
echo "Simulation {{ job_name }} running."
singularity exec \
    --compat \
    --bind {{ experiment_dir }}:/experiment \
    {{ image_path }} \
    python3 /runtime/main.py /experiment/{{ experiment_id }}.omex
echo "Simulation run completed. data saved to {{ experiment_dir }}."
"#;

const BUILD_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --job-name={{ job_name }}
#SBATCH --time={{ time_limit }}
#SBATCH --cpus-per-task {{ cpus_per_task }}
#SBATCH --mem={{ memory }}
#SBATCH --partition={{ partition }}
{% if qos %}#SBATCH --qos={{ qos }}
{% endif %}#SBATCH --output={{ log_path }}

set -e

echo "Building simulator image {{ image_path }}."
singularity build --fakeroot {{ image_path }} {{ definition_path }}
echo "Simulator image {{ image_path }} built."
"#;

const DEFINITION_TEMPLATE: &str = r#"Bootstrap: docker
From: {{ base_image }}

%post
    set -e
{% if packages %}    python3 -m pip install --no-cache-dir{% for package in packages %} {{ package }}{% endfor %}
{% else %}    # No PyPI dependencies
{% endif %}
%runscript
    exec python3 "$@"
"#;

#[derive(Debug, Serialize)]
struct Resources<'a> {
    time_limit: &'a str,
    cpus_per_task: u32,
    memory: &'a str,
    partition: &'a str,
    qos: Option<&'a str>,
}

impl<'a> Resources<'a> {
    fn from_settings(settings: &'a SchedulerSettings) -> Self {
        Self {
            time_limit: &settings.time_limit,
            cpus_per_task: settings.cpus_per_task,
            memory: &settings.memory,
            partition: &settings.partition,
            qos: settings.qos.as_deref().filter(|qos| !qos.trim().is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
struct SimulationScript<'a> {
    job_name: &'a str,
    experiment_id: &'a str,
    experiment_dir: &'a str,
    image_path: &'a str,
    log_path: &'a str,
    #[serde(flatten)]
    resources: Resources<'a>,
}

#[derive(Debug, Serialize)]
struct BuildScript<'a> {
    job_name: &'a str,
    image_path: &'a str,
    definition_path: &'a str,
    log_path: &'a str,
    #[serde(flatten)]
    resources: Resources<'a>,
}

pub struct SimulationScriptParams<'a> {
    pub job_name: &'a str,
    pub experiment_id: &'a str,
    pub experiment_dir: &'a str,
    pub image_path: &'a str,
    pub log_path: &'a str,
}

pub struct BuildScriptParams<'a> {
    pub job_name: &'a str,
    pub image_path: &'a str,
    pub definition_path: &'a str,
    pub log_path: &'a str,
}

pub fn render_simulation_script(
    settings: &SchedulerSettings,
    params: SimulationScriptParams<'_>,
) -> AppResult<String> {
    let script = SimulationScript {
        job_name: params.job_name,
        experiment_id: params.experiment_id,
        experiment_dir: params.experiment_dir,
        image_path: params.image_path,
        log_path: params.log_path,
        resources: Resources::from_settings(settings),
    };
    render(SIMULATION_TEMPLATE, &script)
}

pub fn render_build_script(
    settings: &SchedulerSettings,
    params: BuildScriptParams<'_>,
) -> AppResult<String> {
    let script = BuildScript {
        job_name: params.job_name,
        image_path: params.image_path,
        definition_path: params.definition_path,
        log_path: params.log_path,
        resources: Resources::from_settings(settings),
    };
    render(BUILD_TEMPLATE, &script)
}

#[derive(Debug, Serialize)]
struct Definition<'a> {
    base_image: &'a str,
    packages: Vec<String>,
}

/// Singularity definition installing `packages` (already validated) on top of `base_image`.
pub fn render_definition<'a, I>(base_image: &str, packages: I) -> AppResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let definition = Definition {
        base_image,
        packages: packages.into_iter().map(sh_escape).collect(),
    };
    render(DEFINITION_TEMPLATE, &definition)
}

fn render<T: Serialize>(template: &str, values: &T) -> AppResult<String> {
    let context = Context::from_serialize(values)
        .map_err(|err| local_error(format!("failed to build script context: {err}")))?;
    tera::Tera::one_off(template, &context, false)
        .map_err(|err| local_error(format!("script render failed: {err}")))
}
