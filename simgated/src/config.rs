// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::adapters::container::DEFAULT_BASE_IMAGE;
use crate::app::settings::{MonitorSettings, SchedulerSettings};
use crate::app::types::AllowList;

const APP_DIR_NAME: &str = "simgate";
const CONFIG_FILE_NAME: &str = "simgate.toml";
const CONFIG_ENV_VAR: &str = "SIMGATE_CONFIG_PATH";
const DATABASE_FILE_NAME: &str = "simgate.sqlite";
const DEFAULT_JOB_CHECK_INTERVAL_SECS: u64 = 5;
const DEFAULT_EVENT_ADDR: &str = "127.0.0.1:50056";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_path: Option<String>,
    job_check_interval_secs: Option<u64>,
    event_addr: Option<String>,
    verbose: Option<bool>,
    #[serde(default)]
    ssh: SshSection,
    #[serde(default)]
    slurm: SlurmSection,
    #[serde(default)]
    dispatch: DispatchSection,
    #[serde(default)]
    bus: BusSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub identity_path: Option<String>,
    pub known_hosts_path: Option<String>,
    pub keepalive_secs: u64,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            identity_path: None,
            known_hosts_path: None,
            keepalive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlurmSection {
    pub partition: String,
    pub qos: Option<String>,
    pub time_limit: String,
    pub cpus_per_task: u32,
    pub memory: String,
    pub sim_base_path: String,
    pub image_base_path: String,
    pub sbatch_base_path: String,
    pub log_base_path: String,
}

impl Default for SlurmSection {
    fn default() -> Self {
        let settings = SchedulerSettings::default();
        Self {
            partition: settings.partition,
            qos: settings.qos,
            time_limit: settings.time_limit,
            cpus_per_task: settings.cpus_per_task,
            memory: settings.memory,
            sim_base_path: settings.sim_base_path,
            image_base_path: settings.image_base_path,
            sbatch_base_path: settings.sbatch_base_path,
            log_base_path: settings.log_base_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    pub wait_timeout_secs: u64,
    pub max_wait_iterations: u32,
    pub allow_list: Vec<String>,
    pub base_image: String,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 60,
            max_wait_iterations: 30,
            allow_list: Vec::new(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusSection {
    pub worker_event_subject: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            worker_event_subject: MonitorSettings::default().worker_event_subject,
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub database_path: PathBuf,
    pub job_check_interval_secs: u64,
    pub event_addr: SocketAddr,
    pub verbose: bool,
    #[allow(dead_code)]
    pub config_path: Option<PathBuf>,
    pub ssh: SshSection,
    pub slurm: SlurmSection,
    pub dispatch: DispatchSection,
    pub bus: BusSection,
}

impl Config {
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let slurm = self.slurm.clone();
        SchedulerSettings {
            partition: slurm.partition,
            qos: slurm.qos,
            time_limit: slurm.time_limit,
            cpus_per_task: slurm.cpus_per_task,
            memory: slurm.memory,
            sim_base_path: slurm.sim_base_path,
            image_base_path: slurm.image_base_path,
            sbatch_base_path: slurm.sbatch_base_path,
            log_base_path: slurm.log_base_path,
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_secs(self.job_check_interval_secs),
            worker_event_subject: self.bus.worker_event_subject.clone(),
            wait_timeout: Duration::from_secs(self.dispatch.wait_timeout_secs),
            max_wait_iterations: self.dispatch.max_wait_iterations,
        }
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(&self.dispatch.allow_list)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub database_path: ConfigValue<PathBuf>,
    pub job_check_interval_secs: ConfigValue<u64>,
    pub event_addr: ConfigValue<SocketAddr>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub job_check_interval_secs: Option<u64>,
    pub event_addr: Option<SocketAddr>,
    pub verbose: Option<bool>,
}

#[allow(dead_code)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

/// Picks the first value present, in precedence order.
fn pick<T>(override_value: Option<T>, file_value: Option<T>, default: T) -> (T, ConfigSource) {
    match (override_value, file_value) {
        (Some(value), _) => (value, ConfigSource::Override),
        (None, Some(value)) => (value, ConfigSource::ConfigFile),
        (None, None) => (default, ConfigSource::Default),
    }
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(|path| path.parent());

    let (database_path, database_source) = match overrides.database_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.database_path.as_deref() {
            Some(raw) => (resolve_path(raw, base_dir), ConfigSource::ConfigFile),
            None => (
                default_database_path().with_context(|| {
                    "failed to resolve default database path; specify --database-path or set database_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let file_event_addr = file_config
        .event_addr
        .as_deref()
        .map(|raw| {
            raw.trim()
                .parse::<SocketAddr>()
                .with_context(|| format!("invalid event_addr '{raw}'"))
        })
        .transpose()?;
    let default_event_addr: SocketAddr = DEFAULT_EVENT_ADDR
        .parse()
        .context("invalid built-in event address")?;
    let (event_addr, event_addr_source) =
        pick(overrides.event_addr, file_event_addr, default_event_addr);

    let (verbose, verbose_source) = pick(overrides.verbose, file_config.verbose, false);
    let (job_check_interval_secs, job_check_interval_source) = pick(
        overrides.job_check_interval_secs,
        file_config.job_check_interval_secs,
        DEFAULT_JOB_CHECK_INTERVAL_SECS,
    );
    if job_check_interval_secs == 0 {
        anyhow::bail!("job_check_interval_secs must be at least 1");
    }

    let dispatch = file_config.dispatch;
    if dispatch.wait_timeout_secs == 0 {
        anyhow::bail!("dispatch.wait_timeout_secs must be at least 1");
    }
    if dispatch.max_wait_iterations == 0 {
        anyhow::bail!("dispatch.max_wait_iterations must be at least 1");
    }

    let mut ssh = file_config.ssh;
    ssh.identity_path = ssh
        .identity_path
        .as_deref()
        .map(|raw| resolve_path(raw, base_dir).to_string_lossy().into_owned());
    ssh.known_hosts_path = ssh
        .known_hosts_path
        .as_deref()
        .map(|raw| resolve_path(raw, base_dir).to_string_lossy().into_owned());

    let config = Config {
        database_path,
        job_check_interval_secs,
        event_addr,
        verbose,
        config_path: config_path.clone(),
        ssh,
        slurm: file_config.slurm,
        dispatch,
        bus: file_config.bus,
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        database_path: ConfigValue {
            value: config.database_path.clone(),
            source: database_source,
        },
        job_check_interval_secs: ConfigValue {
            value: config.job_check_interval_secs,
            source: job_check_interval_source,
        },
        event_addr: ConfigValue {
            value: config.event_addr,
            source: event_addr_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
    };

    Ok(LoadResult { config, report })
}

pub fn ensure_database_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_database_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME).join(DATABASE_FILE_NAME))
}
