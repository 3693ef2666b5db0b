// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgGroup, Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::types::JobRef;

#[derive(Debug, Parser)]
#[command(
    name = "simgated",
    version,
    about = "Simulation gateway: builds simulator containers and runs simulations on a Slurm cluster.",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < SIMGATE_CONFIG_PATH < command-line flags.\n\
If --config is omitted, simgated tries SIMGATE_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, simgated uses SIMGATE_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the SQLite database file. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        help = "How often to poll the scheduler for job states. Overrides `job_check_interval_secs` from the config file."
    )]
    pub job_check_interval_secs: Option<u64>,
    #[arg(
        long,
        global = true,
        value_name = "ADDR",
        help = "Address the worker event listener binds to. Overrides `event_addr` from the config file."
    )]
    pub event_addr: Option<SocketAddr>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the job monitor and the worker event listener until interrupted (default).
    Serve,
    /// Submit a model archive for execution.
    Dispatch(DispatchArgs),
    /// Show the current record of a job.
    Status(StatusArgs),
    /// List worker events recorded for a simulation.
    Events(EventsArgs),
    /// Download the results archive of a simulation.
    Results(ResultsArgs),
    /// List the simulator containers registered so far.
    Simulators,
}

impl Command {
    /// Commands that talk to the cluster need a resolvable SSH endpoint.
    pub fn needs_cluster(&self) -> bool {
        matches!(
            self,
            Command::Serve | Command::Dispatch(_) | Command::Results(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DispatchArgs {
    /// Model archive to run.
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,
    /// Python package the simulation needs, pinned as `name==version`. Repeatable.
    #[arg(short = 'd', long = "dependency", value_name = "SPEC")]
    pub dependencies: Vec<String>,
    /// Return once the simulation is submitted instead of waiting for it to finish.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["job_id", "simulation_id", "simulator_id", "correlation_id"])
))]
pub struct StatusArgs {
    #[arg(long, value_name = "ID")]
    pub job_id: Option<i64>,
    /// Latest simulation run for this simulation.
    #[arg(long, value_name = "ID")]
    pub simulation_id: Option<i64>,
    /// Latest container build for this simulator.
    #[arg(long, value_name = "ID")]
    pub simulator_id: Option<i64>,
    #[arg(long, value_name = "ID")]
    pub correlation_id: Option<String>,
}

impl StatusArgs {
    pub fn job_ref(&self) -> Option<JobRef> {
        if let Some(id) = self.job_id {
            return Some(JobRef::Job(id));
        }
        if let Some(id) = self.simulation_id {
            return Some(JobRef::Simulation(id));
        }
        if let Some(id) = self.simulator_id {
            return Some(JobRef::Simulator(id));
        }
        self.correlation_id.clone().map(JobRef::Correlation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct EventsArgs {
    #[arg(long, value_name = "ID")]
    pub simulation_id: i64,
    /// Only events with a larger sequence number.
    #[arg(long, value_name = "SEQ")]
    pub after: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ResultsArgs {
    #[arg(long, value_name = "ID")]
    pub simulation_id: i64,
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub dest: PathBuf,
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd);
    owned = owned.help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

fn split_matches(matches: &clap::ArgMatches) -> Result<ParsedOpts, clap::Error> {
    let verbose_override = matches.get_flag("verbose").then_some(true);
    let opts = Opts::from_arg_matches(matches)?;
    Ok(ParsedOpts {
        opts,
        verbose_override,
    })
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    split_matches(&matches).unwrap_or_else(|err| err.exit())
}
