// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::watch;

use adapters::bus::{EventIngest, LocalEventBus};
use adapters::cli::{Command, DispatchArgs};
use adapters::container::DefinitionGenerator;
use adapters::db::{GatewayStore, SqliteStoreAdapter};
use adapters::ssh::SshAdapter;
use adapters::telemetry::TracingTelemetry;
use adapters::time::SystemClock;
use app::context::{AppContext, ContextParts};
use app::scheduler::SlurmClient;
use app::services::layout::RemoteLayout;
use app::types::{JobRef, SimulationRequest, SshConfig};
use app::usecases::UseCases;

mod adapters;
mod app;
mod config;
mod logging;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), source) => tracing::info!(
            path = %path.display(),
            source = source.map(|s| s.as_str()).unwrap_or("unknown"),
            present = report.config_file_present,
            "config path"
        ),
        (None, _) => tracing::info!("no config file"),
    }
    tracing::info!(
        database_path = %report.database_path.value.display(),
        database_path_source = report.database_path.source.as_str(),
        job_check_interval_secs = report.job_check_interval_secs.value,
        job_check_interval_source = report.job_check_interval_secs.source.as_str(),
        event_addr = %report.event_addr.value,
        event_addr_source = report.event_addr.source.as_str(),
        verbose = report.verbose.value,
        verbose_source = report.verbose.source.as_str(),
        "effective config"
    );
}

/// Builds the SSH target. Commands that stay local tolerate a missing or unresolvable host.
async fn ssh_config(config: &config::Config, required: bool) -> anyhow::Result<SshConfig> {
    let ssh = &config.ssh;
    let addr = if required {
        if ssh.host.trim().is_empty() {
            anyhow::bail!("[ssh] host must be set in the config file");
        }
        adapters::network::resolve_host_addr(&ssh.host, ssh.port).await?
    } else {
        match adapters::network::resolve_host_addr(&ssh.host, ssh.port).await {
            Ok(addr) => addr,
            Err(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, ssh.port)),
        }
    };
    Ok(SshConfig {
        session_name: Some(ssh.host.clone()),
        host: ssh.host.clone(),
        addr,
        username: ssh.username.clone(),
        identity_path: ssh.identity_path.clone(),
        known_hosts_path: ssh.known_hosts_path.as_ref().map(PathBuf::from),
        keepalive_secs: ssh.keepalive_secs,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{text}");
    Ok(())
}

async fn serve(usecases: &UseCases, config: &config::Config) -> anyhow::Result<()> {
    let context = usecases.context();
    context.monitor.start().await?;

    let listener = EventIngest::bind(config.event_addr).await?;
    let ingest = Arc::new(EventIngest::new(
        context.bus.clone(),
        config.bus.worker_event_subject.clone(),
    ));
    let (stop_tx, stop_rx) = watch::channel(false);
    let ingest_task = tokio::spawn(ingest.serve(listener, stop_rx));

    tracing::info!("simgated running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    let _ = stop_tx.send(true);
    if let Err(err) = ingest_task.await {
        tracing::warn!("event ingest ended abnormally: {err}");
    }
    context.monitor.stop().await;
    Ok(())
}

async fn dispatch(usecases: &UseCases, args: DispatchArgs) -> anyhow::Result<()> {
    let monitor = usecases.context().monitor.clone();
    monitor.start().await?;
    let outcome = run_dispatch(usecases, args).await;
    monitor.stop().await;
    outcome
}

async fn run_dispatch(usecases: &UseCases, args: DispatchArgs) -> anyhow::Result<()> {
    let accepted = usecases
        .dispatch(SimulationRequest {
            archive: args.archive,
            dependencies: args.dependencies,
        })
        .await?;
    print_json(&accepted.handle)?;

    let job = accepted
        .continuation
        .await
        .context("dispatch task panicked")??;
    if args.no_wait {
        return print_json(&job);
    }
    let Some(external_job_id) = job.external_job_id else {
        return print_json(&job);
    };
    let monitor = &usecases.context().monitor;
    let subscription = monitor.subscribe(external_job_id).await;
    let finished = monitor.wait_until_terminal(subscription).await?;
    print_json(&finished)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            job_check_interval_secs: opts.job_check_interval_secs,
            event_addr: opts.event_addr,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);

    let command = opts.command.unwrap_or(Command::Serve);
    config::ensure_database_dir(&config.database_path)?;
    let store = Arc::new(SqliteStoreAdapter::new(
        GatewayStore::open(&config.database_path).await?,
    ));
    let ssh = ssh_config(&config, command.needs_cluster()).await?;
    let remote = Arc::new(SshAdapter::with_defaults());
    let scheduler_settings = config.scheduler_settings();
    let scheduler = Arc::new(SlurmClient::new(
        remote.clone(),
        ssh.clone(),
        RemoteLayout::new(&scheduler_settings),
    ));

    let context = AppContext::build(ContextParts {
        jobs: store.clone(),
        simulators: store.clone(),
        simulations: store.clone(),
        worker_events: store,
        remote: remote.clone(),
        scheduler,
        bus: Arc::new(LocalEventBus::default()),
        specs: Arc::new(DefinitionGenerator::new(config.dispatch.base_image.clone())),
        clock: Arc::new(SystemClock::new()),
        telemetry: Arc::new(TracingTelemetry::new()),
        ssh,
        scheduler_settings,
        monitor_settings: config.monitor_settings(),
        allow_list: config.allow_list(),
    });
    let usecases = UseCases::new(Arc::new(context));

    let outcome = match command {
        Command::Serve => serve(&usecases, &config).await,
        Command::Dispatch(args) => dispatch(&usecases, args).await,
        Command::Status(args) => match args.job_ref() {
            Some(job_ref) => print_json(&usecases.get_status(&job_ref).await?),
            None => Err(anyhow::anyhow!("a job reference is required")),
        },
        Command::Events(args) => {
            let events = usecases
                .list_events(&JobRef::Simulation(args.simulation_id), args.after)
                .await?;
            print_json(&events)
        }
        Command::Results(args) => {
            let path = usecases.fetch_results(args.simulation_id, &args.dest).await?;
            print_json(&serde_json::json!({ "path": path }))
        }
        Command::Simulators => print_json(&usecases.list_simulators().await?),
    };
    remote.shutdown().await;
    outcome
}
