// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Installs the global subscriber. Output goes to stdout and, when `SIMGATE_LOG_FILE`
/// is set, to a non-blocking file writer with the same format.
pub fn init(verbose: bool) {
    let span_events = parse_span_events();
    let registry = Registry::default()
        .with(build_filter(verbose))
        .with(tracing_error::ErrorLayer::default());

    macro_rules! install {
        ($style:ident) => {{
            let stdout_layer = tracing_subscriber::fmt::layer()
                .$style()
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(span_events.clone());
            match build_file_writer() {
                Some((writer, guard)) => {
                    let file_layer = tracing_subscriber::fmt::layer()
                        .$style()
                        .with_ansi(false)
                        .with_timer(UtcTime::rfc_3339())
                        .with_span_events(span_events)
                        .with_writer(writer);
                    registry.with(stdout_layer).with(file_layer).init();
                    let _ = FILE_GUARD.set(guard);
                }
                None => registry.with(stdout_layer).init(),
            }
        }};
    }

    match parse_format() {
        LogFormat::Json => install!(json),
        LogFormat::Pretty => install!(pretty),
        LogFormat::Compact => install!(compact),
    }
}

const LOG_ENV: &str = "SIMGATE_LOG";
const LOG_FORMAT_ENV: &str = "SIMGATE_LOG_FORMAT";
const LOG_SPAN_EVENTS_ENV: &str = "SIMGATE_LOG_SPAN_EVENTS";
const LOG_FILE_ENV: &str = "SIMGATE_LOG_FILE";

/// Trimmed, non-empty value of an environment variable.
fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn build_filter(verbose: bool) -> EnvFilter {
    let directives = env_value(LOG_ENV).unwrap_or_else(|| default_directives(verbose).to_string());
    EnvFilter::new(directives)
}

fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info,sqlx=warn,russh=warn"
    }
}

fn parse_format() -> LogFormat {
    format_from(env_value(LOG_FORMAT_ENV).as_deref())
}

fn format_from(value: Option<&str>) -> LogFormat {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_span_events() -> FmtSpan {
    span_events_from(env_value(LOG_SPAN_EVENTS_ENV).as_deref())
}

/// Comma-separated list, e.g. `new,close`.
fn span_events_from(value: Option<&str>) -> FmtSpan {
    let Some(value) = value else {
        return FmtSpan::NONE;
    };
    value
        .split(',')
        .map(|part| part.trim().to_ascii_lowercase())
        .fold(FmtSpan::NONE, |acc, part| {
            acc | match part.as_str() {
                "new" => FmtSpan::NEW,
                "enter" => FmtSpan::ENTER,
                "exit" => FmtSpan::EXIT,
                "close" => FmtSpan::CLOSE,
                "active" => FmtSpan::ACTIVE,
                "full" => FmtSpan::FULL,
                _ => FmtSpan::NONE,
            }
        })
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let file_path = env_value(LOG_FILE_ENV)?;
    let path = Path::new(&file_path);
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_compact() {
        assert!(matches!(format_from(None), LogFormat::Compact));
        assert!(matches!(format_from(Some("JSON")), LogFormat::Json));
        assert!(matches!(format_from(Some("pretty")), LogFormat::Pretty));
        assert!(matches!(format_from(Some("xml")), LogFormat::Compact));
    }

    #[test]
    fn span_events_combine() {
        assert_eq!(span_events_from(None), FmtSpan::NONE);
        assert_eq!(span_events_from(Some("close")), FmtSpan::CLOSE);
        assert_eq!(
            span_events_from(Some("new, close")),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(span_events_from(Some("bogus")), FmtSpan::NONE);
    }

    #[test]
    fn verbose_switches_default_directives() {
        assert_eq!(default_directives(true), "debug");
        assert!(default_directives(false).starts_with("info"));
    }
}
