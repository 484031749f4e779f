// Process-wide tracing setup, installed once from main

use std::fs::{self, File};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::CliError;

const DEFAULT_FILTER: &str = "warn,iprtrack=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Stderr only. Read-only commands don't touch the change log.
pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(atty::is(atty::Stream::Stderr)),
        )
        .init();
}

/// Stderr plus the change log, truncated for this run. Keep the guard
/// alive until the end of `main` or buffered lines are lost.
pub fn init_with_file(path: &Path) -> Result<WorkerGuard, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CliError::io(format!("{}: {}", parent.display(), e)))?;
    }
    let file = File::create(path).map_err(|e| {
        CliError::io(format!("cannot open log file {}: {}", path.display(), e))
    })?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(atty::is(atty::Stream::Stderr)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
