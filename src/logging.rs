use anyhow::{Context, Result};
use std::{fs, io, path::Path};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "modkit.log";

/// Stderr plus `modkit.log` in `data_dir`. `RUST_LOG` wins over `verbose`.
/// Keep the guard alive until exit or buffered lines are lost.
pub fn init(data_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    fs::create_dir_all(data_dir).context("create log dir")?;
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(data_dir, LOG_FILE));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .context("install log subscriber")?;
    Ok(guard)
}
