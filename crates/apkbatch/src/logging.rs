use std::path::Path;

use anyhow::{Context, Result};
use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, time::OffsetTime},
};

/// Sends diagnostics to a daily rolling file under `<work_dir>/logs`.
///
/// The console belongs to the operator, so nothing is logged there.
/// The returned guard must be kept alive to flush buffered records.
pub fn setup_logging(work_dir: &Path, level: &str) -> Result<WorkerGuard> {
    let logs_dir = work_dir.join("logs");
    fs_err::create_dir_all(&logs_dir).context("Failed to create logs directory")?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("apkbatch")
        .filename_suffix("log")
        .build(&logs_dir)
        .context("Failed to initialize file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("debug"))
        .context("Failed to build log filter")?;
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(fmt::format().pretty().with_timer(OffsetTime::new(offset, Rfc3339)))
        .with_writer(non_blocking)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global subscriber")?;
    Ok(guard)
}
