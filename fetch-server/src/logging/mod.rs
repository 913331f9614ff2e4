//! Logging setup.
//!
//! - Console and daily-rolling file output with local timezone timestamps
//! - `RUST_LOG` filtering, with a default for this crate and its tools
//! - Retention cleanup of rolled log files

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "fetch_server=info,process_utils=info,tower_http=info";

/// Base name of the rolling log file; rolled files get a `.YYYY-MM-DD` suffix.
const LOG_FILE_NAME: &str = "fetch-server.log";

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process, or buffered file output is lost.
pub fn init_logging(log_dir: &Path) -> crate::Result<WorkerGuard> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

/// Spawn the daily retention task. It stops when `cancel_token` is cancelled.
pub fn start_retention_cleanup(
    log_dir: PathBuf,
    retention_days: i64,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = cleanup_old_logs(&log_dir, retention_days, Local::now().date_naive()).await {
                warn!(error = %e, "Failed to cleanup old logs");
            }
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Log retention cleanup task shutting down");
                    break;
                }
                _ = tokio::time::sleep(CLEANUP_INTERVAL) => {}
            }
        }
    })
}

/// Delete rolled log files dated more than `retention_days` before `today`.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64, today: NaiveDate) -> std::io::Result<usize> {
    let cutoff = today - chrono::Duration::days(retention_days);
    let prefix = format!("{}.", LOG_FILE_NAME);

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };

        if date < cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete old log file"),
            }
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}
