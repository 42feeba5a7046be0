use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::store::{JobFileRecord, JobRecord, LogEntry, ScreenshotRecord};

const LOG_TARGET: &str = "pipeline::snapshot";

/// The post-mortem artifact written on every terminal transition,
/// success and failure alike.
#[derive(Debug, Serialize)]
pub struct DebugSnapshot {
    pub job: JobRecord,
    pub files: Vec<JobFileRecord>,
    pub screenshots: Vec<ScreenshotRecord>,
    pub statistics: Option<serde_json::Value>,
    pub logs: Vec<LogEntry>,
    pub log_truncated: bool,
    pub config: PipelineConfig,
}

/// Writes `debug_job_<id>_<timestampUTC>.json` under `debug_dir`.
pub async fn write_debug_snapshot(
    debug_dir: &Path,
    snapshot: &DebugSnapshot,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(debug_dir).await?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = debug_dir.join(format!("debug_job_{}_{stamp}.json", snapshot.job.id));
    let body = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    tokio::fs::write(&path, body).await?;
    info!(
        target: LOG_TARGET,
        job_id = %snapshot.job.id,
        path = %path.display(),
        "debug snapshot written"
    );
    Ok(path)
}
