use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::warn;

use crate::store::{JobId, JobStore, LogEntry, LogLevel, StoreError};

const LOG_TARGET: &str = "pipeline::log";

/// Per-job structured log, buffered in memory and flushed to the store at
/// phase boundaries and on the terminal transition. A crash mid-phase
/// loses at most the unflushed lines; the snapshot carries a `truncated`
/// flag when a flush failed.
pub struct JobLogBuffer {
    job_id: JobId,
    entries: Mutex<Vec<LogEntry>>,
    truncated: AtomicBool,
}

impl JobLogBuffer {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            entries: Mutex::new(Vec::new()),
            truncated: AtomicBool::new(false),
        }
    }

    pub fn push(&self, level: LogLevel, message: impl Into<String>, extra: Option<serde_json::Value>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(target: LOG_TARGET, job_id = %self.job_id, "{message}"),
            LogLevel::Info => tracing::info!(target: LOG_TARGET, job_id = %self.job_id, "{message}"),
            LogLevel::Warn => tracing::warn!(target: LOG_TARGET, job_id = %self.job_id, "{message}"),
            LogLevel::Error | LogLevel::Critical => {
                tracing::error!(target: LOG_TARGET, job_id = %self.job_id, "{message}")
            }
        }
        self.entries.lock().push(LogEntry {
            at: Utc::now(),
            level,
            message,
            extra,
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogLevel::Error, message, None);
    }

    pub fn critical(&self, message: impl Into<String>, extra: Option<serde_json::Value>) {
        self.push(LogLevel::Critical, message, extra);
    }

    /// Drains the buffer into the store. Entries that cannot be persisted
    /// are dropped and the truncation flag raised.
    pub async fn flush(&self, store: &Arc<dyn JobStore>) -> Result<(), StoreError> {
        let batch: Vec<LogEntry> = std::mem::take(&mut *self.entries.lock());
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        if let Err(err) = store.append_logs(self.job_id, batch).await {
            self.truncated.store(true, Ordering::SeqCst);
            warn!(
                target: LOG_TARGET,
                job_id = %self.job_id,
                dropped = count,
                error = %err,
                "log flush failed; entries dropped"
            );
            return Err(err);
        }
        Ok(())
    }

    pub fn truncated(&self) -> bool {
        self.truncated.load(Ordering::SeqCst)
    }
}
