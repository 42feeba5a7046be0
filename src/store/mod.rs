//! Durable job state: jobs, their file index, per-screenshot outcomes,
//! and the structured log. One writer per row is enough: different
//! screenshots are different rows, and the log is appended in batches by
//! the single orchestrator that owns the job.

pub mod in_memory;
pub mod sea_orm;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vision::PlayerScan;

pub use self::in_memory::InMemoryJobStore;
pub use self::sea_orm::SeaOrmJobStore;

pub type JobId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Initialized,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Initialized => "INITIALIZED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "PENDING" => Some(JobStatus::Pending),
            "INITIALIZED" => Some(JobStatus::Initialized),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal forward transitions. Re-processing a terminal job goes
    /// through [`JobStore::begin_reprocess`], never through `set_status`.
    pub fn can_transition(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Initialized)
                | (Pending, Processing)
                | (Pending, Failed)
                | (Initialized, Processing)
                | (Initialized, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ocr_processed: u32,
    pub ocr_total: u32,
    pub failure_reason: Option<String>,
    pub statistics: Option<serde_json::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobFileKind {
    HandHistory,
    Screenshot,
}

impl JobFileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobFileKind::HandHistory => "HAND_HISTORY",
            JobFileKind::Screenshot => "SCREENSHOT",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "HAND_HISTORY" => Some(JobFileKind::HandHistory),
            "SCREENSHOT" => Some(JobFileKind::Screenshot),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobFileRecord {
    pub job_id: JobId,
    pub name: String,
    pub kind: JobFileKind,
}

/// Everything the pipeline learned about one screenshot, persisted as it
/// is learned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreenshotRecord {
    pub job_id: JobId,
    pub screenshot_id: String,
    pub ocr1_hand_id: Option<String>,
    pub ocr1_retry_count: u32,
    pub ocr1_error: Option<String>,
    pub ocr2: Option<PlayerScan>,
    pub ocr2_error: Option<String>,
    pub matched_hand_id: Option<String>,
    pub match_source: Option<String>,
    pub match_score: Option<f64>,
    pub discard_reason: Option<String>,
}

impl ScreenshotRecord {
    pub fn new(job_id: JobId, screenshot_id: impl Into<String>) -> Self {
        Self {
            job_id,
            screenshot_id: screenshot_id.into(),
            ocr1_hand_id: None,
            ocr1_retry_count: 0,
            ocr1_error: None,
            ocr2: None,
            ocr2_error: None,
            matched_hand_id: None,
            match_source: None,
            match_score: None,
            discard_reason: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] ::sea_orm::DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("illegal status transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self) -> Result<JobRecord, StoreError>;
    async fn get_job(&self, id: JobId) -> Result<JobRecord, StoreError>;
    async fn list_jobs(&self) -> Result<Vec<JobRecord>, StoreError>;
    async fn delete_job(&self, id: JobId) -> Result<(), StoreError>;

    /// Forward status transition with optional failure reason.
    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> Result<(), StoreError>;

    /// Terminal -> PROCESSING: atomically clears file rows, screenshot
    /// rows, logs, and statistics while preserving the job row itself.
    /// The pipeline re-registers the input batch on the new run.
    async fn begin_reprocess(&self, id: JobId) -> Result<(), StoreError>;

    async fn set_progress(&self, id: JobId, processed: u32, total: u32)
        -> Result<(), StoreError>;

    /// All-or-nothing registration of the input batch.
    async fn register_files(
        &self,
        id: JobId,
        files: Vec<JobFileRecord>,
    ) -> Result<(), StoreError>;
    async fn list_files(&self, id: JobId) -> Result<Vec<JobFileRecord>, StoreError>;

    async fn upsert_screenshot(&self, record: ScreenshotRecord) -> Result<(), StoreError>;
    async fn list_screenshots(&self, id: JobId) -> Result<Vec<ScreenshotRecord>, StoreError>;

    async fn append_logs(&self, id: JobId, entries: Vec<LogEntry>) -> Result<(), StoreError>;
    async fn list_logs(&self, id: JobId) -> Result<Vec<LogEntry>, StoreError>;

    async fn save_statistics(
        &self,
        id: JobId,
        statistics: serde_json::Value,
    ) -> Result<(), StoreError>;
}
