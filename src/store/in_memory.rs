use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    JobFileRecord, JobId, JobRecord, JobStatus, JobStore, LogEntry, ScreenshotRecord, StoreError,
};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobRecord>,
    files: HashMap<JobId, Vec<JobFileRecord>>,
    screenshots: HashMap<JobId, BTreeMap<String, ScreenshotRecord>>,
    logs: HashMap<JobId, Vec<LogEntry>>,
}

/// Process-local store used by tests and single-shot CLI runs.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self) -> Result<JobRecord, StoreError> {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            ocr_processed: 0,
            ocr_total: 0,
            failure_reason: None,
            statistics: None,
        };
        self.inner.write().jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_job(&self, id: JobId) -> Result<JobRecord, StoreError> {
        self.inner
            .read()
            .jobs
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("job"))
    }

    async fn list_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        let mut jobs: Vec<JobRecord> = self.inner.read().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.jobs.remove(&id).ok_or(StoreError::NotFound("job"))?;
        inner.files.remove(&id);
        inner.screenshots.remove(&id);
        inner.logs.remove(&id);
        Ok(())
    }

    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        if !job.status.can_transition(status) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: status,
            });
        }
        job.status = status;
        job.failure_reason = failure_reason;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn begin_reprocess(&self, id: JobId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        if !job.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: JobStatus::Processing,
            });
        }
        job.status = JobStatus::Processing;
        job.failure_reason = None;
        job.statistics = None;
        job.ocr_processed = 0;
        job.ocr_total = 0;
        job.updated_at = Utc::now();
        inner.files.remove(&id);
        inner.screenshots.remove(&id);
        inner.logs.remove(&id);
        Ok(())
    }

    async fn set_progress(
        &self,
        id: JobId,
        processed: u32,
        total: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        job.ocr_processed = processed;
        job.ocr_total = total;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn register_files(
        &self,
        id: JobId,
        files: Vec<JobFileRecord>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.jobs.contains_key(&id) {
            return Err(StoreError::NotFound("job"));
        }
        // single lock scope: the whole batch lands or none of it does
        inner.files.entry(id).or_default().extend(files);
        Ok(())
    }

    async fn list_files(&self, id: JobId) -> Result<Vec<JobFileRecord>, StoreError> {
        Ok(self.inner.read().files.get(&id).cloned().unwrap_or_default())
    }

    async fn upsert_screenshot(&self, record: ScreenshotRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.jobs.contains_key(&record.job_id) {
            return Err(StoreError::NotFound("job"));
        }
        inner
            .screenshots
            .entry(record.job_id)
            .or_default()
            .insert(record.screenshot_id.clone(), record);
        Ok(())
    }

    async fn list_screenshots(&self, id: JobId) -> Result<Vec<ScreenshotRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .screenshots
            .get(&id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn append_logs(&self, id: JobId, entries: Vec<LogEntry>) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.jobs.contains_key(&id) {
            return Err(StoreError::NotFound("job"));
        }
        inner.logs.entry(id).or_default().extend(entries);
        Ok(())
    }

    async fn list_logs(&self, id: JobId) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.inner.read().logs.get(&id).cloned().unwrap_or_default())
    }

    async fn save_statistics(
        &self,
        id: JobId,
        statistics: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        job.statistics = Some(statistics);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LogLevel;

    #[tokio::test]
    async fn lifecycle_and_reprocess_reset() {
        let store = InMemoryJobStore::new();
        let job = store.create_job().await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        store
            .set_status(job.id, JobStatus::Processing, None)
            .await
            .unwrap();
        store
            .upsert_screenshot(ScreenshotRecord::new(job.id, "shot-1"))
            .await
            .unwrap();
        store
            .append_logs(
                job.id,
                vec![LogEntry {
                    at: Utc::now(),
                    level: LogLevel::Info,
                    message: "phase done".into(),
                    extra: None,
                }],
            )
            .await
            .unwrap();
        store
            .save_statistics(job.id, serde_json::json!({"hands": 3}))
            .await
            .unwrap();
        store
            .set_status(job.id, JobStatus::Completed, None)
            .await
            .unwrap();

        // terminal -> processing only via reprocess, which clears children
        let err = store
            .set_status(job.id, JobStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store.begin_reprocess(job.id).await.unwrap();
        let job = store.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.statistics.is_none());
        assert!(store.list_screenshots(job.id).await.unwrap().is_empty());
        assert!(store.list_logs(job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn screenshot_upsert_replaces_row() {
        let store = InMemoryJobStore::new();
        let job = store.create_job().await.unwrap();

        let mut record = ScreenshotRecord::new(job.id, "shot-1");
        record.ocr1_hand_id = Some("RC1001".into());
        store.upsert_screenshot(record.clone()).await.unwrap();

        record.ocr1_retry_count = 1;
        record.matched_hand_id = Some("RC1001".into());
        store.upsert_screenshot(record).await.unwrap();

        let rows = store.list_screenshots(job.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ocr1_retry_count, 1);
        assert_eq!(rows[0].matched_hand_id.as_deref(), Some("RC1001"));
    }

    #[tokio::test]
    async fn invalid_transitions_are_refused() {
        let store = InMemoryJobStore::new();
        let job = store.create_job().await.unwrap();
        let err = store
            .set_status(job.id, JobStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }
}
