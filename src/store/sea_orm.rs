use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use crate::db::entity::{job_files, job_logs, jobs, screenshots};

use super::{
    JobFileKind, JobFileRecord, JobId, JobRecord, JobStatus, JobStore, LogEntry, LogLevel,
    ScreenshotRecord, StoreError,
};

/// SQLite-backed store; the durable deployment counterpart of
/// [`super::InMemoryJobStore`].
pub struct SeaOrmJobStore {
    connection: DatabaseConnection,
}

impl SeaOrmJobStore {
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    async fn load_job(&self, id: JobId) -> Result<jobs::Model, StoreError> {
        jobs::Entity::find_by_id(id)
            .one(&self.connection)
            .await?
            .ok_or(StoreError::NotFound("job"))
    }
}

fn job_record(model: jobs::Model) -> Result<JobRecord, StoreError> {
    let status = JobStatus::parse(&model.status)
        .ok_or_else(|| DbErr::Custom(format!("unknown job status `{}`", model.status)))?;
    Ok(JobRecord {
        id: model.id,
        status,
        created_at: model.created_at,
        updated_at: model.updated_at,
        ocr_processed: model.ocr_processed.max(0) as u32,
        ocr_total: model.ocr_total.max(0) as u32,
        failure_reason: model.failure_reason,
        statistics: model.statistics,
    })
}

fn screenshot_record(model: screenshots::Model) -> Result<ScreenshotRecord, StoreError> {
    let ocr2 = model
        .ocr2
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| DbErr::Custom(format!("bad ocr2 payload: {e}")))?;
    Ok(ScreenshotRecord {
        job_id: model.job_id,
        screenshot_id: model.screenshot_id,
        ocr1_hand_id: model.ocr1_hand_id,
        ocr1_retry_count: model.ocr1_retry_count.max(0) as u32,
        ocr1_error: model.ocr1_error,
        ocr2,
        ocr2_error: model.ocr2_error,
        matched_hand_id: model.matched_hand_id,
        match_source: model.match_source,
        match_score: model.match_score,
        discard_reason: model.discard_reason,
    })
}

fn log_record(model: job_logs::Model) -> LogEntry {
    LogEntry {
        at: model.at,
        level: LogLevel::parse(&model.level).unwrap_or(LogLevel::Info),
        message: model.message,
        extra: model.extra,
    }
}

#[async_trait]
impl JobStore for SeaOrmJobStore {
    async fn create_job(&self) -> Result<JobRecord, StoreError> {
        let now = Utc::now();
        let model = jobs::ActiveModel {
            id: Set(Uuid::new_v4()),
            status: Set(JobStatus::Pending.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ocr_processed: Set(0),
            ocr_total: Set(0),
            failure_reason: Set(None),
            statistics: Set(None),
        };
        let inserted = model.insert(&self.connection).await?;
        job_record(inserted)
    }

    async fn get_job(&self, id: JobId) -> Result<JobRecord, StoreError> {
        job_record(self.load_job(id).await?)
    }

    async fn list_jobs(&self) -> Result<Vec<JobRecord>, StoreError> {
        let models = jobs::Entity::find()
            .order_by_asc(jobs::Column::CreatedAt)
            .all(&self.connection)
            .await?;
        models.into_iter().map(job_record).collect()
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StoreError> {
        let txn = self.connection.begin().await?;
        let deleted = jobs::Entity::delete_by_id(id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            txn.rollback().await?;
            return Err(StoreError::NotFound("job"));
        }
        job_files::Entity::delete_many()
            .filter(job_files::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        screenshots::Entity::delete_many()
            .filter(screenshots::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        job_logs::Entity::delete_many()
            .filter(job_logs::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        failure_reason: Option<String>,
    ) -> Result<(), StoreError> {
        let model = self.load_job(id).await?;
        let current = JobStatus::parse(&model.status)
            .ok_or_else(|| DbErr::Custom(format!("unknown job status `{}`", model.status)))?;
        if !current.can_transition(status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: status,
            });
        }
        let mut active: jobs::ActiveModel = model.into();
        active.status = Set(status.as_str().to_string());
        active.failure_reason = Set(failure_reason);
        active.updated_at = Set(Utc::now());
        active.update(&self.connection).await?;
        Ok(())
    }

    async fn begin_reprocess(&self, id: JobId) -> Result<(), StoreError> {
        let txn = self.connection.begin().await?;
        let model = jobs::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound("job"))?;
        let current = JobStatus::parse(&model.status)
            .ok_or_else(|| DbErr::Custom(format!("unknown job status `{}`", model.status)))?;
        if !current.is_terminal() {
            txn.rollback().await?;
            return Err(StoreError::InvalidTransition {
                from: current,
                to: JobStatus::Processing,
            });
        }

        job_files::Entity::delete_many()
            .filter(job_files::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        screenshots::Entity::delete_many()
            .filter(screenshots::Column::JobId.eq(id))
            .exec(&txn)
            .await?;
        job_logs::Entity::delete_many()
            .filter(job_logs::Column::JobId.eq(id))
            .exec(&txn)
            .await?;

        let mut active: jobs::ActiveModel = model.into();
        active.status = Set(JobStatus::Processing.as_str().to_string());
        active.failure_reason = Set(None);
        active.statistics = Set(None);
        active.ocr_processed = Set(0);
        active.ocr_total = Set(0);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn set_progress(
        &self,
        id: JobId,
        processed: u32,
        total: u32,
    ) -> Result<(), StoreError> {
        let model = self.load_job(id).await?;
        let mut active: jobs::ActiveModel = model.into();
        active.ocr_processed = Set(processed as i32);
        active.ocr_total = Set(total as i32);
        active.updated_at = Set(Utc::now());
        active.update(&self.connection).await?;
        Ok(())
    }

    async fn register_files(
        &self,
        id: JobId,
        files: Vec<JobFileRecord>,
    ) -> Result<(), StoreError> {
        let txn = self.connection.begin().await?;
        jobs::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound("job"))?;
        for file in files {
            let model = job_files::ActiveModel {
                id: NotSet,
                job_id: Set(id),
                name: Set(file.name),
                kind: Set(file.kind.as_str().to_string()),
            };
            model.insert(&txn).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn list_files(&self, id: JobId) -> Result<Vec<JobFileRecord>, StoreError> {
        let models = job_files::Entity::find()
            .filter(job_files::Column::JobId.eq(id))
            .order_by_asc(job_files::Column::Id)
            .all(&self.connection)
            .await?;
        Ok(models
            .into_iter()
            .map(|m| JobFileRecord {
                job_id: m.job_id,
                name: m.name,
                kind: JobFileKind::parse(&m.kind).unwrap_or(JobFileKind::HandHistory),
            })
            .collect())
    }

    async fn upsert_screenshot(&self, record: ScreenshotRecord) -> Result<(), StoreError> {
        let ocr2 = record
            .ocr2
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DbErr::Custom(format!("unserializable ocr2 payload: {e}")))?;

        let existing = screenshots::Entity::find()
            .filter(screenshots::Column::JobId.eq(record.job_id))
            .filter(screenshots::Column::ScreenshotId.eq(record.screenshot_id.clone()))
            .one(&self.connection)
            .await?;

        let mut active = match existing {
            Some(model) => {
                let active: screenshots::ActiveModel = model.into();
                active
            }
            None => screenshots::ActiveModel {
                id: NotSet,
                job_id: Set(record.job_id),
                screenshot_id: Set(record.screenshot_id.clone()),
                ..Default::default()
            },
        };
        active.ocr1_hand_id = Set(record.ocr1_hand_id);
        active.ocr1_retry_count = Set(record.ocr1_retry_count as i32);
        active.ocr1_error = Set(record.ocr1_error);
        active.ocr2 = Set(ocr2);
        active.ocr2_error = Set(record.ocr2_error);
        active.matched_hand_id = Set(record.matched_hand_id);
        active.match_source = Set(record.match_source);
        active.match_score = Set(record.match_score);
        active.discard_reason = Set(record.discard_reason);
        active.save(&self.connection).await?;
        Ok(())
    }

    async fn list_screenshots(&self, id: JobId) -> Result<Vec<ScreenshotRecord>, StoreError> {
        let models = screenshots::Entity::find()
            .filter(screenshots::Column::JobId.eq(id))
            .order_by_asc(screenshots::Column::ScreenshotId)
            .all(&self.connection)
            .await?;
        models.into_iter().map(screenshot_record).collect()
    }

    async fn append_logs(&self, id: JobId, entries: Vec<LogEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.connection.begin().await?;
        for entry in entries {
            let model = job_logs::ActiveModel {
                id: NotSet,
                job_id: Set(id),
                at: Set(entry.at),
                level: Set(entry.level.as_str().to_string()),
                message: Set(entry.message),
                extra: Set(entry.extra),
            };
            model.insert(&txn).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn list_logs(&self, id: JobId) -> Result<Vec<LogEntry>, StoreError> {
        let models = job_logs::Entity::find()
            .filter(job_logs::Column::JobId.eq(id))
            .order_by_asc(job_logs::Column::Id)
            .all(&self.connection)
            .await?;
        Ok(models.into_iter().map(log_record).collect())
    }

    async fn save_statistics(
        &self,
        id: JobId,
        statistics: serde_json::Value,
    ) -> Result<(), StoreError> {
        let model = self.load_job(id).await?;
        let mut active: jobs::ActiveModel = model.into();
        active.statistics = Set(Some(statistics));
        active.updated_at = Set(Utc::now());
        active.update(&self.connection).await?;
        Ok(())
    }
}
