//! The ten-phase orchestrator: Parse -> OCR1 -> Match -> OCR1 retry ->
//! Discard unmatched -> OCR2 -> Map -> Rewrite -> Validate -> Package.
//! Phase boundaries flush the job log and publish progress; component
//! failures surface here and nowhere else.

pub mod logbuf;
pub mod snapshot;
pub mod stats;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::config::PipelineConfig;
use crate::hands::errors::ParseError;
use crate::hands::{parse_file, Hand};
use crate::mapping::{aggregate, map_hand, HandMapping, MapError};
use crate::matching::{match_screenshots, MatchReport, ScreenFacts};
use crate::ocr::{self, ProgressCounter};
use crate::packaging::{classify_tables, write_outputs, HandResult, PackageError, PackagedJob};
use crate::rewrite::CompiledMapping;
use crate::store::{
    JobFileKind, JobFileRecord, JobId, JobStatus, JobStore, ScreenshotRecord, StoreError,
};
use crate::validate::validate_rewrite;
use crate::vision::{ImageRef, PlayerScan, TableScan, VisionClient, VisionError};

use logbuf::JobLogBuffer;
use snapshot::{write_debug_snapshot, DebugSnapshot};

pub use stats::JobStatistics;

const LOG_TARGET: &str = "pipeline";

/// Failure reason recorded when cancellation, not an error, ended the job.
pub const CANCELLED_REASON: &str = "CANCELLED";

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error("vision capability unavailable: {0}")]
    Vision(VisionError),
    #[error("input batch exceeds the {kind} limit: {given} > {limit}")]
    InputLimit {
        kind: &'static str,
        given: usize,
        limit: usize,
    },
    #[error("job cancelled")]
    Cancelled,
    #[error("panic inside {component}: {detail}")]
    Panicked { component: String, detail: String },
}

impl PipelineError {
    fn component(&self) -> &'static str {
        match self {
            PipelineError::Parse(_) => "parser",
            PipelineError::Store(_) => "job_store",
            PipelineError::Package(_) => "packager",
            PipelineError::Vision(_) => "vision_client",
            PipelineError::InputLimit { .. } => "intake",
            PipelineError::Cancelled => "orchestrator",
            PipelineError::Panicked { .. } => "orchestrator",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandFileInput {
    pub name: String,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct ScreenshotInput {
    pub id: String,
    pub image: ImageRef,
    pub captured_at: Option<NaiveDateTime>,
}

#[derive(Clone, Debug)]
pub struct JobInputs {
    pub hand_files: Vec<HandFileInput>,
    pub screenshots: Vec<ScreenshotInput>,
    pub output_dir: PathBuf,
}

/// What a finished job hands back to its driver.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub statistics: JobStatistics,
    pub packaged: PackagedJob,
    pub snapshot_path: Option<PathBuf>,
}

struct ShotState {
    input: ScreenshotInput,
    scan: Option<TableScan>,
    retry_count: u32,
    ocr1_error: Option<String>,
    ocr2: Option<PlayerScan>,
    ocr2_error: Option<String>,
    matched_hand_id: Option<String>,
    match_source: Option<&'static str>,
    match_score: Option<f64>,
    discard_reason: Option<String>,
}

impl ShotState {
    fn new(input: ScreenshotInput) -> Self {
        Self {
            input,
            scan: None,
            retry_count: 0,
            ocr1_error: None,
            ocr2: None,
            ocr2_error: None,
            matched_hand_id: None,
            match_source: None,
            match_score: None,
            discard_reason: None,
        }
    }

    fn record(&self, job_id: JobId) -> ScreenshotRecord {
        ScreenshotRecord {
            job_id,
            screenshot_id: self.input.id.clone(),
            ocr1_hand_id: self.scan.as_ref().and_then(|s| s.hand_id.clone()),
            ocr1_retry_count: self.retry_count,
            ocr1_error: self.ocr1_error.clone(),
            ocr2: self.ocr2.clone(),
            ocr2_error: self.ocr2_error.clone(),
            matched_hand_id: self.matched_hand_id.clone(),
            match_source: self.match_source.map(str::to_string),
            match_score: self.match_score,
            discard_reason: self.discard_reason.clone(),
        }
    }
}

struct PipelineInner {
    store: Arc<dyn JobStore>,
    vision: Arc<dyn VisionClient>,
    config: PipelineConfig,
    /// One pool for both OCR phases and for every job run through this
    /// pipeline value; the vendor quota is global, not per job.
    ocr_semaphore: Arc<Semaphore>,
}

/// Wires the components together for one or more jobs.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn JobStore>,
        vision: Arc<dyn VisionClient>,
        config: PipelineConfig,
    ) -> Self {
        let ocr_semaphore = Arc::new(Semaphore::new(config.ocr_concurrency.max(1)));
        Self {
            inner: Arc::new(PipelineInner {
                store,
                vision,
                config,
                ocr_semaphore,
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.inner.store)
    }

    /// Runs the whole pipeline for `job_id`. The job ends in COMPLETED or
    /// FAILED, and a debug snapshot is written either way.
    pub async fn run_job(
        &self,
        job_id: JobId,
        inputs: JobInputs,
        cancel: CancellationToken,
    ) -> Result<JobOutcome, PipelineError> {
        let inner = Arc::clone(&self.inner);

        let current = inner.store.get_job(job_id).await?;
        if current.status.is_terminal() {
            inner.store.begin_reprocess(job_id).await?;
        } else {
            inner
                .store
                .set_status(job_id, JobStatus::Processing, None)
                .await?;
        }

        let logs = Arc::new(JobLogBuffer::new(job_id));
        let output_dir = inputs.output_dir.clone();

        // unexpected panics anywhere below are caught here, at the
        // orchestrator boundary, and nowhere else
        let handle = tokio::spawn({
            let inner = Arc::clone(&inner);
            let logs = Arc::clone(&logs);
            let cancel = cancel.clone();
            async move { inner.execute(job_id, inputs, cancel, logs).await }
        });
        let result = match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let detail = panic_detail(join_err.into_panic());
                Err(PipelineError::Panicked {
                    component: "pipeline".to_string(),
                    detail,
                })
            }
            Err(_) => Err(PipelineError::Cancelled),
        };

        self.finish(job_id, &output_dir, logs, result).await
    }

    async fn finish(
        &self,
        job_id: JobId,
        output_dir: &std::path::Path,
        logs: Arc<JobLogBuffer>,
        result: Result<(JobStatistics, PackagedJob), PipelineError>,
    ) -> Result<JobOutcome, PipelineError> {
        let store = &self.inner.store;
        let outcome = match result {
            Ok((statistics, packaged)) => {
                let stats_value = serde_json::to_value(&statistics)
                    .unwrap_or_else(|_| serde_json::Value::Null);
                store.save_statistics(job_id, stats_value).await?;
                store
                    .set_status(job_id, JobStatus::Completed, None)
                    .await?;
                logs.info("job completed");
                Ok((statistics, packaged))
            }
            Err(err) => {
                let reason = match &err {
                    PipelineError::Cancelled => CANCELLED_REASON.to_string(),
                    other => other.to_string(),
                };
                logs.critical(
                    format!("job failed in {}: {reason}", err.component()),
                    Some(serde_json::json!({ "component": err.component() })),
                );
                if let Err(status_err) = store
                    .set_status(job_id, JobStatus::Failed, Some(reason))
                    .await
                {
                    error!(
                        target: LOG_TARGET,
                        job_id = %job_id,
                        error = %status_err,
                        "could not record FAILED status"
                    );
                }
                Err(err)
            }
        };

        let _ = logs.flush(store).await;
        let snapshot_path = self.write_snapshot(job_id, output_dir, logs.truncated()).await;

        match outcome {
            Ok((statistics, packaged)) => Ok(JobOutcome {
                job_id,
                statistics,
                packaged,
                snapshot_path,
            }),
            Err(err) => Err(err),
        }
    }

    async fn write_snapshot(
        &self,
        job_id: JobId,
        output_dir: &std::path::Path,
        log_truncated: bool,
    ) -> Option<PathBuf> {
        let store = &self.inner.store;
        let job = store.get_job(job_id).await.ok()?;
        let statistics = job.statistics.clone();
        let snapshot = DebugSnapshot {
            job,
            files: store.list_files(job_id).await.unwrap_or_default(),
            screenshots: store.list_screenshots(job_id).await.unwrap_or_default(),
            statistics,
            logs: store.list_logs(job_id).await.unwrap_or_default(),
            log_truncated,
            config: self.inner.config.clone(),
        };
        match write_debug_snapshot(&output_dir.join("debug"), &snapshot).await {
            Ok(path) => Some(path),
            Err(err) => {
                error!(
                    target: LOG_TARGET,
                    job_id = %job_id,
                    error = %err,
                    "debug snapshot could not be written"
                );
                None
            }
        }
    }
}

impl PipelineInner {
    async fn execute(
        &self,
        job_id: JobId,
        inputs: JobInputs,
        cancel: CancellationToken,
        logs: Arc<JobLogBuffer>,
    ) -> Result<(JobStatistics, PackagedJob), PipelineError> {
        let config = &self.config;
        let mut stats = JobStatistics::default();

        check_limit(
            "hand files",
            inputs.hand_files.len(),
            config.input_limits.max_hand_files,
        )?;
        check_limit(
            "screenshots",
            inputs.screenshots.len(),
            config.input_limits.max_screenshots,
        )?;

        let mut index: Vec<JobFileRecord> = inputs
            .hand_files
            .iter()
            .map(|f| JobFileRecord {
                job_id,
                name: f.name.clone(),
                kind: JobFileKind::HandHistory,
            })
            .collect();
        index.extend(inputs.screenshots.iter().map(|s| JobFileRecord {
            job_id,
            name: s.id.clone(),
            kind: JobFileKind::Screenshot,
        }));
        self.store.register_files(job_id, index).await?;

        stats.files_total = inputs.hand_files.len();
        stats.screenshots_total = inputs.screenshots.len();

        // ---- Phase 1: parse ------------------------------------------
        let mut hands: Vec<Hand> = Vec::new();
        for file in &inputs.hand_files {
            let parsed = parse_file(&file.name, &file.text)?;
            for skip in &parsed.skipped {
                logs.warn(format!(
                    "skipped malformed hand {} in {}: {}",
                    skip.hand_id.as_deref().unwrap_or("?"),
                    file.name,
                    skip.reason
                ));
            }
            stats.hands_skipped += parsed.skipped.len();
            hands.extend(parsed.hands);
        }
        stats.hands_parsed = hands.len();
        logs.info(format!(
            "parsed {} hands from {} files ({} skipped)",
            stats.hands_parsed, stats.files_total, stats.hands_skipped
        ));

        let hand_index: HashMap<String, usize> = hands
            .iter()
            .enumerate()
            .map(|(i, h)| (h.hand_id.clone(), i))
            .collect();

        let progress = Arc::new(ProgressCounter::new(inputs.screenshots.len()));
        let mut shots: BTreeMap<String, ShotState> = inputs
            .screenshots
            .into_iter()
            .map(|s| (s.id.clone(), ShotState::new(s)))
            .collect();

        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 2: OCR1 -------------------------------------------
        let targets: Vec<(String, ImageRef)> = shots
            .values()
            .map(|s| (s.input.id.clone(), s.input.image.clone()))
            .collect();
        let sweep = ocr::scan_screenshots(
            Arc::clone(&self.vision),
            Arc::clone(&self.ocr_semaphore),
            cancel.clone(),
            Duration::from_secs(config.ocr_call_timeout_secs),
            targets,
            Arc::clone(&progress),
        )
        .await;
        self.absorb_scan_sweep(job_id, &mut shots, sweep.results, &logs)
            .await?;
        if sweep.cancelled {
            return Err(PipelineError::Cancelled);
        }
        logs.info("phase-1 OCR complete");
        self.phase_boundary(job_id, &logs, &progress).await?;

        // ---- Phase 3: match ------------------------------------------
        let mut report = self.run_matching(job_id, &hands, &mut shots).await?;
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 4: OCR1 retry for what is still unmatched ---------
        let retry_targets: Vec<(String, ImageRef)> = shots
            .values()
            .filter(|s| {
                s.matched_hand_id.is_none()
                    && s.retry_count < config.ocr1_max_retries
                    && (s.ocr1_error.is_some()
                        || s.scan.as_ref().map_or(true, |scan| scan.hand_id.is_none()))
            })
            .map(|s| (s.input.id.clone(), s.input.image.clone()))
            .collect();
        if !retry_targets.is_empty() {
            logs.info(format!(
                "retrying phase-1 OCR for {} screenshots",
                retry_targets.len()
            ));
            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(config.ocr1_retry_delay_ms)) => {}
            }
            progress.add_work(retry_targets.len());
            let retried: Vec<String> = retry_targets.iter().map(|(id, _)| id.clone()).collect();
            let sweep = ocr::scan_screenshots(
                Arc::clone(&self.vision),
                Arc::clone(&self.ocr_semaphore),
                cancel.clone(),
                Duration::from_secs(config.ocr_call_timeout_secs),
                retry_targets,
                Arc::clone(&progress),
            )
            .await;
            for id in retried {
                if let Some(shot) = shots.get_mut(&id) {
                    shot.retry_count += 1;
                    stats.ocr1_retries += 1;
                }
            }
            self.absorb_scan_sweep(job_id, &mut shots, sweep.results, &logs)
                .await?;
            if sweep.cancelled {
                return Err(PipelineError::Cancelled);
            }
            report = self.run_matching(job_id, &hands, &mut shots).await?;
        }
        stats.gate_rejections = report.rejections.len();
        stats.matched_screenshots = report.matches.len();
        stats.identity_matches = report
            .matches
            .iter()
            .filter(|m| m.source != crate::matching::MatchSource::Scored)
            .count();
        stats.scored_matches = stats.matched_screenshots - stats.identity_matches;
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 5: discard what stayed unmatched ------------------
        for shot in shots.values_mut() {
            if shot.matched_hand_id.is_some() {
                continue;
            }
            let reason = report
                .rejections
                .iter()
                .rev()
                .find(|r| r.screenshot_id == shot.input.id)
                .map(|r| format!("gate rejection: {}", r.failure))
                .unwrap_or_else(|| {
                    if shot.ocr1_error.is_some() {
                        "phase-1 OCR failed".to_string()
                    } else {
                        "no matching hand".to_string()
                    }
                });
            shot.discard_reason = Some(reason);
            stats.discarded_screenshots += 1;
            self.store.upsert_screenshot(shot.record(job_id)).await?;
        }
        stats.ocr1_failures = shots.values().filter(|s| s.ocr1_error.is_some()).count();
        logs.info(format!(
            "{} screenshots matched, {} discarded",
            stats.matched_screenshots, stats.discarded_screenshots
        ));
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 6: OCR2, matched screenshots only (cost gate) -----
        let ocr2_targets: Vec<(String, ImageRef)> = shots
            .values()
            .filter(|s| s.matched_hand_id.is_some())
            .map(|s| (s.input.id.clone(), s.input.image.clone()))
            .collect();
        debug_assert!(ocr2_targets
            .iter()
            .all(|(id, _)| report.is_matched_screenshot(id)));
        progress.add_work(ocr2_targets.len());
        let sweep = ocr::extract_players(
            Arc::clone(&self.vision),
            Arc::clone(&self.ocr_semaphore),
            cancel.clone(),
            Duration::from_secs(config.ocr_call_timeout_secs),
            ocr2_targets,
            Arc::clone(&progress),
        )
        .await;
        for (id, result) in sweep.results {
            let Some(shot) = shots.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(payload) => {
                    shot.ocr2 = Some(payload);
                    shot.ocr2_error = None;
                }
                Err(err) => {
                    if matches!(err, VisionError::AuthMissing) {
                        return Err(PipelineError::Vision(err));
                    }
                    if matches!(err, VisionError::Schema(_)) {
                        logs.warn(format!("screenshot {id}: invalid phase-2 payload: {err}"));
                    }
                    shot.ocr2_error = Some(err.to_string());
                    stats.ocr2_failures += 1;
                }
            }
            self.store.upsert_screenshot(shot.record(job_id)).await?;
        }
        if sweep.cancelled {
            return Err(PipelineError::Cancelled);
        }
        logs.info("phase-2 OCR complete");
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 7: map and aggregate ------------------------------
        let mut mappings: Vec<(usize, HandMapping)> = Vec::new();
        for matched in &report.matches {
            let Some(&hand_idx) = hand_index.get(&matched.hand_id) else {
                continue;
            };
            let Some(shot) = shots.get(&matched.screenshot_id) else {
                continue;
            };
            let Some(players) = shot.ocr2.as_ref() else {
                continue;
            };
            match map_hand(&hands[hand_idx], players, &matched.screenshot_id) {
                Ok(mapping) => mappings.push((hand_idx, mapping)),
                Err(MapError::DuplicateName { hand_id, name }) => {
                    stats.duplicate_discards += 1;
                    logs.error(format!(
                        "hand {hand_id}: duplicate real name `{name}`; mapping discarded"
                    ));
                }
                Err(MapError::InsufficientData { hand_id }) => {
                    logs.warn(format!("hand {hand_id}: not enough data to map names"));
                }
            }
        }
        stats.hand_mappings = mappings.len();
        let tables = aggregate::aggregate_tables(
            mappings.iter().map(|(idx, m)| (&hands[*idx], m)),
        );
        stats.mapping_conflicts = tables.values().map(|t| t.conflicts).sum();
        logs.info(format!(
            "{} hand mappings aggregated into {} tables",
            stats.hand_mappings,
            tables.len()
        ));
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phases 8 + 9: rewrite and validate ----------------------
        let mut compiled: HashMap<String, CompiledMapping> = HashMap::new();
        let mut results: Vec<HandResult<'_>> = Vec::with_capacity(hands.len());
        let empty_names = BTreeMap::new();
        for hand in &hands {
            let table = aggregate::mapping_for(&tables, hand);
            let (output, names) = match table {
                Some(table) if !table.is_empty() => {
                    let key = crate::hands::normalize::table_key(hand.table_name.as_deref());
                    let rules = compiled
                        .entry(key)
                        .or_insert_with(|| CompiledMapping::new(&table.names));
                    (rules.apply(&hand.raw_text), &table.names)
                }
                _ => (hand.raw_text.clone(), &empty_names),
            };
            let validation = validate_rewrite(hand, &output, names);
            results.push(HandResult {
                hand,
                output,
                report: Some(validation),
            });
        }
        logs.info("rewrite and validation complete");
        self.phase_boundary(job_id, &logs, &progress).await?;
        ensure_live(&cancel)?;

        // ---- Phase 10: classify and package --------------------------
        let outputs = classify_tables(&results)?;
        stats.tables_total = outputs.len();
        for table in &outputs {
            if table.clean {
                stats.tables_resolved += 1;
                stats.hands_resolved += table.hand_ids.len();
            } else {
                stats.tables_incomplete += 1;
                stats.hands_incomplete += table.hand_ids.len();
                stats.residual_ids.extend(table.residual_ids.iter().cloned());
            }
        }
        stats.residual_ids.sort();
        stats.residual_ids.dedup();
        let packaged = write_outputs(&inputs.output_dir, &outputs).await?;
        logs.info(format!(
            "packaged {} resolved and {} incomplete tables",
            stats.tables_resolved, stats.tables_incomplete
        ));
        self.phase_boundary(job_id, &logs, &progress).await?;

        Ok((stats, packaged))
    }

    /// Writes scan results into the shot states and persists each row.
    /// An authentication failure aborts the job; there is no degraded
    /// mode without a credential.
    async fn absorb_scan_sweep(
        &self,
        job_id: JobId,
        shots: &mut BTreeMap<String, ShotState>,
        results: HashMap<String, Result<TableScan, VisionError>>,
        logs: &JobLogBuffer,
    ) -> Result<(), PipelineError> {
        for (id, result) in results {
            let Some(shot) = shots.get_mut(&id) else {
                continue;
            };
            match result {
                Ok(scan) => {
                    if scan.hand_id.is_none() {
                        logs.warn(format!("screenshot {id}: no hand id readable"));
                    }
                    shot.scan = Some(scan);
                    shot.ocr1_error = None;
                }
                Err(VisionError::AuthMissing) => {
                    return Err(PipelineError::Vision(VisionError::AuthMissing));
                }
                Err(err) => {
                    logs.warn(format!("screenshot {id}: phase-1 OCR failed: {err}"));
                    shot.ocr1_error = Some(err.to_string());
                }
            }
            self.store.upsert_screenshot(shot.record(job_id)).await?;
        }
        Ok(())
    }

    /// Recomputes matching over the current scans and persists the
    /// assignment columns.
    async fn run_matching(
        &self,
        job_id: JobId,
        hands: &[Hand],
        shots: &mut BTreeMap<String, ShotState>,
    ) -> Result<MatchReport, PipelineError> {
        // a failed scan still leaves the filename and timestamp to match on
        let facts: Vec<ScreenFacts> = shots
            .values()
            .map(|s| ScreenFacts {
                screenshot_id: s.input.id.clone(),
                scan: s.scan.clone().unwrap_or_default(),
                captured_at: s.input.captured_at,
            })
            .collect();
        let report = match_screenshots(hands, &facts, &self.config);

        for shot in shots.values_mut() {
            shot.matched_hand_id = None;
            shot.match_source = None;
            shot.match_score = None;
            shot.discard_reason = None;
        }
        for m in &report.matches {
            if let Some(shot) = shots.get_mut(&m.screenshot_id) {
                shot.matched_hand_id = Some(m.hand_id.clone());
                shot.match_source = Some(m.source.as_str());
                shot.match_score = Some(m.score);
            }
        }
        for shot in shots.values() {
            self.store.upsert_screenshot(shot.record(job_id)).await?;
        }
        Ok(report)
    }

    async fn phase_boundary(
        &self,
        job_id: JobId,
        logs: &Arc<JobLogBuffer>,
        progress: &Arc<ProgressCounter>,
    ) -> Result<(), StoreError> {
        let _ = logs.flush(&self.store).await;
        let (processed, total) = progress.snapshot();
        self.store
            .set_progress(job_id, processed as u32, total as u32)
            .await
    }
}

fn check_limit(kind: &'static str, given: usize, limit: usize) -> Result<(), PipelineError> {
    if given > limit {
        return Err(PipelineError::InputLimit { kind, given, limit });
    }
    Ok(())
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

fn panic_detail(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
