//! Drives the vision capability over a batch of screenshots with bounded
//! concurrency. Both phases share one semaphore; retry sequencing and
//! persistence belong to the orchestrator.

pub mod progress;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::vision::{ImageRef, PlayerScan, TableScan, VisionClient, VisionError};

pub use progress::ProgressCounter;

const LOG_TARGET: &str = "ocr";

/// Outcome of one bounded-parallel pass. Screenshots skipped because of
/// cancellation are simply absent from `results`.
pub struct Sweep<T> {
    pub results: HashMap<String, Result<T, VisionError>>,
    pub cancelled: bool,
}

/// Phase 1: scan every target for its hand id and anonymous table state.
pub async fn scan_screenshots(
    vision: Arc<dyn VisionClient>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    call_timeout: Duration,
    targets: Vec<(String, ImageRef)>,
    progress: Arc<ProgressCounter>,
) -> Sweep<TableScan> {
    sweep(
        targets,
        cancel,
        progress,
        move |image| {
            let vision = Arc::clone(&vision);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                bounded_call(call_timeout, vision.scan_table(&image)).await
            }
        },
    )
    .await
}

/// Phase 2: extract player names for already-matched targets.
///
/// Callers must pass matched screenshots only; running this on an
/// unanchored screenshot doubles vendor cost and lets OCR noise into the
/// mapping. Payloads failing the shape check come back as
/// [`VisionError::Schema`].
pub async fn extract_players(
    vision: Arc<dyn VisionClient>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    call_timeout: Duration,
    targets: Vec<(String, ImageRef)>,
    progress: Arc<ProgressCounter>,
) -> Sweep<PlayerScan> {
    sweep(
        targets,
        cancel,
        progress,
        move |image| {
            let vision = Arc::clone(&vision);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                let scan = bounded_call(call_timeout, vision.extract_players(&image)).await?;
                scan.validate().map(|_| scan)
            }
        },
    )
    .await
}

async fn bounded_call<T>(
    call_timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, VisionError>>,
) -> Result<T, VisionError> {
    match tokio::time::timeout(call_timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(VisionError::Timeout(call_timeout)),
    }
}

async fn sweep<T, F, Fut>(
    targets: Vec<(String, ImageRef)>,
    cancel: CancellationToken,
    progress: Arc<ProgressCounter>,
    call: F,
) -> Sweep<T>
where
    T: Send + Sync + Clone + 'static,
    F: Fn(ImageRef) -> Fut + Clone + Send + 'static,
    Fut: std::future::Future<Output = Result<T, VisionError>> + Send,
{
    let results: Arc<DashMap<String, Result<T, VisionError>>> = Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();

    for (id, image) in targets {
        let cancel = cancel.clone();
        let results = Arc::clone(&results);
        let progress = Arc::clone(&progress);
        let call = call.clone();
        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = call(image) => outcome,
            };
            debug!(
                target: LOG_TARGET,
                screenshot = %id,
                ok = outcome.is_ok(),
                "vision call finished"
            );
            progress.mark_done();
            results.insert(id, outcome);
        });
    }

    while tasks.join_next().await.is_some() {}

    let results = match Arc::try_unwrap(results) {
        Ok(map) => map.into_iter().collect(),
        Err(shared) => shared
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect(),
    };

    Sweep {
        results,
        cancelled: cancel.is_cancelled(),
    }
}
