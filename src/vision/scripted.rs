//! Deterministic stand-in for the vendor service, used by the end-to-end
//! tests and by dry runs. Results are keyed by the image label.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{ImageRef, PlayerScan, TableScan, VisionClient, VisionError};

#[derive(Default)]
pub struct ScriptedVisionClient {
    scans: DashMap<String, VecDeque<Result<TableScan, VisionError>>>,
    players: DashMap<String, Result<PlayerScan, VisionError>>,
    scan_calls: AtomicUsize,
    extract_calls: AtomicUsize,
    extract_log: Mutex<Vec<String>>,
}

impl ScriptedVisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the phase-1 result for `label`. Repeated calls queue
    /// results in order; the last one repeats once the queue drains.
    pub fn with_scan(self, label: &str, result: Result<TableScan, VisionError>) -> Self {
        self.scans.entry(label.to_string()).or_default().push_back(result);
        self
    }

    pub fn with_players(self, label: &str, result: Result<PlayerScan, VisionError>) -> Self {
        self.players.insert(label.to_string(), result);
        self
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    /// Image labels phase 2 was invoked for, in call order.
    pub fn extracted_labels(&self) -> Vec<String> {
        self.extract_log.lock().clone()
    }
}

#[async_trait::async_trait]
impl VisionClient for ScriptedVisionClient {
    async fn scan_table(&self, image: &ImageRef) -> Result<TableScan, VisionError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let label = image.label();
        match self.scans.get_mut(&label) {
            Some(mut queue) => {
                if queue.len() > 1 {
                    queue.pop_front().expect("non-empty queue")
                } else {
                    queue.front().cloned().expect("non-empty queue")
                }
            }
            None => Ok(TableScan::default()),
        }
    }

    async fn extract_players(&self, image: &ImageRef) -> Result<PlayerScan, VisionError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let label = image.label();
        self.extract_log.lock().push(label.clone());
        match self.players.get(&label) {
            Some(result) => result.clone(),
            None => Ok(PlayerScan::default()),
        }
    }
}
