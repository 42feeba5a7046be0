use serde::{Deserialize, Serialize};

/// Final per-job summary surfaced to the caller and persisted with the
/// job row.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobStatistics {
    pub files_total: usize,
    pub hands_parsed: usize,
    pub hands_skipped: usize,

    pub screenshots_total: usize,
    pub ocr1_failures: usize,
    pub ocr1_retries: usize,

    pub matched_screenshots: usize,
    pub identity_matches: usize,
    pub scored_matches: usize,
    pub gate_rejections: usize,
    pub discarded_screenshots: usize,

    pub ocr2_failures: usize,
    pub hand_mappings: usize,
    pub duplicate_discards: usize,
    pub mapping_conflicts: usize,

    pub tables_total: usize,
    pub tables_resolved: usize,
    pub tables_incomplete: usize,
    pub hands_resolved: usize,
    pub hands_incomplete: usize,
    pub residual_ids: Vec<String>,
}
