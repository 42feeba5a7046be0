use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Runtime configuration for one pipeline run.
///
/// Carried by value into the orchestrator; there is no process-wide
/// configuration state. The defaults mirror the operator tiers the tool
/// ships with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Permits for the vision semaphore shared by both OCR phases.
    pub ocr_concurrency: usize,

    /// Minimum score (0-100) at which a scored fallback match is accepted.
    pub scored_match_threshold: f64,

    /// Relative tolerance when comparing the hero stack between a
    /// screenshot and a hand.
    pub stack_tolerance_hero: f64,

    /// Relative tolerance when aligning non-hero stacks.
    pub stack_tolerance_general: f64,

    /// Fraction of screenshot stacks that must align with some seat stack
    /// for a match to be accepted.
    pub stack_alignment_ratio: f64,

    /// Delay before a phase-1 scan is retried.
    pub ocr1_retry_delay_ms: u64,

    /// Additional phase-1 scan attempts per screenshot after the first.
    pub ocr1_max_retries: u32,

    /// Hand-id prefixes stripped before identity comparison.
    pub hand_id_prefixes: BTreeSet<String>,

    /// Seconds of clock skew allowed by the timestamp-proximity feature.
    pub timestamp_window_secs: i64,

    /// Per-call wall clock bound for vision requests.
    pub ocr_call_timeout_secs: u64,

    /// Upper bounds on accepted input batches, by account tier.
    pub input_limits: InputLimits,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InputLimits {
    pub max_hand_files: usize,
    pub max_screenshots: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_concurrency: 10,
            scored_match_threshold: 70.0,
            stack_tolerance_hero: 0.25,
            stack_tolerance_general: 0.30,
            stack_alignment_ratio: 0.50,
            ocr1_retry_delay_ms: 1_000,
            ocr1_max_retries: 1,
            hand_id_prefixes: ["RC", "OM", "TM", "HD", "SG", "MT", "TT"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            timestamp_window_secs: 90,
            ocr_call_timeout_secs: 45,
            input_limits: InputLimits::free_tier(),
        }
    }
}

impl InputLimits {
    pub fn free_tier() -> Self {
        Self {
            max_hand_files: 20,
            max_screenshots: 60,
        }
    }

    pub fn paid_tier() -> Self {
        Self {
            max_hand_files: 500,
            max_screenshots: 2_000,
        }
    }
}
