//! Binds screenshots to hands: identity by hand id, identity by
//! filename, then the scored fallback. Every candidate passes the
//! acceptance gates before it sticks.

pub mod gates;
pub mod score;

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::hands::normalize::normalized_hand_id;
use crate::hands::Hand;
use crate::vision::TableScan;

pub use gates::GateFailure;
pub use score::{score_candidate, ScoreBreakdown};

const LOG_TARGET: &str = "matching";

/// Everything the matcher may consult about one screenshot.
#[derive(Clone, Debug)]
pub struct ScreenFacts {
    pub screenshot_id: String,
    pub scan: TableScan,
    pub captured_at: Option<NaiveDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchSource {
    HandId,
    Filename,
    Scored,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchSource::HandId => "HAND_ID",
            MatchSource::Filename => "FILENAME",
            MatchSource::Scored => "SCORED",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandMatch {
    pub hand_id: String,
    pub screenshot_id: String,
    pub source: MatchSource,
    pub score: f64,
}

#[derive(Clone, Debug)]
pub struct GateRejection {
    pub screenshot_id: String,
    pub hand_id: String,
    pub source: MatchSource,
    pub failure: GateFailure,
}

#[derive(Clone, Debug, Default)]
pub struct MatchReport {
    pub matches: Vec<HandMatch>,
    pub rejections: Vec<GateRejection>,
}

impl MatchReport {
    pub fn screenshot_for(&self, hand_id: &str) -> Option<&HandMatch> {
        self.matches.iter().find(|m| m.hand_id == hand_id)
    }

    pub fn is_matched_screenshot(&self, screenshot_id: &str) -> bool {
        self.matches.iter().any(|m| m.screenshot_id == screenshot_id)
    }
}

/// Runs the three matching passes over all hands and screenshots.
///
/// Screenshots are visited sorted by id so the outcome is deterministic
/// for a given input set. Each hand ends up with at most one screenshot
/// and each screenshot anchors at most one hand.
pub fn match_screenshots(
    hands: &[Hand],
    screens: &[ScreenFacts],
    config: &PipelineConfig,
) -> MatchReport {
    let mut report = MatchReport::default();
    let mut taken_hands: HashSet<usize> = HashSet::new();
    let mut taken_screens: HashSet<usize> = HashSet::new();

    let mut screen_order: Vec<usize> = (0..screens.len()).collect();
    screen_order.sort_by(|a, b| screens[*a].screenshot_id.cmp(&screens[*b].screenshot_id));

    // first hand wins a duplicated id; later duplicates never match
    let mut hand_by_norm: HashMap<String, usize> = HashMap::new();
    for (idx, hand) in hands.iter().enumerate() {
        hand_by_norm
            .entry(normalized_hand_id(&hand.hand_id, &config.hand_id_prefixes))
            .or_insert(idx);
    }

    // Pass 1: identity by scanned hand id.
    for &si in &screen_order {
        let screen = &screens[si];
        let Some(scan_id) = screen.scan.hand_id.as_deref() else {
            continue;
        };
        let norm = normalized_hand_id(scan_id, &config.hand_id_prefixes);
        let Some(&hi) = hand_by_norm.get(&norm) else {
            continue;
        };
        if taken_hands.contains(&hi) {
            continue;
        }
        try_accept(
            &mut report,
            &mut taken_hands,
            &mut taken_screens,
            hands,
            screens,
            hi,
            si,
            MatchSource::HandId,
            100.0,
            config,
        );
    }

    // Pass 2: identity by filename.
    for &si in &screen_order {
        if taken_screens.contains(&si) {
            continue;
        }
        let screen = &screens[si];
        for (hi, hand) in hands.iter().enumerate() {
            if taken_hands.contains(&hi) {
                continue;
            }
            let norm = normalized_hand_id(&hand.hand_id, &config.hand_id_prefixes);
            if !screen.screenshot_id.contains(&hand.hand_id)
                && !screen.screenshot_id.contains(&norm)
            {
                continue;
            }
            let accepted = try_accept(
                &mut report,
                &mut taken_hands,
                &mut taken_screens,
                hands,
                screens,
                hi,
                si,
                MatchSource::Filename,
                100.0,
                config,
            );
            if accepted {
                break;
            }
        }
    }

    // Pass 3: scored fallback over what is left.
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for &si in &screen_order {
        if taken_screens.contains(&si) {
            continue;
        }
        let screen = &screens[si];
        for (hi, hand) in hands.iter().enumerate() {
            if taken_hands.contains(&hi) {
                continue;
            }
            let breakdown = score_candidate(
                hand,
                &screen.screenshot_id,
                &screen.scan,
                screen.captured_at,
                config,
            );
            let total = breakdown.total();
            if total >= config.scored_match_threshold {
                candidates.push((total, si, hi));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| screens[a.1].screenshot_id.cmp(&screens[b.1].screenshot_id))
            .then_with(|| a.2.cmp(&b.2))
    });
    for (total, si, hi) in candidates {
        if taken_screens.contains(&si) || taken_hands.contains(&hi) {
            continue;
        }
        try_accept(
            &mut report,
            &mut taken_hands,
            &mut taken_screens,
            hands,
            screens,
            hi,
            si,
            MatchSource::Scored,
            total,
            config,
        );
    }

    info!(
        target: LOG_TARGET,
        hands = hands.len(),
        screenshots = screens.len(),
        matched = report.matches.len(),
        gate_rejections = report.rejections.len(),
        "matching complete"
    );

    report
}

#[allow(clippy::too_many_arguments)]
fn try_accept(
    report: &mut MatchReport,
    taken_hands: &mut HashSet<usize>,
    taken_screens: &mut HashSet<usize>,
    hands: &[Hand],
    screens: &[ScreenFacts],
    hi: usize,
    si: usize,
    source: MatchSource,
    score: f64,
    config: &PipelineConfig,
) -> bool {
    let hand = &hands[hi];
    let screen = &screens[si];
    match gates::check(hand, &screen.scan, config) {
        Ok(()) => {
            taken_hands.insert(hi);
            taken_screens.insert(si);
            report.matches.push(HandMatch {
                hand_id: hand.hand_id.clone(),
                screenshot_id: screen.screenshot_id.clone(),
                source,
                score,
            });
            true
        }
        Err(failure) => {
            warn!(
                target: LOG_TARGET,
                hand_id = %hand.hand_id,
                screenshot = %screen.screenshot_id,
                source = source.as_str(),
                %failure,
                "match rejected by acceptance gate"
            );
            report.rejections.push(GateRejection {
                screenshot_id: screen.screenshot_id.clone(),
                hand_id: hand.hand_id.clone(),
                source,
                failure,
            });
            false
        }
    }
}
