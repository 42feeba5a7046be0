use chrono::NaiveDateTime;

use crate::config::PipelineConfig;
use crate::hands::normalize::{table_key, within_tolerance, UNKNOWN_TABLE};
use crate::hands::Hand;
use crate::vision::TableScan;

const W_HERO_CARDS: f64 = 40.0;
const W_BOARD: f64 = 30.0;
const W_HERO_POSITION: f64 = 15.0;
const W_TIMESTAMP: f64 = 10.0;
const W_NAME_OVERLAP: f64 = 3.0;
const W_HERO_STACK: f64 = 2.0;

/// Weighted evidence that a screenshot captures a given hand. Weights sum
/// to 100; the per-feature values are kept for log lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreBreakdown {
    pub hero_cards: f64,
    pub board: f64,
    pub hero_position: f64,
    pub timestamp: f64,
    pub name_overlap: f64,
    pub hero_stack: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.hero_cards
            + self.board
            + self.hero_position
            + self.timestamp
            + self.name_overlap
            + self.hero_stack
    }
}

pub fn score_candidate(
    hand: &Hand,
    screenshot_id: &str,
    scan: &TableScan,
    captured_at: Option<NaiveDateTime>,
    config: &PipelineConfig,
) -> ScoreBreakdown {
    let mut score = ScoreBreakdown::default();

    if hero_cards_match(&hand.hero_hole_cards, &scan.hero_cards) {
        score.hero_cards = W_HERO_CARDS;
    }

    if board_prefix_match(&hand.board_cards, &scan.board_cards) {
        score.board = W_BOARD;
    }

    let hero_stack_consistent = scan
        .hero_stack()
        .map(|observed| within_tolerance(observed, hand.hero_stack(), config.stack_tolerance_hero))
        .unwrap_or(false);

    // hero is rendered at the bottom: parity of the seat count plus a
    // believable bottom stack is the visual-position evidence available
    // before any name has been read
    if scan.visible_players() == Some(hand.seat_count()) && hero_stack_consistent {
        score.hero_position = W_HERO_POSITION;
    }

    if let Some(at) = captured_at {
        let drift = (at - hand.timestamp).num_seconds().abs();
        if drift <= config.timestamp_window_secs {
            score.timestamp = W_TIMESTAMP;
        }
    }

    let table = table_key(hand.table_name.as_deref());
    if table != UNKNOWN_TABLE
        && screenshot_id
            .to_ascii_lowercase()
            .contains(&table.to_ascii_lowercase())
    {
        score.name_overlap = W_NAME_OVERLAP;
    }

    if hero_stack_consistent {
        score.hero_stack = W_HERO_STACK;
    }

    score
}

fn hero_cards_match(hand_cards: &[String], scan_cards: &[String]) -> bool {
    if hand_cards.len() != 2 || scan_cards.len() != 2 {
        return false;
    }
    let mut a: Vec<String> = hand_cards.iter().map(|c| c.to_ascii_lowercase()).collect();
    let mut b: Vec<String> = scan_cards.iter().map(|c| c.to_ascii_lowercase()).collect();
    a.sort();
    b.sort();
    a == b
}

/// The screenshot freezes one street: its board must be a non-empty
/// ordered prefix of the hand's final board.
fn board_prefix_match(hand_board: &[String], scan_board: &[String]) -> bool {
    if scan_board.is_empty() || scan_board.len() > hand_board.len() {
        return false;
    }
    scan_board
        .iter()
        .zip(hand_board)
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}
