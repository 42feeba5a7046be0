use std::fmt;

use crate::config::PipelineConfig;
use crate::hands::normalize::within_tolerance;
use crate::hands::Hand;
use crate::vision::TableScan;

/// Why a candidate pairing was refused. Gates only fire on evidence the
/// scan actually carries; a scan with no stack reads passes vacuously.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateFailure {
    PlayerCount { screenshot: usize, hand: usize },
    HeroStack { screenshot: f64, hand: f64 },
    StackAlignment { aligned: usize, visible: usize },
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::PlayerCount { screenshot, hand } => write!(
                f,
                "player count mismatch: screenshot shows {screenshot}, hand seats {hand}"
            ),
            GateFailure::HeroStack { screenshot, hand } => write!(
                f,
                "hero stack mismatch: screenshot {screenshot}, hand {hand}"
            ),
            GateFailure::StackAlignment { aligned, visible } => write!(
                f,
                "stack alignment too weak: {aligned} of {visible} stacks aligned"
            ),
        }
    }
}

/// Acceptance gates, applied to every candidate including identity
/// matches.
pub fn check(hand: &Hand, scan: &TableScan, config: &PipelineConfig) -> Result<(), GateFailure> {
    if let Some(visible) = scan.visible_players() {
        if visible != hand.seat_count() {
            return Err(GateFailure::PlayerCount {
                screenshot: visible,
                hand: hand.seat_count(),
            });
        }
    }

    if let Some(observed) = scan.hero_stack() {
        if !within_tolerance(observed, hand.hero_stack(), config.stack_tolerance_hero) {
            return Err(GateFailure::HeroStack {
                screenshot: observed,
                hand: hand.hero_stack(),
            });
        }
    }

    if !scan.stacks.is_empty() {
        let aligned = scan
            .stacks
            .iter()
            .filter(|observed| {
                hand.seats.iter().any(|seat| {
                    within_tolerance(**observed, seat.starting_stack, config.stack_tolerance_general)
                })
            })
            .count();
        let ratio = aligned as f64 / scan.stacks.len() as f64;
        if ratio < config.stack_alignment_ratio {
            return Err(GateFailure::StackAlignment {
                aligned,
                visible: scan.stacks.len(),
            });
        }
    }

    Ok(())
}
