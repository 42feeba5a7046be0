//! Shared fixtures for the unit and end-to-end tests.

use chrono::NaiveDateTime;

use crate::config::PipelineConfig;
use crate::hands::types::{Hand, Roles, Seat, Stakes};
use crate::vision::{PlayerScan, TableScan};

pub fn ts(text: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M:%S").expect("test timestamp")
}

/// The canonical three-handed cash hand used across the suite: Hero on
/// the button at seat 3, small blind at seat 2, big blind at seat 1.
pub fn sample_hand_text() -> String {
    sample_hand_text_with("RC1001", "RushAndCash88")
}

pub fn sample_hand_text_with(hand_id: &str, table: &str) -> String {
    [
        format!("Poker Hand #{hand_id}: Hold'em No Limit ($0.05/$0.1) - 2024/01/20 17:38:25"),
        format!("Table '{table}' 6-max Seat #3 is the button"),
        "Seat 1: e3efcaed ($10.25 in chips)".to_string(),
        "Seat 2: 5641b4a0 ($8.4 in chips)".to_string(),
        "Seat 3: Hero ($10 in chips)".to_string(),
        "5641b4a0: posts small blind $0.05".to_string(),
        "e3efcaed: posts big blind $0.1".to_string(),
        "*** HOLE CARDS ***".to_string(),
        "Dealt to Hero [Ah Kd]".to_string(),
        "Hero: raises $0.2 to $0.3".to_string(),
        "5641b4a0: calls $0.25".to_string(),
        "e3efcaed: folds".to_string(),
        "*** FLOP *** [2c 7d Jh]".to_string(),
        "5641b4a0: checks".to_string(),
        "Hero: bets $0.45".to_string(),
        "5641b4a0: folds".to_string(),
        "Uncalled bet ($0.45) returned to Hero".to_string(),
        "Hero collected $0.67 from pot".to_string(),
        "Hero: doesn't show hand".to_string(),
        "*** SUMMARY ***".to_string(),
        "Total pot $0.7 | Rake $0.03".to_string(),
        "Board [2c 7d Jh]".to_string(),
        "Seat 1: e3efcaed (big blind) folded before Flop".to_string(),
        "Seat 2: 5641b4a0 (small blind) folded on the Flop".to_string(),
        "Seat 3: Hero (button) collected ($0.67)".to_string(),
        String::new(),
    ]
    .join("\n")
}

/// Parses the canonical hand out of [`sample_hand_text`].
pub fn sample_hand() -> Hand {
    crate::hands::parse_file("cash.txt", &sample_hand_text())
        .expect("sample parses")
        .hands
        .remove(0)
}

/// Direct construction for matcher/mapper tests that do not need real
/// text. Seats are `(number, alias, stack)`.
#[allow(clippy::too_many_arguments)]
pub fn hand_with(
    hand_id: &str,
    table: Option<&str>,
    seats: &[(u8, &str, f64)],
    button: Option<u8>,
    small_blind: Option<u8>,
    big_blind: Option<u8>,
    hero_cards: &[&str],
    board: &[&str],
    timestamp: NaiveDateTime,
) -> Hand {
    let seats: Vec<Seat> = seats
        .iter()
        .map(|(number, alias, stack)| Seat {
            number: *number,
            alias: alias.to_string(),
            starting_stack: *stack,
        })
        .collect();
    let hero_seat = seats
        .iter()
        .find(|s| s.alias == "Hero")
        .expect("fixture needs a hero seat")
        .number;
    Hand {
        hand_id: hand_id.to_string(),
        table_name: table.map(str::to_string),
        stakes: Stakes {
            small_blind: 0.05,
            big_blind: 0.1,
            currency: "$".to_string(),
        },
        timestamp,
        seats,
        roles: Roles {
            button_seat: button,
            small_blind_seat: small_blind,
            big_blind_seat: big_blind,
        },
        hero_seat,
        hero_hole_cards: hero_cards.iter().map(|c| c.to_string()).collect(),
        board_cards: board.iter().map(|c| c.to_string()).collect(),
        raw_text: format!("Poker Hand #{hand_id}: fixture"),
        source_file: "fixture.txt".to_string(),
    }
}

pub fn scan_with(hand_id: Option<&str>, stacks: &[f64]) -> TableScan {
    TableScan {
        hand_id: hand_id.map(str::to_string),
        stacks: stacks.to_vec(),
        ..Default::default()
    }
}

/// Phase-2 payload for the canonical three-handed hand: Hero bottom,
/// then counter-clockwise as the client renders them.
pub fn sample_player_scan() -> PlayerScan {
    PlayerScan {
        players: vec![
            "TuichAAreko".to_string(),
            "v1[nn]1".to_string(),
            "Gyodong22".to_string(),
        ],
        stacks: Some(vec![10.0, 8.4, 10.25]),
        dealer_player: Some("TuichAAreko".to_string()),
        small_blind_player: Some("v1[nn]1".to_string()),
        big_blind_player: Some("Gyodong22".to_string()),
    }
}

pub fn config() -> PipelineConfig {
    PipelineConfig::default()
}
