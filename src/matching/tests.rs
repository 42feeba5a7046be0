#![cfg(test)]

use super::gates::{check, GateFailure};
use super::score::score_candidate;
use super::{match_screenshots, MatchSource, ScreenFacts};
use crate::test_utils::{config, hand_with, sample_hand, scan_with, ts};
use crate::vision::TableScan;

fn facts(id: &str, scan: TableScan) -> ScreenFacts {
    ScreenFacts {
        screenshot_id: id.to_string(),
        scan,
        captured_at: None,
    }
}

#[test]
fn identity_match_by_hand_id() {
    let hands = vec![sample_hand()];
    let screens = vec![facts("shot-1", scan_with(Some("RC1001"), &[10.0, 8.4, 10.25]))];

    let report = match_screenshots(&hands, &screens, &config());
    assert_eq!(report.matches.len(), 1);
    let m = &report.matches[0];
    assert_eq!(m.hand_id, "RC1001");
    assert_eq!(m.screenshot_id, "shot-1");
    assert_eq!(m.source, MatchSource::HandId);
    assert_eq!(m.score, 100.0);
}

#[test]
fn identity_match_tolerates_stripped_prefix() {
    let hands = vec![sample_hand()];
    // the scan read the digits but missed the RC prefix
    let screens = vec![facts("shot-1", scan_with(Some("1001"), &[10.0, 8.4, 10.25]))];

    let report = match_screenshots(&hands, &screens, &config());
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].source, MatchSource::HandId);
}

#[test]
fn filename_match_when_scan_is_empty() {
    let hands = vec![sample_hand()];
    let screens = vec![facts("table_RC1001_final", scan_with(None, &[10.0, 8.4, 10.25]))];

    let report = match_screenshots(&hands, &screens, &config());
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].source, MatchSource::Filename);
}

#[test]
fn player_count_gate_rejects_identity_match() {
    let hands = vec![hand_with(
        "RC2002",
        Some("RushAndCash88"),
        &[(1, "aabbcc11", 10.0), (2, "Hero", 10.0)],
        Some(1),
        Some(1),
        Some(2),
        &[],
        &[],
        ts("2024/01/20 17:38:25"),
    )];
    // three visible stacks against a two-seat hand
    let screens = vec![facts("shot-1", scan_with(Some("RC2002"), &[10.0, 9.0, 11.0]))];

    let report = match_screenshots(&hands, &screens, &config());
    assert!(report.matches.is_empty());
    assert_eq!(report.rejections.len(), 1);
    assert!(matches!(
        report.rejections[0].failure,
        GateFailure::PlayerCount {
            screenshot: 3,
            hand: 2
        }
    ));
}

#[test]
fn hero_stack_gate() {
    let hand = sample_hand();
    // hero stack off by 50% against a 25% tolerance
    let scan = scan_with(Some("RC1001"), &[15.0, 8.4, 10.25]);
    let failure = check(&hand, &scan, &config()).unwrap_err();
    assert!(matches!(failure, GateFailure::HeroStack { .. }));
}

#[test]
fn stack_alignment_gate() {
    let hand = sample_hand();
    // right count, hero believable, other stacks nowhere near the hand
    let scan = scan_with(Some("RC1001"), &[10.0, 80.0, 95.0]);
    let failure = check(&hand, &scan, &config()).unwrap_err();
    assert!(matches!(
        failure,
        GateFailure::StackAlignment {
            aligned: 1,
            visible: 3
        }
    ));
}

#[test]
fn gates_pass_vacuously_without_stack_evidence() {
    let hand = sample_hand();
    let scan = scan_with(Some("RC1001"), &[]);
    assert!(check(&hand, &scan, &config()).is_ok());
}

#[test]
fn scored_fallback_accepts_strong_candidate() {
    let hand = hand_with(
        "RC3003",
        Some("RushAndCash88"),
        &[(1, "aabbcc11", 10.25), (2, "bbccdd22", 8.4), (3, "Hero", 10.0)],
        Some(3),
        Some(2),
        Some(1),
        &["Ah", "Kd"],
        &["2c", "7d", "Jh"],
        ts("2024/01/20 17:38:25"),
    );
    let scan = TableScan {
        hand_id: None,
        hero_cards: vec!["Kd".into(), "Ah".into()],
        board_cards: vec!["2c".into(), "7d".into(), "Jh".into()],
        stacks: vec![10.0, 8.4, 10.25],
        player_count: None,
    };
    let breakdown = score_candidate(&hand, "shot-9", &scan, Some(ts("2024/01/20 17:38:50")), &config());
    // cards 40 + board 30 + position 15 + timestamp 10 + hero stack 2
    assert_eq!(breakdown.total(), 97.0);

    let screens = vec![ScreenFacts {
        screenshot_id: "shot-9".into(),
        scan,
        captured_at: Some(ts("2024/01/20 17:38:50")),
    }];
    let report = match_screenshots(&[hand], &screens, &config());
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].source, MatchSource::Scored);
    assert_eq!(report.matches[0].score, 97.0);
}

#[test]
fn scored_fallback_respects_threshold() {
    let hand = hand_with(
        "RC3004",
        Some("RushAndCash88"),
        &[(1, "aabbcc11", 10.25), (2, "bbccdd22", 8.4), (3, "Hero", 10.0)],
        Some(3),
        Some(2),
        Some(1),
        &["Ah", "Kd"],
        &["2c", "7d", "Jh"],
        ts("2024/01/20 17:38:25"),
    );
    // board + position + stack only: 47 < 70
    let scan = TableScan {
        hand_id: None,
        hero_cards: vec![],
        board_cards: vec!["2c".into(), "7d".into(), "Jh".into()],
        stacks: vec![10.0, 8.4, 10.25],
        player_count: None,
    };
    let screens = vec![facts("shot-9", scan)];
    let report = match_screenshots(&[hand], &screens, &config());
    assert!(report.matches.is_empty());
    assert!(report.rejections.is_empty());
}

#[test]
fn board_prefix_must_be_ordered() {
    let hand = hand_with(
        "RC3005",
        None,
        &[(3, "Hero", 10.0)],
        None,
        None,
        None,
        &[],
        &["2c", "7d", "Jh", "5s", "Qd"],
        ts("2024/01/20 17:38:25"),
    );
    let flop_scan = TableScan {
        board_cards: vec!["2c".into(), "7d".into(), "Jh".into()],
        ..Default::default()
    };
    let wrong_order = TableScan {
        board_cards: vec!["7d".into(), "2c".into(), "Jh".into()],
        ..Default::default()
    };
    let cfg = config();
    assert_eq!(score_candidate(&hand, "s", &flop_scan, None, &cfg).board, 30.0);
    assert_eq!(score_candidate(&hand, "s", &wrong_order, None, &cfg).board, 0.0);
}

#[test]
fn each_screenshot_anchors_at_most_one_hand() {
    let first = sample_hand();
    let mut second = sample_hand();
    second.hand_id = "RC1002".to_string();
    second.raw_text = second.raw_text.replace("RC1001", "RC1002");

    let screens = vec![
        facts("shot-a", scan_with(Some("RC1001"), &[10.0, 8.4, 10.25])),
        facts("shot-b", scan_with(Some("RC1001"), &[10.0, 8.4, 10.25])),
    ];
    let report = match_screenshots(&[first, second], &screens, &config());
    // both scans read the same id; only one may anchor the hand
    assert_eq!(report.matches.len(), 1);
    assert_eq!(report.matches[0].screenshot_id, "shot-a");
}

#[test]
fn deterministic_over_screenshot_ordering() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let hands = vec![sample_hand()];
    let mut screens: Vec<ScreenFacts> = (0..6)
        .map(|i| facts(&format!("shot-{i}"), scan_with(Some("RC1001"), &[10.0, 8.4, 10.25])))
        .collect();

    let baseline = match_screenshots(&hands, &screens, &config());
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    for _ in 0..5 {
        screens.shuffle(&mut rng);
        let shuffled = match_screenshots(&hands, &screens, &config());
        assert_eq!(
            baseline.matches[0].screenshot_id,
            shuffled.matches[0].screenshot_id
        );
    }
}
