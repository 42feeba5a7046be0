#![cfg(test)]

use super::aggregate::{aggregate_tables, mapping_for};
use super::{map_hand, HandMapping, MapError, MappingStrategy};
use crate::hands::normalize::table_key;
use crate::test_utils::{hand_with, sample_hand, sample_player_scan, ts};
use crate::vision::PlayerScan;

#[test]
fn role_based_mapping_three_roles() {
    let hand = sample_hand();
    let mapping = map_hand(&hand, &sample_player_scan(), "shot-1").unwrap();

    assert_eq!(mapping.strategy, MappingStrategy::RoleBased);
    assert_eq!(mapping.roles_populated, 3);
    assert_eq!(mapping.names.len(), 3);
    assert_eq!(mapping.names["Hero"], "TuichAAreko");
    assert_eq!(mapping.names["5641b4a0"], "v1[nn]1");
    assert_eq!(mapping.names["e3efcaed"], "Gyodong22");
}

#[test]
fn dealer_only_derives_blinds_clockwise() {
    let hand = sample_hand();
    let scan = PlayerScan {
        small_blind_player: None,
        big_blind_player: None,
        ..sample_player_scan()
    };
    let mapping = map_hand(&hand, &scan, "shot-1").unwrap();

    assert_eq!(mapping.strategy, MappingStrategy::RoleBased);
    // SB = dealer + 1, BB = dealer + 2 over the visual order
    assert_eq!(mapping.names["Hero"], "TuichAAreko");
    assert_eq!(mapping.names["5641b4a0"], "v1[nn]1");
    assert_eq!(mapping.names["e3efcaed"], "Gyodong22");
}

#[test]
fn rotation_fallback_when_roles_missing() {
    let hand = sample_hand();
    let scan = PlayerScan {
        dealer_player: None,
        small_blind_player: None,
        big_blind_player: None,
        ..sample_player_scan()
    };
    let mapping = map_hand(&hand, &scan, "shot-1").unwrap();

    assert_eq!(mapping.strategy, MappingStrategy::Rotation);
    assert_eq!(mapping.roles_populated, 0);
    assert_eq!(mapping.names["Hero"], "TuichAAreko");
    assert_eq!(mapping.names["5641b4a0"], "v1[nn]1");
    assert_eq!(mapping.names["e3efcaed"], "Gyodong22");
}

#[test]
fn single_blind_marker_is_not_enough_for_roles() {
    let hand = sample_hand();
    let scan = PlayerScan {
        dealer_player: None,
        small_blind_player: None,
        ..sample_player_scan()
    };
    // one role anchor only: falls back to rotation, which still covers
    // every visible player
    let mapping = map_hand(&hand, &scan, "shot-1").unwrap();
    assert_eq!(mapping.strategy, MappingStrategy::Rotation);
    assert_eq!(mapping.names.len(), 3);
}

#[test]
fn duplicate_name_discards_mapping() {
    let hand = sample_hand();
    let scan = PlayerScan {
        // the history panel got read twice: one name on two markers
        players: vec![
            "TuichAAreko".to_string(),
            "Gyodong22".to_string(),
            "Gyodong22".to_string(),
        ],
        stacks: None,
        dealer_player: Some("TuichAAreko".to_string()),
        small_blind_player: Some("Gyodong22".to_string()),
        big_blind_player: Some("Gyodong22".to_string()),
    };
    let err = map_hand(&hand, &scan, "shot-1").unwrap_err();
    match err {
        MapError::DuplicateName { hand_id, name } => {
            assert_eq!(hand_id, "RC1001");
            assert_eq!(name, "Gyodong22");
        }
        other => panic!("expected duplicate error, got {other:?}"),
    }
}

#[test]
fn rotation_requires_count_parity() {
    let hand = sample_hand();
    let scan = PlayerScan {
        players: vec!["A".to_string(), "B".to_string()],
        ..Default::default()
    };
    let err = map_hand(&hand, &scan, "shot-1").unwrap_err();
    assert!(matches!(err, MapError::InsufficientData { .. }));
}

#[test]
fn aggregation_spreads_mapping_across_the_table() {
    let first = sample_hand();
    let mut second = sample_hand();
    second.hand_id = "RC1002".to_string();

    let mapping = map_hand(&first, &sample_player_scan(), "shot-1").unwrap();
    let tables = aggregate_tables([(&first, &mapping)]);

    // both hands resolve through the same normalized key
    let for_first = mapping_for(&tables, &first).unwrap();
    let for_second = mapping_for(&tables, &second).unwrap();
    assert_eq!(for_first.names, for_second.names);
    assert_eq!(for_first.names["Hero"], "TuichAAreko");
}

#[test]
fn aggregation_prefers_more_role_anchors_on_conflict() {
    let hand = sample_hand();

    let weak = HandMapping {
        hand_id: "RC1001".to_string(),
        screenshot_id: "shot-a".to_string(),
        strategy: MappingStrategy::Rotation,
        roles_populated: 0,
        names: [("Hero".to_string(), "WrongRead".to_string())].into(),
    };
    let strong = HandMapping {
        hand_id: "RC1002".to_string(),
        screenshot_id: "shot-b".to_string(),
        strategy: MappingStrategy::RoleBased,
        roles_populated: 3,
        names: [("Hero".to_string(), "TuichAAreko".to_string())].into(),
    };

    let mut second = sample_hand();
    second.hand_id = "RC1002".to_string();

    let tables = aggregate_tables([(&hand, &weak), (&second, &strong)]);
    let table = mapping_for(&tables, &hand).unwrap();
    assert_eq!(table.names["Hero"], "TuichAAreko");
    assert_eq!(table.conflicts, 1);
}

#[test]
fn aggregation_tie_breaks_first_seen_by_screenshot_id() {
    let hand = sample_hand();
    let mut second = sample_hand();
    second.hand_id = "RC1002".to_string();

    let a = HandMapping {
        hand_id: "RC1001".to_string(),
        screenshot_id: "shot-a".to_string(),
        strategy: MappingStrategy::Rotation,
        roles_populated: 0,
        names: [("Hero".to_string(), "FirstSeen".to_string())].into(),
    };
    let b = HandMapping {
        hand_id: "RC1002".to_string(),
        screenshot_id: "shot-b".to_string(),
        strategy: MappingStrategy::Rotation,
        roles_populated: 0,
        names: [("Hero".to_string(), "SecondSeen".to_string())].into(),
    };

    // fold order given to the aggregator must not matter
    let fwd = aggregate_tables([(&hand, &a), (&second, &b)]);
    let rev = aggregate_tables([(&second, &b), (&hand, &a)]);
    assert_eq!(fwd["RushAndCash88"].names["Hero"], "FirstSeen");
    assert_eq!(rev["RushAndCash88"].names["Hero"], "FirstSeen");
}

#[test]
fn group_and_lookup_keys_agree() {
    // the defect class this guards: normalizing on one side only
    let spaced = hand_with(
        "RC9001",
        Some("  RushAndCash88 "),
        &[(1, "aabbcc11", 10.0), (2, "Hero", 10.0)],
        Some(2),
        Some(2),
        Some(1),
        &[],
        &[],
        ts("2024/01/20 17:38:25"),
    );
    let plain = hand_with(
        "RC9002",
        Some("RushAndCash88"),
        &[(1, "aabbcc11", 10.0), (2, "Hero", 10.0)],
        Some(2),
        Some(2),
        Some(1),
        &[],
        &[],
        ts("2024/01/20 17:38:25"),
    );
    assert_eq!(
        table_key(spaced.table_name.as_deref()),
        table_key(plain.table_name.as_deref())
    );

    let mapping = HandMapping {
        hand_id: "RC9001".to_string(),
        screenshot_id: "shot-a".to_string(),
        strategy: MappingStrategy::Rotation,
        roles_populated: 0,
        names: [("Hero".to_string(), "Someone".to_string())].into(),
    };
    let tables = aggregate_tables([(&spaced, &mapping)]);
    assert!(mapping_for(&tables, &plain).is_some());

    let unknown_a = hand_with(
        "RC9003",
        None,
        &[(1, "aabbcc11", 10.0), (2, "Hero", 10.0)],
        None,
        None,
        None,
        &[],
        &[],
        ts("2024/01/20 17:38:25"),
    );
    let unknown_b = hand_with(
        "RC9004",
        Some("Unknown"),
        &[(1, "aabbcc11", 10.0), (2, "Hero", 10.0)],
        None,
        None,
        None,
        &[],
        &[],
        ts("2024/01/20 17:38:25"),
    );
    let tables = aggregate_tables([(&unknown_a, &mapping)]);
    assert!(mapping_for(&tables, &unknown_b).is_some());
}
