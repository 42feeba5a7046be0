#![cfg(test)]

use std::collections::BTreeMap;

use super::validate_rewrite;
use crate::rewrite::rewrite_hand;
use crate::test_utils::sample_hand;

fn full_mapping() -> BTreeMap<String, String> {
    [
        ("Hero", "TuichAAreko"),
        ("5641b4a0", "v1[nn]1"),
        ("e3efcaed", "Gyodong22"),
    ]
    .into_iter()
    .map(|(a, n)| (a.to_string(), n.to_string()))
    .collect()
}

#[test]
fn fully_mapped_rewrite_is_clean() {
    let hand = sample_hand();
    let names = full_mapping();
    let out = rewrite_hand(&hand.raw_text, &names);

    let report = validate_rewrite(&hand, &out, &names);
    assert_eq!(report.checks.len(), 10);
    for check in &report.checks {
        assert!(check.passed, "check {} failed: {:?}", check.name, check.detail);
    }
    assert!(report.is_clean());
}

#[test]
fn identity_rewrite_keeps_residuals_dirty() {
    let hand = sample_hand();
    let names = BTreeMap::new();
    let report = validate_rewrite(&hand, &hand.raw_text, &names);

    // hero untouched is fine; the hex ids are not
    let residual = report
        .checks
        .iter()
        .find(|c| c.name == "no_residual_anon_ids")
        .unwrap();
    assert!(!residual.passed);
    assert!(residual.detail.as_deref().unwrap().contains("e3efcaed"));
    assert!(!report.is_clean());

    let hero = report
        .checks
        .iter()
        .find(|c| c.name == "hero_mention_count")
        .unwrap();
    assert!(hero.passed);
}

#[test]
fn dropped_hero_line_is_critical() {
    let hand = sample_hand();
    let names = full_mapping();
    let out = rewrite_hand(&hand.raw_text, &names)
        .replace("Dealt to TuichAAreko [Ah Kd]\n", "");

    let report = validate_rewrite(&hand, &out, &names);
    let hero = report
        .checks
        .iter()
        .find(|c| c.name == "hero_mention_count")
        .unwrap();
    assert!(!hero.passed);
    assert!(!report.is_clean());
}

#[test]
fn non_critical_drift_is_recorded_but_not_dirty() {
    let hand = sample_hand();
    let names = full_mapping();
    // corrupt one chip token; count drifts, criticals still hold
    let out = rewrite_hand(&hand.raw_text, &names).replace("Rake $0.03", "Rake 0.03");

    let report = validate_rewrite(&hand, &out, &names);
    let chips = report
        .checks
        .iter()
        .find(|c| c.name == "chip_token_count_stable")
        .unwrap();
    assert!(!chips.passed);
    assert!(report.is_clean());
    assert_eq!(report.failures().count(), 1);
}

#[test]
fn heavy_line_loss_fails_drift_check() {
    let hand = sample_hand();
    let names = full_mapping();
    let out: String = rewrite_hand(&hand.raw_text, &names)
        .lines()
        .take(5)
        .collect::<Vec<_>>()
        .join("\n");

    let report = validate_rewrite(&hand, &out, &names);
    let drift = report
        .checks
        .iter()
        .find(|c| c.name == "line_count_drift")
        .unwrap();
    assert!(!drift.passed);
}
