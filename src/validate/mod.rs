//! Structural compatibility checks against the downstream importer.
//! Failures are recorded, never thrown; only the hero-count and residual
//! checks decide cleanliness.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::hands::Hand;
use crate::hands::HERO;
use crate::rewrite::residual_anon_ids;

const MAX_LINE_DRIFT: usize = 2;
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

static SEAT_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Seat \d+: .+ in chips\)").expect("seat declaration pattern"));

static CHIP_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[$€£][\d,.]+").expect("chip amount pattern"));

#[derive(Clone, Debug, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub critical: bool,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// Clean means both critical checks passed; non-critical drift is
    /// recorded but does not reclassify the file.
    pub fn is_clean(&self) -> bool {
        self.checks.iter().filter(|c| c.critical).all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    fn push(&mut self, name: &'static str, critical: bool, passed: bool, detail: Option<String>) {
        self.checks.push(CheckResult {
            name,
            passed,
            critical,
            detail,
        });
    }
}

/// Runs the full check list for one rewritten hand.
pub fn validate_rewrite(
    hand: &Hand,
    output: &str,
    names: &BTreeMap<String, String>,
) -> ValidationReport {
    let raw = hand.raw_text.as_str();
    let mut report = ValidationReport::default();

    // 1. hero mentions: every original `Hero` must survive either as the
    //    mapped name or as a literal leftover
    let hero_before = count_occurrences(raw, HERO);
    let hero_after = match names.get(HERO) {
        Some(real) => count_occurrences(output, real) + count_occurrences(output, HERO),
        None => count_occurrences(output, HERO),
    };
    report.push(
        "hero_mention_count",
        true,
        hero_before == hero_after,
        (hero_before != hero_after)
            .then(|| format!("{hero_before} before, {hero_after} after")),
    );

    // 2. line count drift
    let lines_before = raw.lines().count();
    let lines_after = output.lines().count();
    let drift = lines_before.abs_diff(lines_after);
    report.push(
        "line_count_drift",
        false,
        drift <= MAX_LINE_DRIFT,
        (drift > MAX_LINE_DRIFT).then(|| format!("{lines_before} -> {lines_after}")),
    );

    // 3. hand id untouched
    let id_token = format!("#{}:", hand.hand_id);
    report.push(
        "hand_id_intact",
        false,
        output.contains(&id_token),
        None,
    );

    // 4. timestamp untouched
    let ts_token = hand.timestamp.format(TIMESTAMP_FORMAT).to_string();
    report.push(
        "timestamp_intact",
        false,
        output.contains(&ts_token),
        None,
    );

    // 5. no doubled currency symbol introduced
    let doubled_before = count_occurrences(raw, "$$");
    let doubled_after = count_occurrences(output, "$$");
    report.push(
        "no_doubled_currency",
        false,
        doubled_after <= doubled_before,
        (doubled_after > doubled_before).then(|| format!("{doubled_after} `$$` tokens")),
    );

    // 6. summary section present
    report.push(
        "summary_present",
        false,
        output.contains("*** SUMMARY ***") == raw.contains("*** SUMMARY ***"),
        None,
    );

    // 7. table name token unchanged
    let table_ok = match &hand.table_name {
        Some(name) => output.contains(&format!("Table '{name}'")),
        None => true,
    };
    report.push("table_name_intact", false, table_ok, None);

    // 8. seat count unchanged
    let seats_before = SEAT_DECLARATION.find_iter(raw).count();
    let seats_after = SEAT_DECLARATION.find_iter(output).count();
    report.push(
        "seat_count_stable",
        false,
        seats_before == seats_after,
        (seats_before != seats_after).then(|| format!("{seats_before} -> {seats_after}")),
    );

    // 9. chip-amount token count unchanged
    let chips_before = CHIP_AMOUNT.find_iter(raw).count();
    let chips_after = CHIP_AMOUNT.find_iter(output).count();
    report.push(
        "chip_token_count_stable",
        false,
        chips_before == chips_after,
        (chips_before != chips_after).then(|| format!("{chips_before} -> {chips_after}")),
    );

    // 10. no residual anon ids
    let residuals = residual_anon_ids(output);
    report.push(
        "no_residual_anon_ids",
        true,
        residuals.is_empty(),
        (!residuals.is_empty()).then(|| residuals.join(", ")),
    );

    report
}

fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}
