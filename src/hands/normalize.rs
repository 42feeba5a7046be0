//! Pure normalization helpers shared by the matcher and the table
//! aggregator. Both the group-by key and the look-up key for a table go
//! through [`table_key`]; the two sites must never diverge.

use std::collections::BTreeSet;

use super::types::Chips;

/// Bucket name for hands whose table is missing or synthetic.
pub const UNKNOWN_TABLE: &str = "unknown";

/// Strips one known operator prefix from a hand id, for identity
/// comparison only. `RC1001` and a scan reading `1001` normalize equal.
pub fn normalized_hand_id(raw: &str, prefixes: &BTreeSet<String>) -> String {
    let trimmed = raw.trim().trim_start_matches('#');
    for prefix in prefixes {
        if let Some(rest) = trimmed.strip_prefix(prefix.as_str()) {
            if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
                return rest.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Canonical grouping key for a table name.
///
/// Trims whitespace and collapses the client's synthetic "unknown"
/// variants into a single bucket.
pub fn table_key(name: Option<&str>) -> String {
    let trimmed = name.unwrap_or("").trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with(UNKNOWN_TABLE) {
        return UNKNOWN_TABLE.to_string();
    }
    trimmed.to_string()
}

/// Whether `token` has the shape of an anonymous player id: 6-8 chars of
/// lowercase hex.
pub fn is_anon_hex(token: &str) -> bool {
    (6..=8).contains(&token.len())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Whether `token` can key a name mapping: `Hero` or an anon hex id.
pub fn is_player_alias(token: &str) -> bool {
    token == super::types::HERO || is_anon_hex(token)
}

/// Parses a chip amount out of `$1,234.56`-style text.
pub fn parse_amount(text: &str) -> Option<Chips> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<Chips>().ok()
}

/// Relative closeness check used by stack comparisons. A zero reference
/// only matches another zero.
pub fn within_tolerance(observed: Chips, reference: Chips, tolerance: f64) -> bool {
    if reference == 0.0 {
        return observed == 0.0;
    }
    ((observed - reference) / reference).abs() <= tolerance
}
