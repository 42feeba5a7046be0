use once_cell::sync::Lazy;
use regex::Regex;

// Player-position context only: line-start followed by a colon, or right
// after a summary/declaration `Seat N: `. Timestamps, card pairs, and
// hand ids never sit in those positions.
static LINE_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^([a-f0-9]{6,8}):").expect("residual line pattern"));

static SEAT_POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Seat \d+: ([a-f0-9]{6,8})( |$)").expect("residual seat pattern")
});

/// Anon ids still present in rewritten output, sorted and deduplicated.
pub fn residual_anon_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = LINE_START
        .captures_iter(text)
        .chain(SEAT_POSITION.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
