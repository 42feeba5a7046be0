//! The ordered substitution rule set. Most specific first, so the bare
//! `<alias>:` line-start of the generic actions can never swallow a line
//! that belongs to a more specific rule.
//!
//! Replacements always use the explicit-group form `${1}`: a bare `$1`
//! followed by a name starting with a digit would be read as a longer
//! group reference and silently drop the text.

use regex::Regex;

const AMOUNT: &str = r"[$€£]?[\d,.]+";

/// Where the alias sits relative to the captured context.
#[derive(Clone, Copy)]
enum Shape {
    /// `${1}NAME${2}`
    Wrapped,
    /// `NAME${1}`
    Leading,
    /// `${1}NAME`
    Trailing,
}

struct RuleSpec {
    name: &'static str,
    shape: Shape,
    build: fn(&str) -> String,
}

const RULES: &[RuleSpec] = &[
    RuleSpec {
        name: "seat_declaration",
        shape: Shape::Wrapped,
        build: |a| format!(r"(?m)^(Seat \d+: ){a}( \({AMOUNT} in chips\))"),
    },
    RuleSpec {
        name: "posts_small_blind",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: posts small blind )"),
    },
    RuleSpec {
        name: "posts_big_blind",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: posts big blind )"),
    },
    RuleSpec {
        name: "action_with_amount",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: (?:bets|calls|raises) {AMOUNT}(?: to {AMOUNT})?)$"),
    },
    RuleSpec {
        name: "action_all_in",
        shape: Shape::Leading,
        build: |a| {
            format!(r"(?m)^{a}(: (?:bets|calls|raises) {AMOUNT}(?: to {AMOUNT})? and is all-in)$")
        },
    },
    RuleSpec {
        name: "action_plain",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: (?:folds|checks))"),
    },
    RuleSpec {
        name: "dealt_plain",
        shape: Shape::Trailing,
        build: |a| format!(r"(?m)^(Dealt to ){a}$"),
    },
    RuleSpec {
        name: "dealt_with_cards",
        shape: Shape::Wrapped,
        build: |a| format!(r"(?m)^(Dealt to ){a}( \[[^\]]+\])"),
    },
    RuleSpec {
        name: "pot_collection",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}( collected {AMOUNT} from pot)"),
    },
    RuleSpec {
        name: "showdown_show",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: shows \[[^\]]+\])"),
    },
    RuleSpec {
        name: "muck",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: mucks hand)"),
    },
    RuleSpec {
        name: "does_not_show",
        shape: Shape::Leading,
        build: |a| format!(r"(?m)^{a}(: doesn't show hand)"),
    },
    RuleSpec {
        name: "summary_seat",
        shape: Shape::Wrapped,
        build: |a| format!(r"(?m)^(Seat \d+: ){a}( |$)"),
    },
    RuleSpec {
        name: "uncalled_bet_return",
        shape: Shape::Trailing,
        build: |a| format!(r"(?m)^(Uncalled bet \({AMOUNT}\) returned to ){a}$"),
    },
];

pub(super) const RULE_COUNT: usize = 14;

/// Compiles the full rule set for one alias. `$` in the replacement name
/// is doubled so it can never be read as a group reference.
pub(super) fn compile(alias: &str, real_name: &str) -> Vec<(&'static str, Regex, String)> {
    debug_assert_eq!(RULES.len(), RULE_COUNT);
    let escaped_alias = regex::escape(alias);
    let escaped_name = real_name.replace('$', "$$");
    RULES
        .iter()
        .map(|rule| {
            let pattern = (rule.build)(&escaped_alias);
            let regex = Regex::new(&pattern).expect("rewrite rule pattern");
            let replacement = match rule.shape {
                Shape::Wrapped => format!("${{1}}{escaped_name}${{2}}"),
                Shape::Leading => format!("{escaped_name}${{1}}"),
                Shape::Trailing => format!("${{1}}{escaped_name}"),
            };
            (rule.name, regex, replacement)
        })
        .collect()
}
