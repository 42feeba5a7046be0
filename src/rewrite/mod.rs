//! Applies a table's name mapping to hand text through the ordered rule
//! set, and detects anon ids that survived.

mod residual;
mod rules;


use std::collections::BTreeMap;

use regex::Regex;

pub use residual::residual_anon_ids;

/// A name mapping compiled into its substitution patterns, reusable
/// across every hand at the table.
///
/// Aliases are substituted longest first so an id that happens to be a
/// prefix of another can never clobber it.
pub struct CompiledMapping {
    rules: Vec<(&'static str, Regex, String)>,
}

impl CompiledMapping {
    pub fn new(names: &BTreeMap<String, String>) -> Self {
        let mut aliases: Vec<&String> = names.keys().collect();
        aliases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut compiled = Vec::with_capacity(aliases.len() * rules::RULE_COUNT);
        for alias in aliases {
            compiled.extend(rules::compile(alias, &names[alias]));
        }
        Self { rules: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrites one hand's raw text. Bytes outside the substituted alias
    /// occurrences are passed through untouched.
    pub fn apply(&self, raw_text: &str) -> String {
        let mut out = raw_text.to_string();
        for (_, regex, replacement) in &self.rules {
            if let std::borrow::Cow::Owned(replaced) =
                regex.replace_all(&out, replacement.as_str())
            {
                out = replaced;
            }
        }
        out
    }
}

/// One-shot convenience over [`CompiledMapping`].
pub fn rewrite_hand(raw_text: &str, names: &BTreeMap<String, String>) -> String {
    CompiledMapping::new(names).apply(raw_text)
}
