use std::collections::BTreeMap;

use tracing::warn;

use crate::hands::normalize::table_key;
use crate::hands::Hand;

use super::HandMapping;

const LOG_TARGET: &str = "mapping::aggregate";

/// Union of every per-hand mapping recovered at one table. A screenshot
/// anchors a single hand but names the whole table, so the union applies
/// to every hand grouped under the same key.
#[derive(Clone, Debug, Default)]
pub struct TableMapping {
    pub names: BTreeMap<String, String>,
    pub conflicts: usize,
    /// provenance per anon id: role anchors behind the winning value
    roles_by_anon: BTreeMap<String, usize>,
}

impl TableMapping {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn absorb(&mut self, mapping: &HandMapping) {
        for (anon, name) in &mapping.names {
            match self.names.get(anon) {
                None => {
                    self.names.insert(anon.clone(), name.clone());
                    self.roles_by_anon
                        .insert(anon.clone(), mapping.roles_populated);
                }
                Some(existing) if existing == name => {}
                Some(existing) => {
                    self.conflicts += 1;
                    let held_roles = self.roles_by_anon.get(anon).copied().unwrap_or(0);
                    let replace = mapping.roles_populated > held_roles;
                    warn!(
                        target: LOG_TARGET,
                        anon = %anon,
                        held = %existing,
                        candidate = %name,
                        held_roles,
                        candidate_roles = mapping.roles_populated,
                        replace,
                        "conflicting names for one anon id across screenshots"
                    );
                    if replace {
                        self.names.insert(anon.clone(), name.clone());
                        self.roles_by_anon
                            .insert(anon.clone(), mapping.roles_populated);
                    }
                }
            }
        }
    }
}

/// Groups per-hand mappings by normalized table name.
///
/// Entries are folded sorted by screenshot id, then hand id, so the
/// first-seen tie-break is stable across runs. The same [`table_key`]
/// function must be used to look a hand's mapping back up.
pub fn aggregate_tables<'a>(
    entries: impl IntoIterator<Item = (&'a Hand, &'a HandMapping)>,
) -> BTreeMap<String, TableMapping> {
    let mut ordered: Vec<(&Hand, &HandMapping)> = entries.into_iter().collect();
    ordered.sort_by(|a, b| {
        a.1.screenshot_id
            .cmp(&b.1.screenshot_id)
            .then_with(|| a.1.hand_id.cmp(&b.1.hand_id))
    });

    let mut tables: BTreeMap<String, TableMapping> = BTreeMap::new();
    for (hand, mapping) in ordered {
        let key = table_key(hand.table_name.as_deref());
        tables.entry(key).or_default().absorb(mapping);
    }
    tables
}

/// Looks up the aggregated mapping a hand should be rewritten with.
pub fn mapping_for<'a>(
    tables: &'a BTreeMap<String, TableMapping>,
    hand: &Hand,
) -> Option<&'a TableMapping> {
    tables.get(&table_key(hand.table_name.as_deref()))
}
