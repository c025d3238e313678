//! Canonical tag map.
//!
//! Seeded with every discovered tag as its own canonical, then folded by
//! applying merge proposals in ranked order. A tag is either a canonical
//! entry or an alias, never both; resolution is single-hop even when merge
//! chains occur (an absorbed canonical's aliases are re-pointed).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::MergeProposal;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEntry {
    pub canonical: String,
    pub aliases: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalMap {
    pub canonical_map: BTreeMap<String, CanonicalEntry>,
    pub alias_map: BTreeMap<String, String>,
}

impl CanonicalMap {
    /// Build from per-tag counts and ranked proposals.
    ///
    /// A proposal is applied only while both sides are still live
    /// canonicals; proposals against already-merged tags are skipped.
    pub fn build(counts: &BTreeMap<String, usize>, proposals: &[MergeProposal]) -> Self {
        let mut map = CanonicalMap::default();
        for (tag, count) in counts {
            map.canonical_map.insert(
                tag.clone(),
                CanonicalEntry {
                    canonical: tag.clone(),
                    aliases: Vec::new(),
                    count: *count,
                },
            );
        }

        for proposal in proposals {
            if proposal.canonical == proposal.alias {
                continue;
            }
            if !map.canonical_map.contains_key(&proposal.canonical) {
                continue;
            }
            let Some(absorbed) = map.canonical_map.remove(&proposal.alias) else {
                continue;
            };

            map.alias_map
                .insert(proposal.alias.clone(), proposal.canonical.clone());
            // Aliases of the absorbed entry follow it to the new canonical.
            for transitive in &absorbed.aliases {
                map.alias_map
                    .insert(transitive.clone(), proposal.canonical.clone());
            }

            let entry = map
                .canonical_map
                .get_mut(&proposal.canonical)
                .expect("checked above");
            entry.count += absorbed.count;
            entry.aliases.push(proposal.alias.clone());
            entry.aliases.extend(absorbed.aliases);
        }

        map
    }

    /// Map a tag to its canonical form: canonicals pass through, aliases
    /// resolve, unknown tags yield `None`.
    pub fn resolve<'a>(&'a self, tag: &'a str) -> Option<&'a str> {
        if self.canonical_map.contains_key(tag) {
            Some(tag)
        } else {
            self.alias_map.get(tag).map(String::as_str)
        }
    }

    pub fn canonical_count(&self) -> usize {
        self.canonical_map.len()
    }
}
