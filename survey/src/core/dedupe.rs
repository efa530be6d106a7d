//! Collapse result-set entries that share a house number.
//!
//! The geocoder can format one house two ways (`Wirraway St` vs
//! `Wirraway Street`), producing two keys for the same property.

use std::collections::{HashMap, HashSet};

use crate::core::result_set::ResultSet;
use crate::core::street::leading_house_number;
use crate::core::types::{Likelihood, ProcessedResult};

/// Outcome of a dedupe pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupeOutcome {
    pub results: ResultSet,
    pub removed: Vec<String>,
}

/// Keep one entry per house number.
///
/// Within a group the first classified entry wins, otherwise the first entry.
/// The survivor takes the position of the group's first occurrence. Entries
/// without a plain leading house number are always kept.
pub fn dedupe_by_house_number(results: &ResultSet) -> DedupeOutcome {
    let mut groups: HashMap<u32, Vec<usize>> = HashMap::new();
    for (pos, result) in results.iter().enumerate() {
        if let Some(number) = leading_house_number(&result.address) {
            groups.entry(number).or_default().push(pos);
        }
    }

    let entries = results.results();
    let mut keep = vec![true; entries.len()];
    let mut replacement: HashMap<usize, usize> = HashMap::new();
    for positions in groups.values().filter(|p| p.len() > 1) {
        let winner = positions
            .iter()
            .copied()
            .find(|&pos| is_classified(&entries[pos]))
            .unwrap_or(positions[0]);
        for &pos in positions {
            keep[pos] = false;
        }
        keep[positions[0]] = true;
        replacement.insert(positions[0], winner);
    }

    let winners: HashSet<usize> = replacement.values().copied().collect();
    let mut deduped = ResultSet::new();
    let mut removed = Vec::new();
    for (pos, entry) in entries.iter().enumerate() {
        if !keep[pos] {
            if !winners.contains(&pos) {
                removed.push(entry.address.clone());
            }
            continue;
        }
        let chosen = replacement.get(&pos).copied().unwrap_or(pos);
        if chosen != pos {
            removed.push(entry.address.clone());
        }
        deduped.insert(entries[chosen].clone());
    }
    removed.sort();

    DedupeOutcome {
        results: deduped,
        removed,
    }
}

fn is_classified(result: &ProcessedResult) -> bool {
    result.garden_likelihood != Likelihood::Unknown
}
