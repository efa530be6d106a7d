//! Insertion-ordered result set keyed by formatted address.

use std::collections::{HashMap, HashSet};

use crate::core::types::{Likelihood, ProcessedResult};

/// Ordered mapping `address -> ProcessedResult`.
///
/// Iteration follows discovery order. Keys are unique: inserting an existing
/// address replaces the entry in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: Vec<ProcessedResult>,
    index: HashMap<String, usize>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted rows, rejecting duplicate addresses.
    pub fn from_results(results: Vec<ProcessedResult>) -> Result<Self, String> {
        let mut set = Self::new();
        for result in results {
            if set.contains(&result.address) {
                return Err(format!("duplicate address '{}'", result.address));
            }
            set.insert(result);
        }
        Ok(set)
    }

    /// Insert or overwrite. Returns true when the address was new.
    pub fn insert(&mut self, result: ProcessedResult) -> bool {
        match self.index.get(&result.address) {
            Some(&pos) => {
                self.entries[pos] = result;
                false
            }
            None => {
                self.index.insert(result.address.clone(), self.entries.len());
                self.entries.push(result);
                true
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&ProcessedResult> {
        self.index.get(address).map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, address: &str) -> bool {
        self.index.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessedResult> {
        self.entries.iter()
    }

    pub fn results(&self) -> &[ProcessedResult] {
        &self.entries
    }

    /// Addresses that count as finished for resumption.
    ///
    /// With `include_unknown = false`, `Unknown` entries are left out so a
    /// later run re-probes and overwrites them.
    pub fn done_addresses(&self, include_unknown: bool) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|r| include_unknown || r.garden_likelihood != Likelihood::Unknown)
            .map(|r| r.address.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::processed;

    #[test]
    fn insert_overwrites_in_place() {
        let mut set = ResultSet::new();
        assert!(set.insert(processed("1 Elm St", Likelihood::Unknown)));
        assert!(set.insert(processed("3 Elm St", Likelihood::Low)));
        assert!(!set.insert(processed("1 Elm St", Likelihood::High)));

        let addresses: Vec<&str> = set.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["1 Elm St", "3 Elm St"]);
        assert_eq!(
            set.get("1 Elm St").map(|r| r.garden_likelihood),
            Some(Likelihood::High)
        );
    }

    #[test]
    fn from_results_rejects_duplicates() {
        let err = ResultSet::from_results(vec![
            processed("1 Elm St", Likelihood::Low),
            processed("1 Elm St", Likelihood::High),
        ])
        .unwrap_err();
        assert!(err.contains("duplicate address"));
    }

    #[test]
    fn done_addresses_can_exclude_unknown() {
        let set = ResultSet::from_results(vec![
            processed("1 Elm St", Likelihood::Unknown),
            processed("3 Elm St", Likelihood::Low),
        ])
        .expect("set");
        assert_eq!(set.done_addresses(true).len(), 2);
        let retry = set.done_addresses(false);
        assert!(retry.contains("3 Elm St"));
        assert!(!retry.contains("1 Elm St"));
    }
}
