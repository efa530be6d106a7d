//! Likelihood counts over a result set.

use serde::Serialize;

use crate::core::result_set::ResultSet;
use crate::core::types::Likelihood;

/// Per-likelihood counts for a street.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikelihoodCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub unknown: usize,
}

impl LikelihoodCounts {
    pub fn record(&mut self, likelihood: Likelihood) {
        match likelihood {
            Likelihood::Low => self.low += 1,
            Likelihood::Medium => self.medium += 1,
            Likelihood::High => self.high += 1,
            Likelihood::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.unknown
    }

    /// Entries with a definite likelihood.
    pub fn classified(&self) -> usize {
        self.low + self.medium + self.high
    }

    pub fn medium_or_high(&self) -> usize {
        self.medium + self.high
    }

    /// `count` as a percentage of classified entries; `0.0` when none are.
    pub fn percent_of_classified(&self, count: usize) -> f64 {
        match self.classified() {
            0 => 0.0,
            classified => count as f64 * 100.0 / classified as f64,
        }
    }

    fn add(&mut self, other: &LikelihoodCounts) {
        self.low += other.low;
        self.medium += other.medium;
        self.high += other.high;
        self.unknown += other.unknown;
    }
}

/// Counts for one stored street.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreetCounts {
    pub key: String,
    pub label: String,
    pub counts: LikelihoodCounts,
}

/// Counts across every stored street, for `survey compile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledCounts {
    pub streets: Vec<StreetCounts>,
    pub overall: LikelihoodCounts,
}

impl CompiledCounts {
    /// Add one street; `overall` accumulates as streets are pushed.
    pub fn push(&mut self, key: String, label: String, results: &ResultSet) {
        let counts = summarize(results);
        self.overall.add(&counts);
        self.streets.push(StreetCounts { key, label, counts });
    }
}

/// Count entries of `results` by likelihood.
pub fn summarize(results: &ResultSet) -> LikelihoodCounts {
    let mut counts = LikelihoodCounts::default();
    for result in results.iter() {
        counts.record(result.garden_likelihood);
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::processed;

    #[test]
    fn summarize_counts_each_likelihood() {
        let set = ResultSet::from_results(vec![
            processed("1 Elm St", Likelihood::High),
            processed("2 Elm St", Likelihood::Low),
            processed("3 Elm St", Likelihood::Unknown),
            processed("4 Elm St", Likelihood::Low),
        ])
        .expect("set");
        let counts = summarize(&set);
        assert_eq!(
            counts,
            LikelihoodCounts {
                low: 2,
                medium: 0,
                high: 1,
                unknown: 1,
            }
        );
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.classified(), 3);
    }

    #[test]
    fn summarize_empty_is_zero() {
        assert_eq!(summarize(&ResultSet::new()), LikelihoodCounts::default());
    }

    #[test]
    fn compiled_counts_sum_streets() {
        let elm = ResultSet::from_results(vec![
            processed("1 Elm St", Likelihood::High),
            processed("2 Elm St", Likelihood::Unknown),
        ])
        .expect("elm");
        let oak = ResultSet::from_results(vec![
            processed("1 Oak Rd", Likelihood::Medium),
            processed("2 Oak Rd", Likelihood::Low),
            processed("3 Oak Rd", Likelihood::High),
        ])
        .expect("oak");

        let mut compiled = CompiledCounts::default();
        compiled.push("Elm_St_X".into(), "Elm St, X".into(), &elm);
        compiled.push("Oak_Rd_X".into(), "Oak Rd, X".into(), &oak);

        assert_eq!(compiled.streets.len(), 2);
        assert_eq!(compiled.streets[1].counts.total(), 3);
        assert_eq!(
            compiled.overall,
            LikelihoodCounts {
                low: 1,
                medium: 1,
                high: 2,
                unknown: 1,
            }
        );
        assert_eq!(compiled.overall.medium_or_high(), 3);
        assert_eq!(compiled.overall.percent_of_classified(2), 50.0);
    }

    #[test]
    fn percent_without_classified_entries_is_zero() {
        let counts = LikelihoodCounts {
            unknown: 3,
            ..LikelihoodCounts::default()
        };
        assert_eq!(counts.percent_of_classified(0), 0.0);
    }
}
