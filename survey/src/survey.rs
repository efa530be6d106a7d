//! Street survey orchestration for `survey street`, `survey summary`,
//! `survey compile`, and `survey dedupe`.
//!
//! A run resolves the street once, plans the house-number window, then drives
//! the lazy [`AddressEnumerator`] through the [`ClassificationPipeline`] until
//! `limit` results were produced or the window is exhausted. Stored results
//! make the run resumable: anything already done is skipped before probing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::dedupe::dedupe_by_house_number;
use crate::core::summary::{CompiledCounts, LikelihoodCounts, summarize};
use crate::core::types::{RangeMode, RangePlan, StreetTarget};
use crate::enumerate::AddressEnumerator;
use crate::io::capabilities::{
    GardenClassifier, GeocodeAnchorResolver, GeocodeProbe, ImageFetcher,
    NearestHouseNumberDetector,
};
use crate::io::config::SurveyConfig;
use crate::io::image_cache::CachedImageFetcher;
use crate::io::rate_limit::RateLimiter;
use crate::io::result_store::ResultStore;
use crate::io::retry::CallOutcome;
use crate::pipeline::{AddressOutcome, ClassificationPipeline, PipelineStop};
use crate::plan::RangePlanner;

/// External collaborators for a survey run.
#[derive(Clone, Copy)]
pub struct Capabilities<'a> {
    pub resolver: &'a dyn GeocodeAnchorResolver,
    pub detector: &'a dyn NearestHouseNumberDetector,
    pub probe: &'a dyn GeocodeProbe,
    pub fetcher: &'a dyn ImageFetcher,
    pub classifier: &'a dyn GardenClassifier,
}

/// One `survey street` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyRequest {
    pub target: StreetTarget,
    pub mode: RangeMode,
    pub manual_min: Option<i64>,
    pub manual_max: Option<i64>,
    pub limit: usize,
    /// Leave `unknown` entries out of the done set so they are retried.
    pub retry_unknown: bool,
}

impl SurveyRequest {
    /// Auto mode unless either manual bound is given.
    pub fn new(
        target: StreetTarget,
        manual_min: Option<i64>,
        manual_max: Option<i64>,
        limit: usize,
    ) -> Self {
        let mode = if manual_min.is_some() || manual_max.is_some() {
            RangeMode::Manual
        } else {
            RangeMode::Auto
        };
        Self {
            target,
            mode,
            manual_min,
            manual_max,
            limit,
            retry_unknown: false,
        }
    }
}

/// Summary of a survey run.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyReport {
    pub street: String,
    pub plan: RangePlan,
    /// Addresses discovered and processed this run.
    pub discovered: usize,
    /// Of those, how many got a definite likelihood.
    pub classified: usize,
    pub unknown: usize,
    /// Stored addresses treated as already done.
    pub skipped_existing: usize,
    /// Geocode probes issued this run.
    pub probes: usize,
    pub stop: PipelineStop,
    /// Counts over the whole stored set after the run.
    pub counts: LikelihoodCounts,
}

impl fmt::Display for SurveyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: discovered {}, classified {}, unknown {} (skipped {} existing); \
             stored high {} medium {} low {} unknown {}",
            self.street,
            self.discovered,
            self.classified,
            self.unknown,
            self.skipped_existing,
            self.counts.high,
            self.counts.medium,
            self.counts.low,
            self.counts.unknown
        )
    }
}

/// Survey one street.
///
/// Store corruption and an unknown street are fatal. Capability failures past
/// street resolution only ever affect a single address.
#[instrument(skip_all, fields(street = %request.target.label(), limit = request.limit))]
pub fn run_survey<G: FnMut(&AddressOutcome)>(
    config: &SurveyConfig,
    caps: Capabilities<'_>,
    request: &SurveyRequest,
    stop: Option<Arc<AtomicBool>>,
    on_result: G,
) -> Result<SurveyReport> {
    let target = &request.target;
    let store = ResultStore::new(&config.data_dir);
    let mut street = store.open(target)?;

    let anchor = match config
        .retry_policy()
        .run("resolve", None, || caps.resolver.resolve(target))
    {
        CallOutcome::Ok(Some(anchor)) => anchor,
        CallOutcome::Ok(None) => bail!("street not found: {}", target.label()),
        failed => bail!(
            "resolve street {}: {}",
            target.label(),
            failed.failure_reason().unwrap_or_default()
        ),
    };
    info!(
        street = %anchor.formatted_street_name,
        lat = anchor.center_location.lat,
        lng = anchor.center_location.lng,
        "street resolved"
    );

    let plan = RangePlanner::from_config(caps.detector, config).plan(
        &anchor,
        target,
        request.mode,
        request.manual_min,
        request.manual_max,
    );

    let done = street.results().done_addresses(!request.retry_unknown);
    let probe_limiter = RateLimiter::new("probe", config.probe_delay());
    let mut addresses =
        AddressEnumerator::new(caps.probe, &probe_limiter, &anchor, target, &plan, &done);

    let fetcher = CachedImageFetcher::new(caps.fetcher, store.paths(target).images_dir);
    let mut pipeline = ClassificationPipeline::new(&fetcher, caps.classifier, config);
    if let Some(flag) = stop {
        pipeline = pipeline.with_stop_flag(flag);
    }
    let outcome = pipeline.run(&mut addresses, request.limit, &mut street, on_result)?;

    let produced = summarize(&outcome.results);
    let report = SurveyReport {
        street: target.label(),
        plan,
        discovered: produced.total(),
        classified: produced.classified(),
        unknown: produced.unknown,
        skipped_existing: done.len(),
        probes: addresses.probes(),
        stop: outcome.stop,
        counts: summarize(street.results()),
    };
    info!(%report, "survey finished");
    Ok(report)
}

/// Likelihood counts of a street's stored results.
pub fn street_summary(config: &SurveyConfig, target: &StreetTarget) -> Result<LikelihoodCounts> {
    let store = ResultStore::new(&config.data_dir);
    let results = store.load(target)?;
    Ok(store.summary(&results))
}

/// Likelihood counts for every street under `data_dir`, plus the overall
/// total. A corrupt store anywhere fails the whole compile.
#[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
pub fn compile_streets(config: &SurveyConfig) -> Result<CompiledCounts> {
    let mut compiled = CompiledCounts::default();
    for stored in ResultStore::new(&config.data_dir).load_all()? {
        let label = format!("{}, {}", stored.street, stored.suburb);
        compiled.push(stored.key, label, &stored.results);
    }
    info!(
        streets = compiled.streets.len(),
        entries = compiled.overall.total(),
        "streets compiled"
    );
    Ok(compiled)
}

/// Result of `survey dedupe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupeReport {
    pub kept: usize,
    pub removed: Vec<String>,
}

/// Collapse entries sharing a house number and rewrite the store.
///
/// Leaves the file untouched when nothing was removed.
#[instrument(skip_all, fields(street = %target.label()))]
pub fn dedupe_street(config: &SurveyConfig, target: &StreetTarget) -> Result<DedupeReport> {
    let store = ResultStore::new(&config.data_dir);
    let mut street = store.open(target)?;
    let outcome = dedupe_by_house_number(street.results());
    let report = DedupeReport {
        kept: outcome.results.len(),
        removed: outcome.removed,
    };
    if !report.removed.is_empty() {
        street
            .replace(outcome.results)
            .with_context(|| format!("rewrite results for {}", target.label()))?;
        info!(removed = report.removed.len(), kept = report.kept, "duplicates removed");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Likelihood;
    use crate::io::capabilities::CapabilityError;
    use crate::test_support::{
        ScriptedClassifier, ScriptedDetector, ScriptedImageFetcher, ScriptedProbe,
        ScriptedResolver, elm_anchor, elm_target, fast_config, processed,
    };

    struct Fakes {
        resolver: ScriptedResolver,
        detector: ScriptedDetector,
        probe: ScriptedProbe,
        fetcher: ScriptedImageFetcher,
        classifier: ScriptedClassifier,
    }

    impl Fakes {
        fn new(probe: ScriptedProbe) -> Self {
            Self {
                resolver: ScriptedResolver::found(elm_anchor()),
                detector: ScriptedDetector::not_found(),
                probe,
                fetcher: ScriptedImageFetcher::new(),
                classifier: ScriptedClassifier::new(),
            }
        }

        fn caps(&self) -> Capabilities<'_> {
            Capabilities {
                resolver: &self.resolver,
                detector: &self.detector,
                probe: &self.probe,
                fetcher: &self.fetcher,
                classifier: &self.classifier,
            }
        }
    }

    fn manual_request(min: i64, max: i64, limit: usize) -> SurveyRequest {
        SurveyRequest::new(elm_target(), Some(min), Some(max), limit)
    }

    #[test]
    fn request_mode_follows_bounds() {
        assert_eq!(
            SurveyRequest::new(elm_target(), None, None, 20).mode,
            RangeMode::Auto
        );
        assert_eq!(
            SurveyRequest::new(elm_target(), None, Some(40), 20).mode,
            RangeMode::Manual
        );
    }

    #[test]
    fn unknown_street_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut fakes = Fakes::new(ScriptedProbe::new());
        fakes.resolver = ScriptedResolver::not_found();
        let err = run_survey(
            &fast_config(temp.path()),
            fakes.caps(),
            &manual_request(1, 5, 5),
            None,
            |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("street not found"));
        assert!(fakes.probe.probed().is_empty());
    }

    #[test]
    fn resolver_failure_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut fakes = Fakes::new(ScriptedProbe::new());
        fakes.resolver = ScriptedResolver::failing(CapabilityError::terminal("REQUEST_DENIED"));
        let err = run_survey(
            &fast_config(temp.path()),
            fakes.caps(),
            &manual_request(1, 5, 5),
            None,
            |_| {},
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("REQUEST_DENIED"));
    }

    #[test]
    fn auto_mode_walks_spillover_windows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = fast_config(temp.path());
        config.planner.fallback_windows = vec![[1, 3], [2, 5]];
        let fakes = Fakes::new(ScriptedProbe::houses([2, 5], "Elm St, Springfield"));
        let request = SurveyRequest::new(elm_target(), None, None, 10);

        let report = run_survey(&config, fakes.caps(), &request, None, |_| {}).expect("survey");

        assert!(report.plan.is_fallback());
        assert_eq!(fakes.probe.probed(), vec![1, 2, 3, 4, 5]);
        assert_eq!(report.discovered, 2);
        assert_eq!(report.stop, PipelineStop::Exhausted);
        assert_eq!(fakes.detector.calls(), 1);
    }

    #[test]
    fn retry_unknown_overwrites_instead_of_duplicating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let store = ResultStore::new(temp.path());
        store
            .append(
                &elm_target(),
                processed("1 Elm St, Springfield", Likelihood::Unknown),
            )
            .expect("seed");
        store
            .append(&elm_target(), processed("2 Elm St, Springfield", Likelihood::Low))
            .expect("seed");
        let fakes = Fakes::new(ScriptedProbe::houses([1, 2], "Elm St, Springfield"));
        let mut request = manual_request(1, 2, 10);
        request.retry_unknown = true;

        let report = run_survey(&config, fakes.caps(), &request, None, |_| {}).expect("survey");

        assert_eq!(fakes.probe.probed(), vec![1]);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.discovered, 1);
        let stored = store.load(&elm_target()).expect("load");
        assert_eq!(stored.len(), 2);
        assert_eq!(
            stored
                .get("1 Elm St, Springfield")
                .map(|r| r.garden_likelihood),
            Some(Likelihood::Low)
        );
        assert_eq!(report.counts.unknown, 0);
    }

    #[test]
    fn compile_counts_every_stored_street() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let store = ResultStore::new(temp.path());
        let oak = StreetTarget::new("Oak Rd", "Springfield");
        store
            .append(&elm_target(), processed("1 Elm St, Springfield", Likelihood::High))
            .expect("seed elm");
        store
            .append(&oak, processed("2 Oak Rd, Springfield", Likelihood::Low))
            .expect("seed oak");
        store
            .append(&oak, processed("4 Oak Rd, Springfield", Likelihood::Unknown))
            .expect("seed oak");

        let compiled = compile_streets(&config).expect("compile");

        let labels: Vec<&str> = compiled.streets.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Elm St, Springfield", "Oak Rd, Springfield"]);
        assert_eq!(compiled.streets[1].counts.total(), 2);
        assert_eq!(
            (compiled.overall.high, compiled.overall.low, compiled.overall.unknown),
            (1, 1, 1)
        );
    }

    #[test]
    fn compile_of_empty_data_dir_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let compiled = compile_streets(&fast_config(temp.path())).expect("compile");
        assert_eq!(compiled, CompiledCounts::default());
    }

    #[test]
    fn dedupe_rewrites_only_when_needed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let store = ResultStore::new(temp.path());
        for (address, likelihood) in [
            ("7 Elm St, Springfield", Likelihood::Unknown),
            ("8 Elm St, Springfield", Likelihood::Low),
            ("7 Elm Street, Springfield", Likelihood::High),
        ] {
            store
                .append(&elm_target(), processed(address, likelihood))
                .expect("seed");
        }

        let report = dedupe_street(&config, &elm_target()).expect("dedupe");
        assert_eq!(report.kept, 2);
        assert_eq!(report.removed, vec!["7 Elm St, Springfield".to_string()]);

        let counts = street_summary(&config, &elm_target()).expect("summary");
        assert_eq!(counts.high, 1);
        assert_eq!(counts.unknown, 0);

        let again = dedupe_street(&config, &elm_target()).expect("dedupe again");
        assert!(again.removed.is_empty());
    }
}
