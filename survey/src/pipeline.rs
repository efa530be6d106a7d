//! Per-address classification: fetch imagery, classify, persist.
//!
//! Each address moves `Pending -> ImageFetched -> Classified`, or ends as
//! `Unknown` when the image fetch or the classification fails after retries.
//! Every attempted address is appended to the street's store before the next
//! one starts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::result_set::ResultSet;
use crate::core::types::{ConfirmedAddress, ProcessedResult};
use crate::io::capabilities::{GardenClassifier, ImageFetcher};
use crate::io::config::SurveyConfig;
use crate::io::rate_limit::RateLimiter;
use crate::io::result_store::StreetStore;
use crate::io::retry::{CallOutcome, RetryPolicy};

/// Terminal state of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressState {
    Classified,
    ImageFetchFailed,
    ClassificationFailed,
}

/// Reported to the progress callback after each address is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressOutcome {
    /// Zero-based position within this run.
    pub index: usize,
    pub state: AddressState,
    pub result: ProcessedResult,
}

/// Reason why [`ClassificationPipeline::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStop {
    /// The address source ran dry.
    Exhausted,
    /// `limit` results were produced.
    LimitReached,
    /// The stop flag was raised between addresses.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Results produced by this run, in processing order.
    pub results: ResultSet,
    pub stop: PipelineStop,
}

pub struct ClassificationPipeline<'a, F: ?Sized, C: ?Sized> {
    fetcher: &'a F,
    classifier: &'a C,
    retry: RetryPolicy,
    image_limiter: RateLimiter,
    classify_limiter: RateLimiter,
    stop: Option<Arc<AtomicBool>>,
    clock: fn() -> DateTime<Utc>,
}

impl<'a, F, C> ClassificationPipeline<'a, F, C>
where
    F: ImageFetcher + ?Sized,
    C: GardenClassifier + ?Sized,
{
    pub fn new(fetcher: &'a F, classifier: &'a C, config: &SurveyConfig) -> Self {
        Self {
            fetcher,
            classifier,
            retry: config.retry_policy(),
            image_limiter: RateLimiter::new("image", config.image_delay()),
            classify_limiter: RateLimiter::new("classify", config.classify_delay()),
            stop: None,
            clock: Utc::now,
        }
    }

    /// Check `flag` between addresses and stop once it is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Classify up to `limit` addresses from `confirmed`, appending each result
    /// to `store` as it completes.
    ///
    /// Addresses are pulled lazily, so nothing past `limit` is discovered.
    /// Capability failures only affect their own address; store failures abort.
    #[instrument(skip_all, fields(street = %store.target().street_key(), limit = limit))]
    pub fn run<I, G>(
        &self,
        confirmed: I,
        limit: usize,
        store: &mut StreetStore,
        mut on_result: G,
    ) -> Result<PipelineOutcome>
    where
        I: IntoIterator<Item = ConfirmedAddress>,
        G: FnMut(&AddressOutcome),
    {
        let mut results = ResultSet::new();
        let mut produced = 0;
        let mut addresses = confirmed.into_iter();
        let stop = loop {
            if produced >= limit {
                break PipelineStop::LimitReached;
            }
            if self.stop_requested() {
                info!(produced, "stop requested");
                break PipelineStop::Cancelled;
            }
            let Some(address) = addresses.next() else {
                break PipelineStop::Exhausted;
            };

            let (state, result) = self.process(&address);
            store
                .append(result.clone())
                .with_context(|| format!("persist result for {}", address.formatted_address))?;
            let outcome = AddressOutcome {
                index: produced,
                state,
                result: result.clone(),
            };
            produced += 1;
            results.insert(result);
            on_result(&outcome);
        };

        debug!(produced, ?stop, "pipeline finished");
        Ok(PipelineOutcome { results, stop })
    }

    fn process(&self, address: &ConfirmedAddress) -> (AddressState, ProcessedResult) {
        let label = address.formatted_address.as_str();

        let fetched = self.retry.run("fetch_image", Some(&self.image_limiter), || {
            self.fetcher.fetch(address.location)
        });
        let image = match fetched {
            CallOutcome::Ok(image) => image,
            failed => {
                let reason = failed.failure_reason().unwrap_or_default();
                warn!(address = label, %reason, "image fetch failed, recording unknown");
                return (
                    AddressState::ImageFetchFailed,
                    ProcessedResult::unknown(
                        address,
                        format!("image fetch failed: {reason}"),
                        (self.clock)(),
                    ),
                );
            }
        };

        let classified = self
            .retry
            .run("classify", Some(&self.classify_limiter), || {
                self.classifier.classify(&image, label)
            });
        match classified {
            CallOutcome::Ok(classification) => {
                debug!(
                    address = label,
                    likelihood = classification.likelihood.as_str(),
                    "address classified"
                );
                (
                    AddressState::Classified,
                    ProcessedResult::classified(address, classification, (self.clock)()),
                )
            }
            failed => {
                let reason = failed.failure_reason().unwrap_or_default();
                warn!(address = label, %reason, "classification failed, recording unknown");
                (
                    AddressState::ClassificationFailed,
                    ProcessedResult::unknown(
                        address,
                        format!("classification failed: {reason}"),
                        (self.clock)(),
                    ),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Likelihood;
    use crate::io::capabilities::CapabilityError;
    use crate::io::result_store::ResultStore;
    use crate::test_support::{
        ScriptedClassifier, ScriptedImageFetcher, classification, confirmed, elm_target,
        fast_config, fixed_time, location_for,
    };

    fn addresses(numbers: &[u32]) -> Vec<ConfirmedAddress> {
        numbers
            .iter()
            .map(|n| confirmed(&format!("{n} Elm St, Springfield")))
            .collect()
    }

    fn likelihoods(results: &ResultSet) -> Vec<(&str, Likelihood)> {
        results
            .iter()
            .map(|r| (r.address.as_str(), r.garden_likelihood))
            .collect()
    }

    #[test]
    fn classifies_and_persists_each_address() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new();
        let classifier = ScriptedClassifier::new()
            .likelihood("1 Elm St, Springfield", Likelihood::High)
            .likelihood("2 Elm St, Springfield", Likelihood::Medium);
        let store = ResultStore::new(temp.path());
        let mut street = store.open(&elm_target()).expect("open");
        let pipeline =
            ClassificationPipeline::new(&fetcher, &classifier, &config).with_clock(fixed_time);

        let mut seen = Vec::new();
        let outcome = pipeline
            .run(addresses(&[1, 2]), 10, &mut street, |o| seen.push(o.index))
            .expect("run");

        assert_eq!(outcome.stop, PipelineStop::Exhausted);
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(
            likelihoods(&outcome.results),
            vec![
                ("1 Elm St, Springfield", Likelihood::High),
                ("2 Elm St, Springfield", Likelihood::Medium)
            ]
        );
        let stored = store.load(&elm_target()).expect("load");
        assert_eq!(stored, outcome.results);
        let first = stored.get("1 Elm St, Springfield").expect("stored");
        assert_eq!(first.classified_at, fixed_time());
        assert_eq!(first.reasoning.as_deref(), Some("scripted high"));
    }

    #[test]
    fn failures_are_isolated_per_address() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new().fail_at(
            location_for("3 Elm St, Springfield"),
            CapabilityError::terminal("HTTP 403"),
        );
        let timed_out = || Err(CapabilityError::transient("timed out"));
        let classifier = ScriptedClassifier::new()
            .respond(
                "1 Elm St, Springfield",
                vec![timed_out(), timed_out(), timed_out()],
            )
            .likelihood("2 Elm St, Springfield", Likelihood::High);
        let store = ResultStore::new(temp.path());
        let mut street = store.open(&elm_target()).expect("open");
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config);

        let mut states = Vec::new();
        let outcome = pipeline
            .run(addresses(&[1, 2, 3]), 10, &mut street, |o| {
                states.push(o.state);
            })
            .expect("run");

        assert_eq!(
            states,
            vec![
                AddressState::ClassificationFailed,
                AddressState::Classified,
                AddressState::ImageFetchFailed
            ]
        );
        assert_eq!(classifier.calls().len(), 4);

        let stored = store.load(&elm_target()).expect("load");
        assert_eq!(stored, outcome.results);
        assert_eq!(
            likelihoods(&stored),
            vec![
                ("1 Elm St, Springfield", Likelihood::Unknown),
                ("2 Elm St, Springfield", Likelihood::High),
                ("3 Elm St, Springfield", Likelihood::Unknown)
            ]
        );
        let second = stored.get("2 Elm St, Springfield").expect("stored");
        assert_eq!(second.reasoning.as_deref(), Some("scripted high"));
    }

    #[test]
    fn transient_failures_are_retried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new()
            .then_fail(CapabilityError::transient("HTTP 503"))
            .then_fail(CapabilityError::transient("HTTP 503"));
        let classifier = ScriptedClassifier::new().respond(
            "1 Elm St, Springfield",
            vec![
                Err(CapabilityError::transient("timed out")),
                Ok(classification(Likelihood::Medium)),
            ],
        );
        let mut street = ResultStore::new(temp.path())
            .open(&elm_target())
            .expect("open");
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config);

        let outcome = pipeline
            .run(addresses(&[1]), 10, &mut street, |_| {})
            .expect("run");

        assert_eq!(fetcher.calls().len(), 3);
        assert_eq!(classifier.calls().len(), 2);
        assert_eq!(
            likelihoods(&outcome.results),
            vec![("1 Elm St, Springfield", Likelihood::Medium)]
        );
    }

    #[test]
    fn exhausted_retries_record_unknown_with_reason() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new();
        let classifier = ScriptedClassifier::new().respond(
            "1 Elm St, Springfield",
            vec![
                Err(CapabilityError::transient("rate limited")),
                Err(CapabilityError::transient("rate limited")),
                Err(CapabilityError::transient("rate limited")),
            ],
        );
        let mut street = ResultStore::new(temp.path())
            .open(&elm_target())
            .expect("open");
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config);

        let outcome = pipeline
            .run(addresses(&[1]), 10, &mut street, |_| {})
            .expect("run");

        let result = outcome
            .results
            .get("1 Elm St, Springfield")
            .expect("result");
        assert_eq!(result.garden_likelihood, Likelihood::Unknown);
        assert!(
            result
                .reasoning
                .as_deref()
                .is_some_and(|r| r.contains("gave up after 3 attempts"))
        );
    }

    #[test]
    fn limit_stops_pulling_addresses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new();
        let classifier = ScriptedClassifier::new();
        let mut street = ResultStore::new(temp.path())
            .open(&elm_target())
            .expect("open");
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config);

        let mut pulled = 0;
        let source = addresses(&[1, 2, 3, 4]).into_iter().inspect(|_| pulled += 1);
        let outcome = pipeline.run(source, 2, &mut street, |_| {}).expect("run");

        assert_eq!(outcome.stop, PipelineStop::LimitReached);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(pulled, 2);
    }

    #[test]
    fn zero_limit_produces_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new();
        let classifier = ScriptedClassifier::new();
        let store = ResultStore::new(temp.path());
        let mut street = store.open(&elm_target()).expect("open");
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config);

        let outcome = pipeline
            .run(addresses(&[1, 2]), 0, &mut street, |_| {})
            .expect("run");

        assert!(outcome.results.is_empty());
        assert!(fetcher.calls().is_empty());
        assert!(!store.paths(&elm_target()).results_path.exists());
    }

    #[test]
    fn stop_flag_halts_between_addresses() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fast_config(temp.path());
        let fetcher = ScriptedImageFetcher::new();
        let classifier = ScriptedClassifier::new();
        let store = ResultStore::new(temp.path());
        let mut street = store.open(&elm_target()).expect("open");
        let flag = Arc::new(AtomicBool::new(false));
        let pipeline = ClassificationPipeline::new(&fetcher, &classifier, &config)
            .with_stop_flag(Arc::clone(&flag));

        let outcome = pipeline
            .run(addresses(&[1, 2, 3]), 10, &mut street, |_| {
                flag.store(true, Ordering::SeqCst);
            })
            .expect("run");

        assert_eq!(outcome.stop, PipelineStop::Cancelled);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(store.load(&elm_target()).expect("load").len(), 1);
    }
}
