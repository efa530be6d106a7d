//! Lazy discovery of rooftop-confirmed addresses on a street.
//!
//! [`AddressEnumerator`] walks the planned house numbers in
//! [`candidate_order`], probing each one at most once. It only probes when the
//! consumer pulls the next item, so `take(n)` bounds network traffic.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::core::ordering::{CandidateOrder, candidate_order};
use crate::core::street::{leading_house_number, matches_street};
use crate::core::types::{
    ConfirmedAddress, GeocodeAnchor, GeocodeMatch, PrecisionTier, RangePlan, StreetTarget,
};
use crate::io::capabilities::GeocodeProbe;
use crate::io::rate_limit::RateLimiter;

/// Why a probed candidate was not yielded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discard {
    NoMatch,
    NotRooftop,
    OtherStreet,
    NotResidential,
    AlreadyDone,
    AlreadyYielded,
}

pub struct AddressEnumerator<'a, P: ?Sized> {
    probe: &'a P,
    limiter: &'a RateLimiter,
    street_name: String,
    target: StreetTarget,
    candidates: CandidateOrder,
    already_done: &'a HashSet<String>,
    done_numbers: HashSet<u32>,
    yielded: HashSet<String>,
    probes: usize,
}

impl<'a, P: GeocodeProbe + ?Sized> AddressEnumerator<'a, P> {
    pub fn new(
        probe: &'a P,
        limiter: &'a RateLimiter,
        anchor: &GeocodeAnchor,
        target: &StreetTarget,
        plan: &RangePlan,
        already_done: &'a HashSet<String>,
    ) -> Self {
        let done_numbers = already_done
            .iter()
            .filter_map(|address| leading_house_number(address))
            .collect();
        Self {
            probe,
            limiter,
            street_name: anchor.formatted_street_name.clone(),
            target: target.clone(),
            candidates: candidate_order(plan),
            already_done,
            done_numbers,
            yielded: HashSet::new(),
            probes: 0,
        }
    }

    /// Probe calls made so far.
    pub fn probes(&self) -> usize {
        self.probes
    }

    fn check(&self, found: Option<GeocodeMatch>) -> Result<GeocodeMatch, Discard> {
        let found = found.ok_or(Discard::NoMatch)?;
        if found.precision != PrecisionTier::Rooftop {
            return Err(Discard::NotRooftop);
        }
        if !matches_street(&found.formatted_address, &self.target.street_name)
            && !matches_street(&found.formatted_address, &self.street_name)
        {
            return Err(Discard::OtherStreet);
        }
        if !found.residential {
            return Err(Discard::NotResidential);
        }
        if self.already_done.contains(&found.formatted_address) {
            return Err(Discard::AlreadyDone);
        }
        if self.yielded.contains(&found.formatted_address) {
            return Err(Discard::AlreadyYielded);
        }
        Ok(found)
    }
}

impl<P: GeocodeProbe + ?Sized> Iterator for AddressEnumerator<'_, P> {
    type Item = ConfirmedAddress;

    fn next(&mut self) -> Option<ConfirmedAddress> {
        while let Some(number) = self.candidates.next() {
            if self.done_numbers.contains(&number) {
                debug!(number, "already processed, skipping probe");
                continue;
            }

            self.limiter.wait_if_needed();
            self.probes += 1;
            let result = self
                .probe
                .probe(number, &self.street_name, &self.target.suburb);
            let found = match result {
                Ok(found) => found,
                Err(err) => {
                    warn!(number, %err, "probe failed, treating as no match");
                    continue;
                }
            };

            match self.check(found) {
                Ok(found) => {
                    debug!(number, address = %found.formatted_address, "address confirmed");
                    self.yielded.insert(found.formatted_address.clone());
                    return Some(ConfirmedAddress {
                        formatted_address: found.formatted_address,
                        location: found.location,
                        precision_tier: found.precision,
                    });
                }
                Err(reason) => debug!(number, ?reason, "candidate discarded"),
            }
        }
        None
    }
}
