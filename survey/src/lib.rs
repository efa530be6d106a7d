//! Resumable street survey for backyard vegetable gardens.
//!
//! A run resolves a street, plans a house-number window, discovers
//! rooftop-precise residential addresses one probe at a time, classifies
//! satellite imagery of each, and persists every result as it lands. The
//! crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (windows, ordering, street
//!   matching, result sets). No I/O.
//! - **[`io`]**: Side effects (result store, Google Maps, the classifier
//!   process, rate limiting, retries) behind capability traits.
//!
//! Orchestration modules ([`plan`], [`enumerate`], [`pipeline`], [`survey`])
//! compose the two to implement CLI commands.

pub mod core;
pub mod enumerate;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod plan;
pub mod survey;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
