//! Deterministic, pure logic shared by the survey pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod dedupe;
pub mod ordering;
pub mod range;
pub mod result_set;
pub mod street;
pub mod summary;
pub mod types;
