//! Side-effecting collaborators: persistence, HTTP, child processes, pacing.

pub mod capabilities;
pub mod classifier;
pub mod config;
pub mod google;
pub mod image_cache;
pub mod process;
pub mod rate_limit;
pub mod result_store;
pub mod retry;
