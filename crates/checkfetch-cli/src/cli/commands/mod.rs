//! CLI command handlers, one per file.

mod cache_clear;
mod cache_info;
mod digest;
mod fetch;

pub use cache_clear::run_cache_clear;
pub use cache_info::run_cache_info;
pub use digest::run_digest;
pub use fetch::{run_fetch, FetchRequest};
