//! Integrity-verified fetching and disk caching.
//!
//! A [`locator::IntegrityLocator`] names a remote resource together with the
//! checksum its bytes must hash to. [`fetch::RedirectingFetcher`] downloads
//! it and either verifies immediately or defers the check to
//! [`cache::VerifyingDiskCache`], which re-digests entries on every read.
//! [`engine::Engine`] wires the pieces together.

pub mod cache;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod loader;
pub mod locator;
pub mod logging;
pub mod options;
pub mod strategy;
