//! Blockclock library
//!
//! Exposes the cache, fetch, CLI, and source-configuration modules for
//! use in integration tests.

pub mod cache;
pub mod cli;
pub mod fetch;
pub mod sources;
