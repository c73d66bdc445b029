//! Shared utilities: bounded history, TTL cache, config merging, text helpers
//! and error types.

pub mod bounded_log;
pub mod config;
pub mod errors;
pub mod string_utils;
pub mod ttl_cache;

pub use bounded_log::{BoundedLog, Keyed};
pub use config::merge_overrides;
pub use errors::{ConfigError, DependencyError, LookupError, SwitchError};
pub use ttl_cache::TtlCache;
