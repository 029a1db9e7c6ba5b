//! # Harness Config
//!
//! Utility collaborators for scenarios: the proxy's JSON config document,
//! temporary directory allocation, and file digests for relay-integrity
//! checks.

pub mod fixtures;
pub mod proxy;

pub use fixtures::{allocate_temp_dir, compare_files, hash_file, write_pattern_file};
pub use proxy::{write_config, ProxyConfig, ProxyRoute};
