//! # Harness Common
//!
//! Shared error taxonomy and types for the proxy e2e harness.
//!
//! Launch failures are the only errors the supervisor surfaces to scenarios;
//! termination failures are recorded and swallowed at the teardown boundary
//! (see `harness-process`).

pub mod errors;
pub mod types;

pub use errors::{LaunchError, LaunchResult, TerminationError};
pub use types::StreamType;
