// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;
pub mod server;

/// Build version, as reported by `--version` and the health endpoint.
pub const VERSION: &str = env!("LIVERESULT_BUILD_VERSION");

// Re-export
pub use crate::core::{Hub, HubConfig, LiveResultError, LiveResultService};
