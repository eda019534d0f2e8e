// src/core/mod.rs

//! The central module containing the hub, the wire protocol, and the live
//! results service built on top of them.

pub mod control;
pub mod errors;
pub mod hub;
pub mod live_result;
pub mod metrics;
pub mod model;
pub mod protocol;
pub mod repository;
pub mod session;

pub use errors::LiveResultError;
pub use hub::{Hub, HubConfig};
pub use live_result::LiveResultService;
