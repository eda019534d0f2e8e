// src/core/errors.rs

//! Defines the primary error type for the live results service.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all failures surfaced by the live results
/// subsystem and its collaborators.
///
/// Nothing in here is fatal to the process: transport failures end one session,
/// repository failures fail one request, and hub-queue overflow is logged rather
/// than returned.
#[derive(Error, Debug)]
pub enum LiveResultError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed control message: {0}")]
    MalformedControl(String),

    /// The hub event loop is gone (shut down or never started).
    #[error("Live results hub is not running")]
    HubUnavailable,

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// `serde_json::Error` is not cloneable, so it is kept behind an `Arc` and the
// enum is cloned by hand.
impl Clone for LiveResultError {
    fn clone(&self) -> Self {
        match self {
            LiveResultError::NotFound { kind, id } => LiveResultError::NotFound {
                kind: *kind,
                id: id.clone(),
            },
            LiveResultError::InvalidRequest(s) => LiveResultError::InvalidRequest(s.clone()),
            LiveResultError::MalformedControl(s) => LiveResultError::MalformedControl(s.clone()),
            LiveResultError::HubUnavailable => LiveResultError::HubUnavailable,
            LiveResultError::Serialization(e) => LiveResultError::Serialization(Arc::clone(e)),
            LiveResultError::Internal(s) => LiveResultError::Internal(s.clone()),
        }
    }
}

impl PartialEq for LiveResultError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                LiveResultError::NotFound { kind: k1, id: i1 },
                LiveResultError::NotFound { kind: k2, id: i2 },
            ) => k1 == k2 && i1 == i2,
            (LiveResultError::InvalidRequest(s1), LiveResultError::InvalidRequest(s2)) => s1 == s2,
            (LiveResultError::MalformedControl(s1), LiveResultError::MalformedControl(s2)) => {
                s1 == s2
            }
            (LiveResultError::Serialization(e1), LiveResultError::Serialization(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (LiveResultError::Internal(s1), LiveResultError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl LiveResultError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LiveResultError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<serde_json::Error> for LiveResultError {
    fn from(e: serde_json::Error) -> Self {
        LiveResultError::Serialization(Arc::new(e))
    }
}
