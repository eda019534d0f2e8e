// src/core/hub/registry.rs

//! The authoritative map of active sessions.

use crate::core::session::{Session, SessionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps session ids to sessions.
///
/// Only the hub event loop inserts or removes entries (the mutators are
/// crate-private and called from `HubLoop`). Reads such as `len` come from HTTP
/// handlers on other tasks, so every access still goes through the lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Inserts a session, returning the entry it replaced, if any.
    pub(crate) fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.write().insert(session.id().clone(), session)
    }

    pub(crate) fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Removes and returns every session.
    pub(crate) fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    /// Runs `f` over every session with the map read-locked.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&Arc<Session>)) {
        for session in self.sessions.read().values() {
            f(session);
        }
    }
}
