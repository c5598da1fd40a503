use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::transport::session::{SessionHandle, SessionId};

/// Session registry: `session_id -> SessionHandle`.
///
/// Topics store ids only; a handle is looked up at delivery time, so a
/// deregistered session is simply absent instead of kept alive.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    seq: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh session id.
    pub fn next_id(&self) -> SessionId {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id(), handle);
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every registered handle.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }
}
