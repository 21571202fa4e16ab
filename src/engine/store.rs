//! Concurrent session store.
//!
//! A sharded map from flow key to session. The map's per-shard locks cover
//! only lookup and insertion; each session carries its own mutex for field
//! updates, so detectors on unrelated flows never contend and the decay loop
//! can sweep while requests are in flight. Lock ordering is store shard →
//! session mutex, and no store operation runs while a session lock is held.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::engine::types::{FlowKey, Session};

pub struct SessionStore {
    sessions: DashMap<FlowKey, Arc<Mutex<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Returns the session for `key`, creating it with `init` if absent.
    ///
    /// Atomic per key: concurrent calls with the same key observe the same
    /// instance. The second tuple element is `true` when this call inserted.
    pub fn get_or_create(
        &self,
        key: FlowKey,
        init: impl FnOnce() -> Session,
    ) -> (Arc<Mutex<Session>>, bool) {
        let mut created = false;
        let session = self
            .sessions
            .entry(key)
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(init()))
            })
            .clone();
        (session, created)
    }

    /// Clones out references to every live session.
    ///
    /// Shard locks are held only while copying the `Arc`s, so the decay loop
    /// can lock each session afterwards without blocking detector updates on
    /// other flows.
    pub fn snapshot(&self) -> Vec<Arc<Mutex<Session>>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Removes entries for which `keep` returns `false`.
    pub fn retain(&self, mut keep: impl FnMut(&FlowKey, &Arc<Mutex<Session>>) -> bool) {
        self.sessions.retain(|k, v| keep(k, v));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
