//! Session Store - in-memory token index
//!
//! One exclusive lock guards the whole map. Callers that need a
//! read-modify-write sequence take the lock once through [`SessionStore::lock`]
//! and work on the returned guard; the guard must be dropped before any call
//! into persistence.

use crate::types::{PersistenceId, SessionRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

/// Exclusive access to the store for the lifetime of the guard
pub struct SessionStoreGuard<'a> {
    sessions: MutexGuard<'a, HashMap<String, SessionRecord>>,
}

impl SessionStoreGuard<'_> {
    pub fn get(&self, token: &str) -> Option<&SessionRecord> {
        self.sessions.get(token)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut SessionRecord> {
        self.sessions.get_mut(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }

    /// Insert or overwrite, keyed by the record's own token
    pub fn put(&mut self, record: SessionRecord) -> Option<SessionRecord> {
        self.sessions.insert(record.token.clone(), record)
    }

    pub fn remove(&mut self, token: &str) -> Option<SessionRecord> {
        self.sessions.remove(token)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> SessionStoreGuard<'_> {
        SessionStoreGuard {
            sessions: self.sessions.lock().await,
        }
    }

    pub async fn put(&self, record: SessionRecord) -> Option<SessionRecord> {
        self.lock().await.put(record)
    }

    /// Copy of the record stored under `token`
    pub async fn get(&self, token: &str) -> Option<SessionRecord> {
        self.lock().await.get(token).cloned()
    }

    pub async fn remove(&self, token: &str) -> Option<SessionRecord> {
        self.lock().await.remove(token)
    }

    /// Replace the whole map, used once at startup
    pub async fn replace_all(&self, snapshot: HashMap<String, SessionRecord>) {
        let mut guard = self.lock().await;
        *guard.sessions = snapshot;
    }

    /// Record the persistence id if the record is still live and has none yet.
    /// Returns a copy of the updated record, or `None` when the record is
    /// gone or already carries an id.
    pub async fn attach_persistence_id(
        &self,
        token: &str,
        id: PersistenceId,
    ) -> Option<SessionRecord> {
        let mut guard = self.lock().await;
        match guard.get_mut(token) {
            Some(record) if record.persistence_id.is_none() => {
                record.persistence_id = Some(id);
                Some(record.clone())
            }
            _ => None,
        }
    }

    /// Remove every record expired at `now` and return them
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<SessionRecord> {
        let mut guard = self.lock().await;
        let expired: Vec<String> = guard
            .sessions
            .iter()
            .filter(|(_, record)| record.is_expired_at(now))
            .map(|(token, _)| token.clone())
            .collect();

        expired
            .iter()
            .filter_map(|token| guard.sessions.remove(token))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }
}
