//! Persistence Provider contract and an in-memory implementation
//!
//! Providers give sessions durability across restarts. They are never needed
//! for a running process to validate tokens correctly, and the manager never
//! calls them while holding the store lock.

use crate::clock::{Clock, SystemClock};
use crate::types::{PersistenceId, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tollgate_core::TollgateResult;
use tracing::debug;

/// Durable session storage.
///
/// Timeouts and retries are the provider's own business.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// All stored sessions keyed by token string
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>>;

    /// Store a new session and return its id
    async fn create_session(&self, record: &SessionRecord) -> TollgateResult<PersistenceId>;

    /// Record a renewal. Writes may arrive out of order, so an update whose
    /// expiration time is not later than the stored one must be ignored.
    async fn update_session_time(
        &self,
        id: PersistenceId,
        expiration_time: DateTime<Utc>,
        last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()>;

    async fn remove_session(&self, record: &SessionRecord) -> TollgateResult<()>;

    /// Compact storage, discarding sessions that can no longer be valid
    async fn shrink(&self) -> TollgateResult<()>;
}

/// Provider that keeps sessions in process memory.
///
/// Survives nothing, but honours the full contract, which makes it the
/// default for development and the reference for tests.
pub struct InMemoryProvider {
    sessions: RwLock<HashMap<PersistenceId, SessionRecord>>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            clock,
        }
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Stored copy for an id
    pub async fn get(&self, id: PersistenceId) -> Option<SessionRecord> {
        self.sessions.read().await.get(&id).cloned()
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for InMemoryProvider {
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .map(|record| (record.token.clone(), record.clone()))
            .collect())
    }

    async fn create_session(&self, record: &SessionRecord) -> TollgateResult<PersistenceId> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = record.clone();
        stored.persistence_id = Some(id);

        self.sessions.write().await.insert(id, stored);
        debug!("Stored session {} in memory", id);
        Ok(id)
    }

    async fn update_session_time(
        &self,
        id: PersistenceId,
        expiration_time: DateTime<Utc>,
        last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()> {
        match self.sessions.write().await.get_mut(&id) {
            Some(record) if record.expiration_time < expiration_time => {
                record.expiration_time = expiration_time;
                record.last_access_time = last_access_time;
            }
            Some(_) => debug!("Ignored stale renewal for session {}", id),
            None => {}
        }
        Ok(())
    }

    async fn remove_session(&self, record: &SessionRecord) -> TollgateResult<()> {
        let mut sessions = self.sessions.write().await;
        match record.persistence_id {
            Some(id) => {
                sessions.remove(&id);
            }
            None => sessions.retain(|_, stored| stored.token != record.token),
        }
        Ok(())
    }

    async fn shrink(&self) -> TollgateResult<()> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired_at(now));
        debug!("Shrink removed {} expired sessions", before - sessions.len());
        Ok(())
    }
}
