//! Session lifecycle integration tests

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tollgate_core::{persistence_error, SessionSettings, TollgateError, TollgateResult};
use tollgate_session::{
    InMemoryProvider, ManualClock, PersistenceId, SessionManager, SessionProvider, SessionRecord,
    TokenCodec,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn settings(minutes: i64) -> SessionSettings {
    SessionSettings {
        secret: "integration-secret".to_string(),
        token_timeout_minutes: minutes,
    }
}

fn manager_with_clock() -> (Arc<SessionManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let provider = Arc::new(InMemoryProvider::with_clock(clock.clone()));
    let manager = SessionManager::new(&settings(30), provider)
        .unwrap()
        .with_clock(clock.clone());
    (Arc::new(manager), clock)
}

/// Provider whose writes always fail
struct FailingProvider;

#[async_trait]
impl SessionProvider for FailingProvider {
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>> {
        Err(persistence_error!("database offline", "failing_provider"))
    }

    async fn create_session(&self, _record: &SessionRecord) -> TollgateResult<PersistenceId> {
        Err(persistence_error!("database offline", "failing_provider"))
    }

    async fn update_session_time(
        &self,
        _id: PersistenceId,
        _expiration_time: DateTime<Utc>,
        _last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()> {
        Err(persistence_error!("database offline", "failing_provider"))
    }

    async fn remove_session(&self, _record: &SessionRecord) -> TollgateResult<()> {
        Err(persistence_error!("database offline", "failing_provider"))
    }

    async fn shrink(&self) -> TollgateResult<()> {
        Err(persistence_error!("database offline", "failing_provider"))
    }
}

/// Provider that reports each create and then waits to be released
struct GatedProvider {
    inner: InMemoryProvider,
    seen: mpsc::UnboundedSender<String>,
    release: Arc<Notify>,
}

#[async_trait]
impl SessionProvider for GatedProvider {
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>> {
        self.inner.load_snapshot().await
    }

    async fn create_session(&self, record: &SessionRecord) -> TollgateResult<PersistenceId> {
        let _ = self.seen.send(record.token.clone());
        self.release.notified().await;
        self.inner.create_session(record).await
    }

    async fn update_session_time(
        &self,
        id: PersistenceId,
        expiration_time: DateTime<Utc>,
        last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()> {
        self.inner
            .update_session_time(id, expiration_time, last_access_time)
            .await
    }

    async fn remove_session(&self, record: &SessionRecord) -> TollgateResult<()> {
        self.inner.remove_session(record).await
    }

    async fn shrink(&self) -> TollgateResult<()> {
        self.inner.shrink().await
    }
}

/// Provider that holds the first renewal write until released
struct HeldUpdateProvider {
    inner: InMemoryProvider,
    hold_next: AtomicBool,
    held: mpsc::UnboundedSender<DateTime<Utc>>,
    release: Arc<Notify>,
}

#[async_trait]
impl SessionProvider for HeldUpdateProvider {
    async fn load_snapshot(&self) -> TollgateResult<HashMap<String, SessionRecord>> {
        self.inner.load_snapshot().await
    }

    async fn create_session(&self, record: &SessionRecord) -> TollgateResult<PersistenceId> {
        self.inner.create_session(record).await
    }

    async fn update_session_time(
        &self,
        id: PersistenceId,
        expiration_time: DateTime<Utc>,
        last_access_time: DateTime<Utc>,
    ) -> TollgateResult<()> {
        if self.hold_next.swap(false, Ordering::SeqCst) {
            let _ = self.held.send(expiration_time);
            self.release.notified().await;
        }
        self.inner
            .update_session_time(id, expiration_time, last_access_time)
            .await
    }

    async fn remove_session(&self, record: &SessionRecord) -> TollgateResult<()> {
        self.inner.remove_session(record).await
    }

    async fn shrink(&self) -> TollgateResult<()> {
        self.inner.shrink().await
    }
}

#[tokio::test]
async fn test_round_trip_recovers_user_and_timeout() {
    let codec = TokenCodec::new("integration-secret").unwrap();
    let token = codec.encode(1234, 15, t0()).unwrap();

    let decoded = TokenCodec::decode(&token).unwrap();
    assert_eq!(decoded.payload.user_id, 1234);
    assert_eq!(decoded.payload.minutes_timeout, 15);
    assert!(codec.verify(&token));
}

#[tokio::test]
async fn test_every_signature_bit_flip_is_rejected() {
    let (manager, _) = manager_with_clock();
    let token = manager.create_token(42).await.unwrap();

    let (signing_input, signature) = token.rsplit_once('.').unwrap();
    let signature = URL_SAFE_NO_PAD.decode(signature).unwrap();

    for byte in 0..signature.len() {
        for bit in 0..8 {
            let mut flipped = signature.clone();
            flipped[byte] ^= 1 << bit;
            let forged = format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(&flipped));

            let result = manager.validate_token(&forged).await.unwrap();
            assert!(result.is_none(), "bit {} of byte {} accepted", bit, byte);
        }
    }

    // The untouched token still works
    assert!(manager.validate_token(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_altered_payload_is_rejected_even_if_stored() {
    let (manager, _) = manager_with_clock();
    let token = manager.create_token(42).await.unwrap();

    let parts: Vec<&str> = token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
    let mut payload: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    payload["userId"] = serde_json::json!(1);
    let forged = format!(
        "{}.{}.{}",
        parts[0],
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
        parts[2]
    );

    assert!(manager.validate_token(&forged).await.unwrap().is_none());
}

#[tokio::test]
async fn test_legacy_two_segment_token_is_malformed() {
    let (manager, _) = manager_with_clock();
    let token = manager.create_token(42).await.unwrap();
    let legacy = token.rsplit_once('.').unwrap().0;

    let err = manager.validate_token(legacy).await.unwrap_err();
    assert!(err.is_malformed_token());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_validations_both_renew() {
    let (manager, clock) = manager_with_clock();
    let token = manager.create_token(42).await.unwrap();
    let before = t0() + Duration::minutes(30);

    clock.advance(Duration::minutes(5));

    let a = {
        let manager = manager.clone();
        let token = token.clone();
        tokio::spawn(async move { manager.validate_token(&token).await })
    };
    let b = {
        let manager = manager.clone();
        let token = token.clone();
        tokio::spawn(async move { manager.validate_token(&token).await })
    };

    let a = a.await.unwrap().unwrap().unwrap();
    let b = b.await.unwrap().unwrap().unwrap();

    assert!(a.expiration_time > before);
    assert!(b.expiration_time > before);
    assert_eq!(a.expiration_time, t0() + Duration::minutes(35));
    assert_eq!(b.expiration_time, t0() + Duration::minutes(35));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_validate_evict() {
    let (manager, _) = manager_with_clock();

    let tasks: Vec<_> = (0..8)
        .map(|worker| {
            let manager = manager.clone();
            tokio::spawn(async move {
                for i in 0..25 {
                    let user_id = worker * 100 + i;
                    let token = manager.create_token(user_id).await.unwrap();
                    let record = manager.validate_token(&token).await.unwrap().unwrap();
                    assert_eq!(record.user_id, user_id);
                    manager.evict_token(&token).await.unwrap();
                    assert!(manager.validate_token(&token).await.unwrap().is_none());
                }
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(manager.live_sessions().await, 0);
}

#[tokio::test]
async fn test_persistence_failure_leaves_session_usable() {
    let manager = SessionManager::new(&settings(30), Arc::new(FailingProvider)).unwrap();

    let err = manager.create_token(8).await.unwrap_err();
    assert!(matches!(err, TollgateError::NotPersisted { .. }));
    assert!(err.is_recoverable());

    let token = err.unpersisted_token().unwrap().to_string();
    // No persistence id, so renewal never reaches the failing provider
    let record = manager.validate_token(&token).await.unwrap().unwrap();
    assert_eq!(record.user_id, 8);
    assert!(record.persistence_id.is_none());

    // Eviction removes the live session but reports the durable failure
    let err = manager.evict_token(&token).await.unwrap_err();
    assert!(matches!(err, TollgateError::Persistence { .. }));
    assert!(manager.validate_token(&token).await.unwrap().is_none());

    assert!(manager.load().await.is_err());
    assert!(manager.shrink().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_eviction_during_persist_removes_durable_copy() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let provider = Arc::new(GatedProvider {
        inner: InMemoryProvider::new(),
        seen: seen_tx,
        release: release.clone(),
    });
    let manager = Arc::new(SessionManager::new(&settings(30), provider.clone()).unwrap());

    let create = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.create_token(11).await })
    };

    let token = seen_rx.recv().await.unwrap();
    // Live before the durable write completes
    assert!(manager.validate_token(&token).await.unwrap().is_some());

    manager.evict_token(&token).await.unwrap();
    release.notify_one();

    let returned = create.await.unwrap().unwrap();
    assert_eq!(returned, token);
    assert!(provider.inner.is_empty().await);
    assert!(manager.validate_token(&token).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_late_renewal_write_does_not_roll_back_expiration() {
    let clock = Arc::new(ManualClock::new(t0()));
    let (held_tx, mut held_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let provider = Arc::new(HeldUpdateProvider {
        inner: InMemoryProvider::with_clock(clock.clone()),
        hold_next: AtomicBool::new(false),
        held: held_tx,
        release: release.clone(),
    });
    let manager = Arc::new(
        SessionManager::new(&settings(30), provider.clone())
            .unwrap()
            .with_clock(clock.clone()),
    );

    let token = manager.create_token(21).await.unwrap();
    let id = provider.inner.load_snapshot().await.unwrap()[&token]
        .persistence_id
        .unwrap();

    // First request renews at T0+1m, its write stalls
    provider.hold_next.store(true, Ordering::SeqCst);
    clock.advance(Duration::minutes(1));
    let first = {
        let manager = manager.clone();
        let token = token.clone();
        tokio::spawn(async move { manager.validate_token(&token).await })
    };
    assert_eq!(held_rx.recv().await.unwrap(), t0() + Duration::minutes(31));

    // Second request renews at T0+11m and lands first
    clock.advance(Duration::minutes(10));
    let second = manager.validate_token(&token).await.unwrap().unwrap();
    assert_eq!(second.expiration_time, t0() + Duration::minutes(41));

    release.notify_one();
    first.await.unwrap().unwrap().unwrap();

    let stored = provider.inner.get(id).await.unwrap();
    assert_eq!(stored.expiration_time, t0() + Duration::minutes(41));
    assert_eq!(stored.last_access_time, t0() + Duration::minutes(11));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_renewal_before_persist_reaches_storage() {
    let clock = Arc::new(ManualClock::new(t0()));
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Notify::new());
    let provider = Arc::new(GatedProvider {
        inner: InMemoryProvider::with_clock(clock.clone()),
        seen: seen_tx,
        release: release.clone(),
    });
    let manager = Arc::new(
        SessionManager::new(&settings(30), provider.clone())
            .unwrap()
            .with_clock(clock.clone()),
    );

    let create = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.create_token(12).await })
    };
    let token = seen_rx.recv().await.unwrap();

    // Renewed while the durable insert is still pending
    clock.advance(Duration::minutes(5));
    let renewed = manager.validate_token(&token).await.unwrap().unwrap();
    assert!(renewed.persistence_id.is_none());
    assert_eq!(renewed.expiration_time, t0() + Duration::minutes(35));

    release.notify_one();
    create.await.unwrap().unwrap();

    let stored = &provider.inner.load_snapshot().await.unwrap()[&token];
    assert_eq!(stored.expiration_time, t0() + Duration::minutes(35));
    assert_eq!(stored.last_access_time, t0() + Duration::minutes(5));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sessions_survive_restart_with_sqlite() {
    use tollgate_session::SqliteSessionProvider;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("sessions.db").display());

    let token = {
        let provider = Arc::new(SqliteSessionProvider::connect(&url).await.unwrap());
        let manager = SessionManager::new(&settings(30), provider.clone()).unwrap();
        let token = manager.create_token(314).await.unwrap();
        manager.validate_token(&token).await.unwrap().unwrap();
        provider.pool().close().await;
        token
    };

    let provider = Arc::new(SqliteSessionProvider::connect(&url).await.unwrap());
    let manager = SessionManager::new(&settings(30), provider).unwrap();
    manager.shrink().await.unwrap();
    assert_eq!(manager.load().await.unwrap(), 1);

    let record = manager.validate_token(&token).await.unwrap().unwrap();
    assert_eq!(record.user_id, 314);
    assert!(record.persistence_id.is_some());
}
