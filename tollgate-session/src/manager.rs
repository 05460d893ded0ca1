//! Session Manager - token issuance, validation and eviction
//!
//! Lock discipline: the store lock covers each map mutation (and the whole
//! lookup/expiry/renew sequence of a validation) and is always released
//! before the persistence provider is called.

use crate::clock::{Clock, SystemClock};
use crate::codec::TokenCodec;
use crate::events::{SessionEvent, SessionEvents};
use crate::provider::SessionProvider;
use crate::store::SessionStore;
use crate::types::{SessionRecord, UserId};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tollgate_core::{
    config_error, ErrorContext, SessionSettings, TollgateError, TollgateResult,
    MAX_TOKEN_TIMEOUT_MINUTES,
};
use tracing::{debug, info, warn};

pub struct SessionManager {
    codec: TokenCodec,
    store: SessionStore,
    provider: Arc<dyn SessionProvider>,
    timeout_minutes: i64,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    events: SessionEvents,
}

impl SessionManager {
    /// Create a manager with an empty store. Call [`SessionManager::load`]
    /// before serving validations.
    pub fn new(
        settings: &SessionSettings,
        provider: Arc<dyn SessionProvider>,
    ) -> TollgateResult<Self> {
        let minutes = settings.token_timeout_minutes;
        let timeout = Duration::try_minutes(minutes)
            .filter(|_| minutes > 0 && minutes <= MAX_TOKEN_TIMEOUT_MINUTES)
            .ok_or_else(|| {
                config_error!(
                    format!("Invalid tokenTimeout: {} minutes", minutes),
                    "session_manager"
                )
            })?;

        Ok(Self {
            codec: TokenCodec::new(&settings.secret)?,
            store: SessionStore::new(),
            provider,
            timeout_minutes: minutes,
            timeout,
            clock: Arc::new(SystemClock),
            events: SessionEvents::default(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: SessionEvents) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of records currently in the store
    pub async fn live_sessions(&self) -> usize {
        self.store.len().await
    }

    /// Issue a token for `user_id`.
    ///
    /// The token is usable as soon as this returns, even if the durable write
    /// fails; in that case the error is `NotPersisted` and carries the token.
    pub async fn create_token(&self, user_id: UserId) -> TollgateResult<String> {
        let record = {
            let mut creation_time = self.clock.now();
            let mut guard = self.store.lock().await;

            let mut token = self
                .codec
                .encode(user_id, self.timeout_minutes, creation_time)?;
            while guard.contains(&token) {
                creation_time += Duration::nanoseconds(1);
                token = self
                    .codec
                    .encode(user_id, self.timeout_minutes, creation_time)?;
            }

            let record = SessionRecord::issue(user_id, token, creation_time, self.timeout());
            guard.put(record.clone());
            record
        };

        info!(user_id, "Created session");
        self.events.publish(SessionEvent::Created { user_id });

        let id = match self.provider.create_session(&record).await {
            Ok(id) => id,
            Err(e) => return Err(Self::not_persisted(record.token, e)),
        };

        let Some(current) = self.store.attach_persistence_id(&record.token, id).await else {
            // Evicted while the write was in flight; drop the orphan.
            let mut orphan = record.clone();
            orphan.persistence_id = Some(id);
            debug!(user_id, persistence_id = id, "Removing orphaned durable session");
            self.provider.remove_session(&orphan).await?;
            return Ok(record.token);
        };

        self.events.publish(SessionEvent::Persisted {
            user_id,
            persistence_id: id,
        });

        // Renewals that ran before the id was attached had nothing to write to
        if current.expiration_time != record.expiration_time {
            if let Err(e) = self
                .provider
                .update_session_time(id, current.expiration_time, current.last_access_time)
                .await
            {
                return Err(Self::not_persisted(record.token, e));
            }
        }

        Ok(record.token)
    }

    fn not_persisted(token: String, source: TollgateError) -> TollgateError {
        warn!(error = %source, "Session is live but was not persisted");
        TollgateError::NotPersisted {
            token,
            source: Box::new(source),
            context: ErrorContext::new("session_manager")
                .with_operation("create_token")
                .with_suggestion("The token is valid for this process; retry persistence or reissue later"),
        }
    }

    /// Resolve a token to its session, renewing the sliding window.
    ///
    /// `Ok(None)` covers every authentication failure alike: bad signature,
    /// unknown token, expired token, user mismatch. Only a token that cannot
    /// be parsed is an error.
    pub async fn validate_token(&self, token: &str) -> TollgateResult<Option<SessionRecord>> {
        let decoded = TokenCodec::decode(token)?;

        if !decoded.header.is_hs256() || !self.codec.verify(token) {
            debug!("Token rejected: signature");
            return Ok(None);
        }

        let renewed = {
            let now = self.clock.now();
            let mut guard = self.store.lock().await;

            let Some(record) = guard.get_mut(token) else {
                debug!("Token rejected: unknown");
                return Ok(None);
            };

            if record.is_expired_at(now) {
                if let Some(expired) = guard.remove(token) {
                    debug!(user_id = expired.user_id, "Token rejected: expired");
                    self.events.publish(SessionEvent::Expired {
                        user_id: expired.user_id,
                        persistence_id: expired.persistence_id,
                    });
                }
                return Ok(None);
            }

            if record.user_id != decoded.payload.user_id {
                debug!("Token rejected: user mismatch");
                return Ok(None);
            }

            record.renew(now, self.timeout());
            record.clone()
        };

        self.events.publish(SessionEvent::Renewed {
            user_id: renewed.user_id,
            persistence_id: renewed.persistence_id,
        });

        if let Some(id) = renewed.persistence_id {
            self.provider
                .update_session_time(id, renewed.expiration_time, renewed.last_access_time)
                .await?;
        }

        Ok(Some(renewed))
    }

    /// Log a token out. Unknown tokens are a no-op.
    pub async fn evict_token(&self, token: &str) -> TollgateResult<()> {
        let Some(record) = self.store.remove(token).await else {
            return Ok(());
        };

        info!(user_id = record.user_id, "Evicted session");
        self.events.publish(SessionEvent::Evicted {
            user_id: record.user_id,
            persistence_id: record.persistence_id,
        });

        self.provider.remove_session(&record).await
    }

    /// Compact durable storage. The in-memory store is untouched.
    pub async fn shrink(&self) -> TollgateResult<()> {
        self.provider.shrink().await
    }

    /// Drop expired records from the in-memory store and return how many
    /// were removed. Expired records are rejected on access regardless.
    pub async fn sweep_expired(&self) -> usize {
        let swept = self.store.sweep_expired(self.clock.now()).await;
        for record in &swept {
            self.events.publish(SessionEvent::Expired {
                user_id: record.user_id,
                persistence_id: record.persistence_id,
            });
        }
        if !swept.is_empty() {
            info!("Swept {} expired sessions", swept.len());
        }
        swept.len()
    }

    /// Replace the store with the provider's snapshot
    pub async fn load(&self) -> TollgateResult<usize> {
        let snapshot = self.provider.load_snapshot().await?;

        let snapshot: HashMap<String, SessionRecord> = snapshot
            .into_iter()
            .filter(|(key, record)| {
                let consistent = *key == record.token;
                if !consistent {
                    warn!(
                        persistence_id = ?record.persistence_id,
                        "Skipping snapshot entry whose key does not match its token"
                    );
                }
                consistent
            })
            .collect();

        let loaded = snapshot.len();
        self.store.replace_all(snapshot).await;

        info!("Loaded {} sessions", loaded);
        self.events.publish(SessionEvent::Loaded { sessions: loaded });
        Ok(loaded)
    }
}
