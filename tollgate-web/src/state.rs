//! Application state shared by every handler

use crate::{WebConfig, WebResult};
use std::sync::Arc;
use tollgate_session::{InMemoryProvider, SessionManager, SessionProvider};
use tracing::info;

#[cfg(feature = "sqlite")]
use tollgate_session::SqliteSessionProvider;

#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<WebConfig>,
    /// Session registry behind the gate
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Validate the session settings and build the manager over the
    /// configured storage. The store starts empty.
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let settings = config.sessions.validate()?;
        let provider = build_provider(config.database_url.as_deref()).await?;
        let sessions = SessionManager::new(&settings, provider)?;

        Ok(Self::with_manager(config, Arc::new(sessions)))
    }

    /// Wrap an already constructed manager
    pub fn with_manager(config: WebConfig, sessions: Arc<SessionManager>) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }
}

async fn build_provider(database_url: Option<&str>) -> WebResult<Arc<dyn SessionProvider>> {
    match database_url {
        #[cfg(feature = "sqlite")]
        Some(url) => {
            info!("🗄️  Session storage: {}", url);
            Ok(Arc::new(SqliteSessionProvider::connect(url).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        Some(url) => Err(crate::WebError::Config(format!(
            "database_url '{}' requires the sqlite feature",
            url
        ))),
        None => {
            info!("🗄️  Session storage: in-memory");
            Ok(Arc::new(InMemoryProvider::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::SessionsConfig;

    #[tokio::test]
    async fn test_missing_secret_is_fatal() {
        let config = WebConfig::default();
        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_state() {
        let config = WebConfig {
            sessions: SessionsConfig::new("state-secret", 30),
            ..WebConfig::default()
        };
        let state = AppState::new(config).await.unwrap();

        let token = state.sessions.create_token(1).await.unwrap();
        assert!(state.sessions.validate_token(&token).await.unwrap().is_some());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_state() {
        let config = WebConfig {
            sessions: SessionsConfig::new("state-secret", 30),
            database_url: Some("sqlite::memory:".to_string()),
            ..WebConfig::default()
        };
        let state = AppState::new(config).await.unwrap();

        let token = state.sessions.create_token(2).await.unwrap();
        let record = state.sessions.validate_token(&token).await.unwrap().unwrap();
        assert!(record.persistence_id.is_some());
    }
}
