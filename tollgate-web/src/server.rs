//! Tollgate Web Server
//!
//! Startup sequence, background maintenance and the session audit trail.

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tollgate_core::SessionsConfig;
use tollgate_session::{SessionEvent, SessionManager};
use tracing::{error, info, warn};

/// Main Tollgate web server
pub struct TollgateServer {
    config: WebConfig,
    state: AppState,
}

impl TollgateServer {
    /// Create a new server. Fails if the session settings are invalid or the
    /// session database cannot be opened.
    pub async fn new(config: WebConfig) -> WebResult<Self> {
        let state = AppState::new(config.clone()).await?;

        Ok(Self { config, state })
    }

    /// Restore sessions and start serving
    pub async fn start(self) -> WebResult<()> {
        let address = self.config.address();

        info!("🚀 Starting Tollgate Web Server");
        info!("🔧 Development mode: {}", self.config.dev_mode);

        // Subscribe first so the load is part of the audit trail
        let events = self.state.sessions.subscribe();

        self.state.sessions.shrink().await?;
        let restored = self.state.sessions.load().await?;
        info!("♻️  Restored {} sessions", restored);

        let app = create_app(self.state.clone());

        // Create TCP listener
        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;

        info!("✅ Server listening on http://{}", address);

        spawn_maintenance(
            self.state.sessions.clone(),
            Duration::from_secs(self.config.maintenance_interval_secs.max(1)),
        );
        spawn_audit(events);

        // Start the server
        if let Err(e) = serve(listener, app).await {
            error!("❌ Server error: {}", e);
            return Err(WebError::Server(e));
        }

        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Compact durable storage and sweep the store on a fixed interval
pub fn spawn_maintenance(
    sessions: Arc<SessionManager>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately and startup already shrank
        interval.tick().await;
        loop {
            interval.tick().await;
            run_maintenance(&sessions).await;
        }
    })
}

async fn run_maintenance(sessions: &SessionManager) {
    if let Err(e) = sessions.shrink().await {
        warn!("Session storage compaction failed: {}", e);
    }
    sessions.sweep_expired().await;
}

/// Write one audit line per session lifecycle event
pub fn spawn_audit(mut events: broadcast::Receiver<SessionEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => info!(target: "tollgate_web::audit", "{}", line),
                    Err(e) => warn!("Failed to serialize session event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "tollgate_web::audit", "Audit trail skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Builder for TollgateServer
pub struct TollgateServerBuilder {
    config: WebConfig,
}

impl TollgateServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: WebConfig) -> Self {
        Self { config }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Enable development mode
    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.config.dev_mode = dev_mode;
        self
    }

    /// Set database URL
    pub fn database_url<S: Into<String>>(mut self, database_url: S) -> Self {
        self.config.database_url = Some(database_url.into());
        self
    }

    pub fn sessions(mut self, sessions: SessionsConfig) -> Self {
        self.config.sessions = sessions;
        self
    }

    pub fn maintenance_interval(mut self, period: Duration) -> Self {
        self.config.maintenance_interval_secs = period.as_secs();
        self
    }

    /// Build the server
    pub async fn build(self) -> WebResult<TollgateServer> {
        TollgateServer::new(self.config).await
    }
}

impl Default for TollgateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
