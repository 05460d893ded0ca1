//! Tollgate Web Server
//!
//! HTTP front door for the session core: a token gate, a small session API
//! and the server process that keeps durable storage compacted.

pub mod gate;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

// Re-export main types
pub use gate::{require_session, resolve_token, SessionContext, TOKEN_NAME};
pub use server::{TollgateServer, TollgateServerBuilder};
pub use state::AppState;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use tollgate_core::{LoggingConfig, SessionsConfig, TollgateError};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    // Mirror whatever the caller asks for
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    // Path only: the query string may carry a token
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            user_id = tracing::field::Empty,
        )
    });

    Router::new()
        .nest("/api", routes::api_routes(&state))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

/// Configuration for the web server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable development mode
    pub dev_mode: bool,
    /// Database URL; sessions stay in memory when unset
    pub database_url: Option<String>,
    /// Seconds between storage compaction runs
    pub maintenance_interval_secs: u64,
    pub sessions: SessionsConfig,
    pub logging: LoggingConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            dev_mode: false,
            database_url: None,
            maintenance_interval_secs: 3600,
            sessions: SessionsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WebConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> WebResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WebError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| WebError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Override fields from the process environment
    pub fn apply_env(&mut self) -> WebResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from any variable source
    pub fn apply_env_from<F>(&mut self, lookup: F) -> WebResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TOLLGATE_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("TOLLGATE_PORT") {
            self.port = parse_var("TOLLGATE_PORT", &port)?;
        }
        if let Some(dev_mode) = lookup("TOLLGATE_DEV_MODE") {
            self.dev_mode = parse_var("TOLLGATE_DEV_MODE", &dev_mode)?;
        }
        if let Some(secret) = lookup("TOLLGATE_SECRET") {
            self.sessions.secret = Some(secret);
        }
        if let Some(timeout) = lookup("TOLLGATE_TOKEN_TIMEOUT") {
            self.sessions.token_timeout = Some(parse_var("TOLLGATE_TOKEN_TIMEOUT", &timeout)?);
        }
        if let Some(database_url) = lookup("DATABASE_URL") {
            self.database_url = Some(database_url);
        }
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> WebResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| WebError::Config(format!("Invalid value for {}: '{}'", key, value)))
}

/// Error types for the web server
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("Session error: {0}")]
    Session(#[from] TollgateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for web operations
pub type WebResult<T> = Result<T, WebError>;

/// Failures never describe themselves to the caller
impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match &self {
            WebError::Session(e) if e.is_malformed_token() => {
                StatusCode::UNAUTHORIZED.into_response()
            }
            WebError::Session(e) => {
                e.log();
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            _ => {
                tracing::error!("{}", self);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
