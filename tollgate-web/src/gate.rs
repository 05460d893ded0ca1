//! Session gate
//!
//! Finds the bearer token on a request, validates it and hands the resolved
//! session to downstream handlers as a typed request extension.

use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use tollgate_session::{SessionRecord, UserId};
use tracing::{debug, Span};

/// Cookie, header and query parameter name carrying the token
pub const TOKEN_NAME: &str = "authToken";

/// Session resolved for the current request
#[derive(Debug, Clone)]
pub struct SessionContext {
    record: SessionRecord,
}

impl SessionContext {
    pub fn user_id(&self) -> UserId {
        self.record.user_id
    }

    pub fn token(&self) -> &str {
        &self.record.token
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.record.creation_time
    }

    pub fn expiration_time(&self) -> DateTime<Utc> {
        self.record.expiration_time
    }

    pub fn last_access_time(&self) -> DateTime<Utc> {
        self.record.last_access_time
    }
}

impl From<SessionRecord> for SessionContext {
    fn from(record: SessionRecord) -> Self {
        Self { record }
    }
}

/// Only available on routes behind [`require_session`]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Find the token on a request.
///
/// Sources in priority order: `authToken` cookie, `authToken` header,
/// `Authorization: Bearer <token>`, `authToken` query parameter. Empty values
/// count as absent.
pub fn resolve_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(TOKEN_NAME).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }

    if let Some(value) = parts
        .headers
        .get(TOKEN_NAME)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    if let Some(token) = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
    {
        return Some(token.to_string());
    }

    // Repeated keys are allowed, the first non-empty value wins
    parts.uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| key == TOKEN_NAME && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

// Exactly `Bearer <token>`, nothing more.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Middleware rejecting requests without a live session.
///
/// Every authentication failure is a bare 401 so callers cannot tell an
/// unknown token from an expired or forged one.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let Some(token) = resolve_token(&parts) else {
        debug!("Request carries no token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state.sessions.validate_token(&token).await {
        Ok(Some(record)) => {
            Span::current().record("user_id", record.user_id);
            parts.extensions.insert(SessionContext::from(record));
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(e) if e.is_malformed_token() => {
            debug!("Rejected malformed token: {}", e);
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(e) => {
            e.log();
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
