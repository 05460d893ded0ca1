//! HTTP handlers for the session API

use crate::{AppState, SessionContext, WebResult};
use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::TollgateError;
use tollgate_session::UserId;
use tracing::warn;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Public view of the caller's session. The token itself is never echoed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: UserId,
    pub creation_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub last_access_time: DateTime<Utc>,
}

impl From<&SessionContext> for SessionInfo {
    fn from(session: &SessionContext) -> Self {
        Self {
            user_id: session.user_id(),
            creation_time: session.creation_time(),
            expiration_time: session.expiration_time(),
            last_access_time: session.last_access_time(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub token: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Describe the session the request was authenticated with
pub async fn current_session(session: SessionContext) -> Json<SessionInfo> {
    Json(SessionInfo::from(&session))
}

/// End the caller's session
pub async fn logout(
    State(state): State<AppState>,
    session: SessionContext,
) -> WebResult<StatusCode> {
    state.sessions.evict_token(session.token()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issue a token without any credential check. Mounted in dev mode only.
pub async fn issue_dev_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> WebResult<Json<IssueTokenResponse>> {
    let token = match state.sessions.create_token(request.user_id).await {
        Ok(token) => token,
        Err(TollgateError::NotPersisted { token, source, .. }) => {
            warn!(user_id = request.user_id, "Issued token without durable copy: {}", source);
            token
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(IssueTokenResponse { token }))
}
