//! Route definitions for the Tollgate web server

use crate::{gate::require_session, handlers, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Create API routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let gated = Router::new()
        .route(
            "/session",
            get(handlers::current_session).delete(handlers::logout),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .merge(gated);

    if state.config.dev_mode {
        router.merge(dev_routes())
    } else {
        router
    }
}

/// Local testing helpers; there is no identity provider to log in against
pub fn dev_routes() -> Router<AppState> {
    Router::new().route("/dev/sessions", post(handlers::issue_dev_token))
}
