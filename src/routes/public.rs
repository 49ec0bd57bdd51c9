use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers; no dependencies touched.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/login
        // Exchanges email and password for a token valid for the configured TTL.
        .route("/api/auth/login", post(handlers::login))
}
