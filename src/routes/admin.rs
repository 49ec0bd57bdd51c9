use crate::{AppState, handlers};
use axum::{Router, routing::put};

/// Admin Router Module
///
/// Document review routes. Only roles the role policy marks as privileged get
/// past `privileged_middleware`; the workflow repeats the check so the
/// operations stay safe when called outside HTTP.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // PUT /api/documents/{id}/approve
        // pending -> approved; stamps approver and time.
        .route(
            "/api/documents/{id}/approve",
            put(handlers::approve_document),
        )
        // PUT /api/documents/{id}/reject  {"reason": "..."}
        // pending -> rejected; the reason is required and stored.
        .route("/api/documents/{id}/reject", put(handlers::reject_document))
        // PUT /api/documents/{id}/send  {"note": "..."}
        // Finance hand-off. Only approved documents, and only once.
        .route("/api/documents/{id}/send", put(handlers::send_document))
}
