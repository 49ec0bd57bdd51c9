use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Headroom for multipart boundaries and the text fields around the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Authenticated Router Module
///
/// Routes open to any employee with a valid token. Handlers receive the caller
/// as an `Identity`; visibility of documents owned by someone else is decided
/// by the workflow, not here.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /api/me
        // The caller's own employee record. PUT ignores any `id` in the body.
        .route("/api/me", get(handlers::get_me).put(handlers::update_me))
        // POST /api/documents
        // Multipart upload. The body limit is raised above axum's 2 MB default so
        // the size check in the workflow can answer with a proper 400.
        // GET /api/documents?status=&owner_id=&limit=&offset=
        .route(
            "/api/documents",
            post(handlers::submit_document)
                .layer(DefaultBodyLimit::max(
                    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
                ))
                .get(handlers::list_documents),
        )
        // GET /api/documents/{id}
        .route("/api/documents/{id}", get(handlers::get_document))
        // GET /api/documents/{id}/file
        // Returns the stored bytes with the original MIME type.
        .route(
            "/api/documents/{id}/file",
            get(handlers::download_document_file),
        )
        // --- Time clock ---
        // POST/GET /api/time-entries?date=YYYY-MM-DD
        .route(
            "/api/time-entries",
            post(handlers::record_time_entry).get(handlers::list_time_entries),
        )
}
