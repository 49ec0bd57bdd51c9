use std::sync::Arc;

use axum::{Router, extract::FromRef, http::HeaderName, middleware};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authorization and document-lifecycle core.
pub mod auth;
pub mod policy;
pub mod token;
pub mod workflow;

// Supporting services and collaborators.
pub mod config;
pub mod employees;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;
pub mod timeclock;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::{AccessGuard, Identity};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{LocalFileStorage, MockStorageService, S3StorageClient, StorageState};
pub use token::TokenService;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and schema into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_me, handlers::update_me,
        handlers::submit_document, handlers::list_documents, handlers::get_document,
        handlers::download_document_file, handlers::approve_document,
        handlers::reject_document, handlers::send_document,
        handlers::record_time_entry, handlers::list_time_entries
    ),
    components(
        schemas(
            models::Employee, models::UpdateProfileRequest, models::LoginRequest,
            models::LoginResponse, models::Document, models::DocumentStatus,
            models::RejectRequest, models::MarkSentRequest, models::TimeEntry,
            models::TimeEntryKind, models::TimeEntryRequest, handlers::DocumentUpload,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "intranet", description = "Intranet Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container shared by every request. Everything in it
/// is either immutable after startup or behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator (Postgres in production).
    pub repo: RepositoryState,
    /// File storage collaborator (disk or S3).
    pub storage: StorageState,
    /// Token validation for the auth layers, built from `config.jwt_secret`.
    pub guard: AccessGuard,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the guard from the configuration's secret and TTL.
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        let guard = AccessGuard::new(Arc::new(TokenService::from_config(&config)));
        Self {
            repo,
            storage,
            guard,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AccessGuard {
    fn from_ref(app_state: &AppState) -> AccessGuard {
        app_state.guard.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route groups, puts each behind its guard, and wraps the
/// whole tree in the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Authenticated Routes: token validated before any handler runs.
        .merge(
            authenticated::authenticated_routes(state.config.max_upload_bytes).route_layer(
                middleware::from_fn_with_state(state.clone(), auth::auth_middleware),
            ),
        )
        // Review Routes: the last route_layer added runs first, so
        // authentication precedes the privilege check.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::privileged_middleware,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the `http_request` span with method, uri and the `x-request-id`
/// assigned by `SetRequestIdLayer`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
