use crate::{
    auth::{self, AccessGuard, Identity},
    employees,
    error::{AppError, AppResult, ErrorResponse},
    models::{
        Document, DocumentFilter, DocumentId, Employee, LoginRequest, LoginResponse,
        MarkSentRequest, RejectRequest, SubmitDocumentForm, TimeEntry, TimeEntryFilter,
        TimeEntryRequest, UpdateProfileRequest, UploadedFile,
    },
    repository::RepositoryState,
    timeclock::{self, TimeClock},
    workflow::DocumentWorkflow,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use utoipa::ToSchema;

// --- Request helpers ---

/// Turns axum's JSON rejection into the common error body.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> AppResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

fn path_id(path: Result<Path<DocumentId>, PathRejection>) -> AppResult<DocumentId> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::invalid_input(rejection.body_text()))
}

/// DocumentUpload
///
/// OpenAPI description of the multipart body accepted by `POST /api/documents`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct DocumentUpload {
    title: String,
    description: Option<String>,
    doc_type: String,
    /// `YYYY-MM-DD`
    document_date: String,
    amount: Option<String>,
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

async fn field_text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::invalid_input(format!("unreadable form field: {}", e)))
}

/// Splits the multipart body into text fields and the file. Unknown parts are
/// skipped; only the last `file` part counts.
async fn read_document_upload(
    mut multipart: Multipart,
) -> AppResult<(SubmitDocumentForm, Option<UploadedFile>)> {
    let mut form = SubmitDocumentForm::default();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("unreadable file: {}", e)))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "title" => form.title = field_text(field).await?,
            "description" => form.description = field_text(field).await?,
            "doc_type" => form.doc_type = field_text(field).await?,
            "document_date" => form.document_date = field_text(field).await?,
            "amount" => form.amount = Some(field_text(field).await?),
            _ => {}
        }
    }

    Ok((form, file))
}

// --- Auth & profile ---

/// login
///
/// [Public Route] Exchanges email and password for a bearer token.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Inactive employee", body = ErrorResponse)
    )
)]
pub async fn login(
    State(repo): State<RepositoryState>,
    State(guard): State<AccessGuard>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let payload = json_body(payload)?;
    let response = auth::login(
        repo.as_ref(),
        guard.tokens(),
        &payload.email,
        &payload.password,
    )
    .await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current employee", body = Employee),
        (status = 401, description = "Unauthenticated", body = ErrorResponse)
    )
)]
pub async fn get_me(
    identity: Identity,
    State(repo): State<RepositoryState>,
) -> AppResult<Json<Employee>> {
    Ok(Json(employees::get_profile(repo.as_ref(), &identity).await?))
}

/// update_me
///
/// [Authenticated Route] Updates the caller's own profile. An `id` in the body
/// is ignored.
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated", body = Employee),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn update_me(
    identity: Identity,
    State(repo): State<RepositoryState>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<Employee>> {
    let payload = json_body(payload)?;
    Ok(Json(
        employees::update_profile(repo.as_ref(), &identity, payload).await?,
    ))
}

// --- Documents ---

/// submit_document
///
/// [Authenticated Route] Uploads a receipt or supporting document. The new
/// document is `pending` and owned by the caller.
#[utoipa::path(
    post,
    path = "/api/documents",
    request_body(content = DocumentUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Submitted", body = Document),
        (status = 400, description = "Invalid form or file", body = ErrorResponse)
    )
)]
pub async fn submit_document(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let multipart = multipart.map_err(|e| AppError::invalid_input(e.body_text()))?;
    let (form, file) = read_document_upload(multipart).await?;
    let document = workflow.submit(&identity, form, file).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// list_documents
///
/// [Authenticated Route] Standard roles get their own documents only;
/// privileged roles may filter by `owner_id`.
#[utoipa::path(
    get,
    path = "/api/documents",
    params(DocumentFilter),
    responses(
        (status = 200, description = "Documents, most recent first", body = [Document]),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    )
)]
pub async fn list_documents(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    filter: Result<Query<DocumentFilter>, QueryRejection>,
) -> AppResult<Json<Vec<Document>>> {
    let filter = query_params(filter)?;
    Ok(Json(workflow.list(&identity, &filter).await?))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    params(("id" = i64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Found", body = Document),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn get_document(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    id: Result<Path<DocumentId>, PathRejection>,
) -> AppResult<Json<Document>> {
    let id = path_id(id)?;
    Ok(Json(workflow.view(&identity, id).await?))
}

/// download_document_file
///
/// [Authenticated Route] Streams the stored file back as an attachment named
/// `{title}-{uuid}{ext}`.
#[utoipa::path(
    get,
    path = "/api/documents/{id}/file",
    params(("id" = i64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "File contents"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
pub async fn download_document_file(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    id: Result<Path<DocumentId>, PathRejection>,
) -> AppResult<Response> {
    let id = path_id(id)?;
    let file = workflow.download(&identity, id).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.document.download_filename()
    );
    Ok((
        [
            (header::CONTENT_TYPE, file.document.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.data,
    )
        .into_response())
}

/// approve_document
///
/// [Privileged Route] `pending -> approved`.
#[utoipa::path(
    put,
    path = "/api/documents/{id}/approve",
    params(("id" = i64, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Approved", body = Document),
        (status = 403, description = "Privileged role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Not pending", body = ErrorResponse)
    )
)]
pub async fn approve_document(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    id: Result<Path<DocumentId>, PathRejection>,
) -> AppResult<Json<Document>> {
    let id = path_id(id)?;
    Ok(Json(workflow.approve(&identity, id).await?))
}

/// reject_document
///
/// [Privileged Route] `pending -> rejected`. The reason is mandatory.
#[utoipa::path(
    put,
    path = "/api/documents/{id}/reject",
    params(("id" = i64, Path, description = "Document ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Rejected", body = Document),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 403, description = "Privileged role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Not pending", body = ErrorResponse)
    )
)]
pub async fn reject_document(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    id: Result<Path<DocumentId>, PathRejection>,
    payload: Result<Json<RejectRequest>, JsonRejection>,
) -> AppResult<Json<Document>> {
    let id = path_id(id)?;
    let payload = json_body(payload)?;
    Ok(Json(workflow.reject(&identity, id, &payload.reason).await?))
}

/// send_document
///
/// [Privileged Route] Flags an approved document as handed off to finance.
#[utoipa::path(
    put,
    path = "/api/documents/{id}/send",
    params(("id" = i64, Path, description = "Document ID")),
    request_body = MarkSentRequest,
    responses(
        (status = 200, description = "Sent", body = Document),
        (status = 403, description = "Privileged role required", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
        (status = 409, description = "Not approved, or already sent", body = ErrorResponse)
    )
)]
pub async fn send_document(
    identity: Identity,
    State(workflow): State<DocumentWorkflow>,
    id: Result<Path<DocumentId>, PathRejection>,
    payload: Result<Json<MarkSentRequest>, JsonRejection>,
) -> AppResult<Json<Document>> {
    let id = path_id(id)?;
    // The body is optional on this route.
    let note = match payload {
        Ok(Json(body)) => body.note,
        Err(JsonRejection::MissingJsonContentType(_)) => None,
        Err(rejection) => return Err(AppError::invalid_input(rejection.body_text())),
    };
    Ok(Json(workflow.mark_sent(&identity, id, note).await?))
}

// --- Time clock ---

/// record_time_entry
///
/// [Authenticated Route] Records a punch for the caller. Client address and
/// device come from `X-Forwarded-For` and `User-Agent`.
#[utoipa::path(
    post,
    path = "/api/time-entries",
    request_body = TimeEntryRequest,
    responses(
        (status = 201, description = "Recorded", body = TimeEntry),
        (status = 400, description = "Invalid entry", body = ErrorResponse)
    )
)]
pub async fn record_time_entry(
    identity: Identity,
    State(clock): State<TimeClock>,
    headers: HeaderMap,
    payload: Result<Json<TimeEntryRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<TimeEntry>)> {
    let payload = json_body(payload)?;
    let entry = clock
        .record(
            &identity,
            payload,
            timeclock::client_ip(&headers),
            timeclock::user_agent(&headers),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    get,
    path = "/api/time-entries",
    params(TimeEntryFilter),
    responses((status = 200, description = "Entries of the day, oldest first", body = [TimeEntry]))
)]
pub async fn list_time_entries(
    identity: Identity,
    State(clock): State<TimeClock>,
    filter: Result<Query<TimeEntryFilter>, QueryRejection>,
) -> AppResult<Json<Vec<TimeEntry>>> {
    let filter = query_params(filter)?;
    let day = filter.date.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(clock.list(&identity, day).await?))
}
