use axum::{body::Bytes, extract::FromRef};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    AppState,
    auth::Identity,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        Document, DocumentFilter, DocumentId, DocumentQuery, DocumentStatus, NewDocumentRecord,
        StatusChange, SubmitDocumentForm, UploadedFile, file_extension,
    },
    repository::RepositoryState,
    storage::StorageState,
};

/// A stored file together with the document it belongs to.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    pub document: Document,
    pub data: Bytes,
}

/// DocumentWorkflow
///
/// Owns the document lifecycle: submission, visibility scoping, and the
/// `pending -> approved | rejected` and `approved -> sent` transitions.
///
/// Privileged operations check, in order: privilege, input, existence, state.
/// Every transition is a compare-and-swap in the store, so two reviewers racing
/// on the same document cannot both win.
#[derive(Clone)]
pub struct DocumentWorkflow {
    repo: RepositoryState,
    storage: StorageState,
    max_upload_bytes: usize,
    allowed_mime_types: Vec<String>,
}

impl FromRef<AppState> for DocumentWorkflow {
    fn from_ref(state: &AppState) -> Self {
        DocumentWorkflow::from_config(state.repo.clone(), state.storage.clone(), &state.config)
    }
}

impl DocumentWorkflow {
    pub fn new(
        repo: RepositoryState,
        storage: StorageState,
        max_upload_bytes: usize,
        allowed_mime_types: Vec<String>,
    ) -> Self {
        Self {
            repo,
            storage,
            max_upload_bytes,
            allowed_mime_types,
        }
    }

    pub fn from_config(repo: RepositoryState, storage: StorageState, config: &AppConfig) -> Self {
        Self::new(
            repo,
            storage,
            config.max_upload_bytes,
            config.allowed_mime_types.clone(),
        )
    }

    // --- Submission ---

    /// submit
    ///
    /// Validates the form and the file, writes the file, then inserts the row
    /// at `pending` owned by the caller. Nothing is written when validation
    /// fails; the file is removed again when the insert fails.
    pub async fn submit(
        &self,
        caller: &Identity,
        form: SubmitDocumentForm,
        file: Option<UploadedFile>,
    ) -> AppResult<Document> {
        let file = file.ok_or_else(|| AppError::invalid_input("a file is required"))?;
        if file.data.is_empty() {
            return Err(AppError::invalid_input("uploaded file is empty"));
        }

        let title = form.title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("title is required"));
        }
        let doc_type = form.doc_type.trim();
        if doc_type.is_empty() {
            return Err(AppError::invalid_input("document type is required"));
        }

        let document_date = NaiveDate::parse_from_str(form.document_date.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::invalid_input("document_date must be YYYY-MM-DD"))?;
        let amount = parse_amount(form.amount.as_deref())?;

        if file.data.len() > self.max_upload_bytes {
            return Err(AppError::invalid_input(format!(
                "file exceeds the maximum size of {} bytes",
                self.max_upload_bytes
            )));
        }

        let mime_type = normalize_mime(&file.content_type);
        if !self.allowed_mime_types.iter().any(|m| *m == mime_type) {
            tracing::warn!(employee_id = caller.id, mime_type = %mime_type, "upload refused");
            return Err(AppError::invalid_input(format!(
                "file type '{}' is not allowed",
                mime_type
            )));
        }

        let key = storage_key(&file.filename, &mime_type);
        let size_bytes = file.data.len() as i64;

        self.storage
            .put_object(&key, &mime_type, file.data)
            .await
            .map_err(|e| {
                tracing::error!(key = %key, "failed to store uploaded file: {}", e);
                AppError::from(e)
            })?;

        let record = NewDocumentRecord {
            owner_id: caller.id,
            title: title.to_string(),
            description: form.description.trim().to_string(),
            doc_type: doc_type.to_string(),
            document_date,
            amount,
            file_key: key.clone(),
            mime_type,
            size_bytes,
        };

        match self.repo.insert_document(record).await {
            Ok(document) => {
                tracing::info!(
                    document_id = document.id,
                    owner_id = document.owner_id,
                    "document submitted"
                );
                Ok(document)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete_object(&key).await {
                    tracing::error!(key = %key, "failed to remove orphaned upload: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }

    // --- Visibility ---

    /// view
    ///
    /// Standard roles only see their own documents. A foreign document is
    /// `Forbidden`, not `NotFound`.
    pub async fn view(&self, caller: &Identity, id: DocumentId) -> AppResult<Document> {
        let document = self.load(id).await?;
        if document.owner_id != caller.id && !caller.capabilities().can_view_all_documents() {
            tracing::warn!(
                employee_id = caller.id,
                document_id = id,
                "document access denied"
            );
            return Err(AppError::forbidden("document belongs to another employee"));
        }
        Ok(document)
    }

    /// list
    ///
    /// Standard roles are pinned to their own documents whatever `owner_id`
    /// says. Most recent first.
    pub async fn list(&self, caller: &Identity, filter: &DocumentFilter) -> AppResult<Vec<Document>> {
        let query = self.resolve_query(caller, filter)?;
        Ok(self.repo.query_documents(&query).await?)
    }

    /// Same visibility as `view`, then the stored bytes.
    pub async fn download(&self, caller: &Identity, id: DocumentId) -> AppResult<DocumentFile> {
        let document = self.view(caller, id).await?;
        let data = self
            .storage
            .get_object(&document.file_key)
            .await?
            .ok_or_else(|| AppError::not_found("document file not found"))?;
        Ok(DocumentFile { document, data })
    }

    pub fn resolve_query(&self, caller: &Identity, filter: &DocumentFilter) -> AppResult<DocumentQuery> {
        let status = match filter.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(
                raw.parse::<DocumentStatus>()
                    .map_err(AppError::invalid_input)?,
            ),
        };

        if filter.offset < 0 {
            return Err(AppError::invalid_input("offset must not be negative"));
        }

        let owner_id = if caller.capabilities().can_view_all_documents() {
            filter.owner_id
        } else {
            Some(caller.id)
        };

        Ok(DocumentQuery {
            owner_id,
            status,
            limit: (filter.limit > 0).then_some(filter.limit),
            offset: filter.offset,
        })
    }

    // --- Transitions ---

    pub async fn approve(&self, caller: &Identity, id: DocumentId) -> AppResult<Document> {
        caller.require_privileged()?;
        let document = self.load(id).await?;
        self.transition(caller, document, DocumentStatus::Approved, None)
            .await
    }

    /// A non-empty reason is required and stored on the document.
    pub async fn reject(&self, caller: &Identity, id: DocumentId, reason: &str) -> AppResult<Document> {
        caller.require_privileged()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::invalid_input("a rejection reason is required"));
        }
        let document = self.load(id).await?;
        self.transition(caller, document, DocumentStatus::Rejected, Some(reason.to_string()))
            .await
    }

    /// mark_sent
    ///
    /// Hands an approved document off to finance. One-way: a second call is a
    /// `PreconditionFailed` rather than a re-stamp.
    pub async fn mark_sent(
        &self,
        caller: &Identity,
        id: DocumentId,
        note: Option<String>,
    ) -> AppResult<Document> {
        caller.require_privileged()?;
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let document = self.load(id).await?;
        if document.status != DocumentStatus::Approved {
            return Err(AppError::precondition_failed(
                "only approved documents may be sent",
            ));
        }
        if document.sent_to_finance {
            return Err(AppError::precondition_failed(
                "document was already sent to finance",
            ));
        }

        let updated = self
            .repo
            .mark_document_sent(id, Utc::now(), note)
            .await?
            .ok_or_else(|| AppError::precondition_failed("document changed concurrently"))?;

        tracing::info!(document_id = id, actor_id = caller.id, "document sent to finance");
        Ok(updated)
    }

    async fn transition(
        &self,
        caller: &Identity,
        document: Document,
        next: DocumentStatus,
        reason: Option<String>,
    ) -> AppResult<Document> {
        if !document.status.can_transition_to(next) {
            return Err(AppError::precondition_failed(format!(
                "document is already {}",
                document.status
            )));
        }

        let change = StatusChange {
            status: next,
            approver_id: caller.id,
            at: Utc::now(),
            reason,
        };

        let updated = self
            .repo
            .update_document_status(document.id, document.status, change)
            .await?
            .ok_or_else(|| AppError::precondition_failed("document changed concurrently"))?;

        tracing::info!(
            document_id = updated.id,
            actor_id = caller.id,
            status = %updated.status,
            "document status changed"
        );
        Ok(updated)
    }

    async fn load(&self, id: DocumentId) -> AppResult<Document> {
        self.repo
            .get_document(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("document {} not found", id)))
    }
}

fn parse_amount(raw: Option<&str>) -> AppResult<f64> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(0.0),
        Some(raw) => raw,
    };
    match raw.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(AppError::invalid_input("amount must be a non-negative number")),
    }
}

/// Drops parameters such as `; charset=...` and lowercases.
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// `documents/{pdf|images|others}/{uuid}{ext}`
///
/// The extension follows the validated MIME type. The client's own extension
/// is kept only when it is one of the spellings for that type.
pub fn storage_key(filename: &str, mime_type: &str) -> String {
    let folder = match mime_type {
        "application/pdf" => "pdf",
        m if m.starts_with("image/") => "images",
        _ => "others",
    };

    let known: &[&str] = match mime_type {
        "application/pdf" => &[".pdf"],
        "image/jpeg" => &[".jpg", ".jpeg"],
        "image/png" => &[".png"],
        _ => &[],
    };
    let client_ext = file_extension(filename).to_ascii_lowercase();
    let ext = known
        .iter()
        .find(|ext| **ext == client_ext)
        .or_else(|| known.first())
        .copied()
        .unwrap_or("");

    format!("documents/{}/{}{}", folder, Uuid::new_v4(), ext)
}
