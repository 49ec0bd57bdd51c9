use std::{fmt, str::FromStr};

use axum::body::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::policy::RoleId;

/// Primary key of an employee row.
pub type EmployeeId = i64;
/// Primary key of a document row.
pub type DocumentId = i64;

// --- Employees (Credential Store) ---

/// Employee
///
/// The employee record as exposed to clients. The password hash is never part
/// of this struct; see `EmployeeCredentials`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Employee {
    pub id: EmployeeId,
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub role_id: RoleId,
    #[ts(type = "string | null")]
    pub hired_on: Option<NaiveDate>,
    /// `active` or `inactive`.
    pub status: String,
    pub profile_photo: Option<String>,
    pub phone: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

pub const EMPLOYEE_ACTIVE: &str = "active";

impl Employee {
    pub fn is_active(&self) -> bool {
        self.status == EMPLOYEE_ACTIVE
    }
}

/// EmployeeCredentials
///
/// Internal row used only by the login path.
#[derive(Debug, Clone, FromRow)]
pub struct EmployeeCredentials {
    #[sqlx(flatten)]
    pub employee: Employee,
    pub password_hash: String,
}

/// NewEmployee
///
/// Input for `Repository::create_employee`. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: RoleId,
    pub hired_on: Option<NaiveDate>,
    pub status: String,
}

/// UpdateProfileRequest
///
/// Body of `PUT /api/me`. A client-supplied `id` is accepted for compatibility
/// but always replaced with the authenticated id before use.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EmployeeId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: Employee,
}

// --- Documents (Document Store) ---

/// DocumentStatus
///
/// The approval axis of the document lifecycle. `Pending` is the only
/// non-terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "document_status", rename_all = "lowercase")]
#[ts(export)]
pub enum DocumentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }

    /// Approve and reject are only legal out of `Pending`.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Pending, DocumentStatus::Approved)
                | (DocumentStatus::Pending, DocumentStatus::Rejected)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "approved" => Ok(DocumentStatus::Approved),
            "rejected" => Ok(DocumentStatus::Rejected),
            other => Err(format!("unknown document status '{}'", other)),
        }
    }
}

/// Document
///
/// A receipt or supporting document submitted by an employee. `status` moves
/// once from `pending`; `sent_to_finance` flips once, and only after approval.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Document {
    pub id: DocumentId,
    pub uuid: Uuid,
    /// Immutable after creation.
    pub owner_id: EmployeeId,
    pub title: String,
    pub description: String,
    pub doc_type: String,
    #[ts(type = "string")]
    pub document_date: NaiveDate,
    pub amount: f64,
    /// Storage key of the uploaded file. Internal only.
    #[serde(skip)]
    pub file_key: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    pub approver_id: Option<EmployeeId>,
    #[ts(type = "string | null")]
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub sent_to_finance: bool,
    #[ts(type = "string | null")]
    pub sent_at: Option<DateTime<Utc>>,
    pub send_note: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Only approved documents that have not been handed off yet may be sent.
    pub fn can_send_to_finance(&self) -> bool {
        self.status == DocumentStatus::Approved && !self.sent_to_finance
    }

    /// File extension of the stored object, including the dot.
    pub fn file_extension(&self) -> &str {
        file_extension(&self.file_key)
    }

    /// Attachment name offered on download: `{title}-{uuid}{ext}`.
    pub fn download_filename(&self) -> String {
        let title: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}-{}{}", title, self.uuid, self.file_extension())
    }
}

/// Returns the extension (with leading dot) of the last path segment, or "".
pub fn file_extension(name: &str) -> &str {
    let last = name.rsplit('/').next().unwrap_or(name);
    match last.rfind('.') {
        Some(idx) if idx > 0 => &last[idx..],
        _ => "",
    }
}

/// NewDocumentRecord
///
/// Fully validated document ready for insertion. Always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewDocumentRecord {
    pub owner_id: EmployeeId,
    pub title: String,
    pub description: String,
    pub doc_type: String,
    pub document_date: NaiveDate,
    pub amount: f64,
    pub file_key: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// SubmitDocumentForm
///
/// The text fields of the multipart upload, exactly as received.
#[derive(Debug, Clone, Default)]
pub struct SubmitDocumentForm {
    pub title: String,
    pub description: String,
    pub doc_type: String,
    /// `YYYY-MM-DD`.
    pub document_date: String,
    pub amount: Option<String>,
}

/// UploadedFile
///
/// The file part of the multipart upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// StatusChange
///
/// Audit fields written together with a new approval status.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: DocumentStatus,
    pub approver_id: EmployeeId,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// DocumentQuery
///
/// Resolved listing query handed to the store, after visibility scoping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    pub owner_id: Option<EmployeeId>,
    pub status: Option<DocumentStatus>,
    /// `None` means unbounded.
    pub limit: Option<i64>,
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

/// DocumentFilter
///
/// Query parameters of `GET /api/documents`.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct DocumentFilter {
    /// `pending`, `approved`, `rejected` or `all`.
    pub status: Option<String>,
    /// Only honored for privileged callers.
    pub owner_id: Option<EmployeeId>,
    /// Page size; zero or negative means no limit.
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            status: None,
            owner_id: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MarkSentRequest {
    #[serde(default)]
    pub note: Option<String>,
}

// --- Time clock ---

/// TimeEntryKind
///
/// What a punch on the time clock means.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "time_entry_kind", rename_all = "snake_case")]
#[ts(export)]
pub enum TimeEntryKind {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
}

impl FromStr for TimeEntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clock_in" => Ok(TimeEntryKind::ClockIn),
            "clock_out" => Ok(TimeEntryKind::ClockOut),
            "break_start" => Ok(TimeEntryKind::BreakStart),
            "break_end" => Ok(TimeEntryKind::BreakEnd),
            other => Err(format!("unknown time entry kind '{}'", other)),
        }
    }
}

/// TimeEntry
///
/// A single punch on the time clock.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct TimeEntry {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub kind: TimeEntryKind,
    #[ts(type = "string")]
    pub recorded_at: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub location: Option<serde_json::Value>,
    pub source_ip: Option<String>,
    pub device: Option<String>,
    pub note: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub employee_id: EmployeeId,
    pub kind: TimeEntryKind,
    pub recorded_at: DateTime<Utc>,
    pub location: Option<serde_json::Value>,
    pub source_ip: Option<String>,
    pub device: Option<String>,
    pub note: Option<String>,
}

/// TimeEntryRequest
///
/// Body of `POST /api/time-entries`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TimeEntryRequest {
    /// `clock_in`, `clock_out`, `break_start` or `break_end`.
    pub kind: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub location: Option<serde_json::Value>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
pub struct TimeEntryFilter {
    /// UTC day, `YYYY-MM-DD`. Defaults to today.
    pub date: Option<NaiveDate>,
}
