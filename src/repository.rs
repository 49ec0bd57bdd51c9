use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{
        Document, DocumentId, DocumentQuery, DocumentStatus, Employee, EmployeeCredentials,
        EmployeeId, NewDocumentRecord, NewEmployee, NewTimeEntry, StatusChange, TimeEntry,
        UpdateProfileRequest,
    },
};

/// Repository Trait
///
/// The persistence contract consumed by the core: the credential store, the
/// document store and the time-clock log. Implementations own all mutable
/// state; the core never caches rows between requests.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across
/// Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Credential Store ---
    /// Case-insensitive lookup; the only query that loads the password hash.
    async fn find_employee_by_email(
        &self,
        email: &str,
    ) -> Result<Option<EmployeeCredentials>, StoreError>;
    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError>;
    async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError>;
    /// Updates name and, when given, phone and photo. `None` if the row is gone.
    async fn update_employee_profile(
        &self,
        id: EmployeeId,
        req: &UpdateProfileRequest,
    ) -> Result<Option<Employee>, StoreError>;

    /// Checks a plaintext password against a stored bcrypt hash.
    fn verify_secret(&self, hash: &str, plaintext: &str) -> bool {
        bcrypt::verify(plaintext, hash).unwrap_or(false)
    }

    // --- Document Store ---
    async fn insert_document(&self, doc: NewDocumentRecord) -> Result<Document, StoreError>;
    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError>;
    /// Most recent first; `limit`/`offset` applied after filtering.
    async fn query_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError>;
    /// Compare-and-swap on the approval status. Returns `None` when the row is
    /// missing or its status is no longer `expected`.
    async fn update_document_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        change: StatusChange,
    ) -> Result<Option<Document>, StoreError>;
    /// Sets the finance hand-off flag. Only matches approved, not-yet-sent rows.
    async fn mark_document_sent(
        &self,
        id: DocumentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Option<Document>, StoreError>;

    // --- Time clock ---
    async fn insert_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError>;
    /// Entries with `from <= recorded_at < to`, oldest first.
    async fn list_time_entries(
        &self,
        employee_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const EMPLOYEE_COLUMNS: &str = "id, uuid, name, email, role_id, hired_on, status, \
     profile_photo, phone, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, uuid, owner_id, title, description, doc_type, \
     document_date, amount, file_key, mime_type, size_bytes, status, approver_id, \
     approved_at, rejection_reason, sent_to_finance, sent_at, send_note, created_at, updated_at";

const TIME_ENTRY_COLUMNS: &str =
    "id, employee_id, kind, recorded_at, location, source_ip, device, note, created_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Schema lives in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_employee_by_email(
        &self,
        email: &str,
    ) -> Result<Option<EmployeeCredentials>, StoreError> {
        let sql = format!(
            "SELECT {}, password_hash FROM employees WHERE lower(email) = lower($1)",
            EMPLOYEE_COLUMNS
        );
        let row = sqlx::query_as::<_, EmployeeCredentials>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let sql = format!("SELECT {} FROM employees WHERE id = $1", EMPLOYEE_COLUMNS);
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let sql = format!(
            r#"INSERT INTO employees (uuid, name, email, password_hash, role_id, hired_on, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        );
        let employee = sqlx::query_as::<_, Employee>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.name)
            .bind(new.email)
            .bind(new.password_hash)
            .bind(new.role_id)
            .bind(new.hired_on)
            .bind(new.status)
            .fetch_one(&self.pool)
            .await?;
        Ok(employee)
    }

    /// Uses `COALESCE` so absent optional fields keep their stored value.
    async fn update_employee_profile(
        &self,
        id: EmployeeId,
        req: &UpdateProfileRequest,
    ) -> Result<Option<Employee>, StoreError> {
        let sql = format!(
            r#"UPDATE employees
               SET name = $2,
                   phone = COALESCE($3, phone),
                   profile_photo = COALESCE($4, profile_photo),
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {}"#,
            EMPLOYEE_COLUMNS
        );
        let row = sqlx::query_as::<_, Employee>(&sql)
            .bind(id)
            .bind(&req.name)
            .bind(&req.phone)
            .bind(&req.profile_photo)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_document(&self, doc: NewDocumentRecord) -> Result<Document, StoreError> {
        let sql = format!(
            r#"INSERT INTO documents (
                   uuid, owner_id, title, description, doc_type, document_date,
                   amount, file_key, mime_type, size_bytes, status
               ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
               RETURNING {}"#,
            DOCUMENT_COLUMNS
        );
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(Uuid::new_v4())
            .bind(doc.owner_id)
            .bind(doc.title)
            .bind(doc.description)
            .bind(doc.doc_type)
            .bind(doc.document_date)
            .bind(doc.amount)
            .bind(doc.file_key)
            .bind(doc.mime_type)
            .bind(doc.size_bytes)
            .fetch_one(&self.pool)
            .await?;
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let row = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Builds the filter with `QueryBuilder` so every value is a bound parameter.
    async fn query_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM documents WHERE 1=1",
            DOCUMENT_COLUMNS
        ));

        if let Some(owner_id) = query.owner_id {
            builder.push(" AND owner_id = ");
            builder.push_bind(owner_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }

        builder.push(" ORDER BY created_at DESC, id DESC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        if query.offset > 0 {
            builder.push(" OFFSET ");
            builder.push_bind(query.offset);
        }

        let rows = builder
            .build_query_as::<Document>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_document_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        change: StatusChange,
    ) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            r#"UPDATE documents
               SET status = $1, approver_id = $2, approved_at = $3,
                   rejection_reason = $4, updated_at = NOW()
               WHERE id = $5 AND status = $6
               RETURNING {}"#,
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, Document>(&sql)
            .bind(change.status)
            .bind(change.approver_id)
            .bind(change.at)
            .bind(change.reason)
            .bind(id)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn mark_document_sent(
        &self,
        id: DocumentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            r#"UPDATE documents
               SET sent_to_finance = true, sent_at = $1, send_note = $2, updated_at = NOW()
               WHERE id = $3 AND status = 'approved' AND sent_to_finance = false
               RETURNING {}"#,
            DOCUMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, Document>(&sql)
            .bind(at)
            .bind(note)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError> {
        let sql = format!(
            r#"INSERT INTO time_entries (
                   employee_id, kind, recorded_at, location, source_ip, device, note
               ) VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING {}"#,
            TIME_ENTRY_COLUMNS
        );
        let row = sqlx::query_as::<_, TimeEntry>(&sql)
            .bind(entry.employee_id)
            .bind(entry.kind)
            .bind(entry.recorded_at)
            .bind(entry.location)
            .bind(entry.source_ip)
            .bind(entry.device)
            .bind(entry.note)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_time_entries(
        &self,
        employee_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>, StoreError> {
        let sql = format!(
            r#"SELECT {} FROM time_entries
               WHERE employee_id = $1 AND recorded_at >= $2 AND recorded_at < $3
               ORDER BY recorded_at ASC, id ASC"#,
            TIME_ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, TimeEntry>(&sql)
            .bind(employee_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
    employees: Vec<EmployeeCredentials>,
    documents: Vec<Document>,
    time_entries: Vec<TimeEntry>,
    next_employee_id: EmployeeId,
    next_document_id: DocumentId,
    next_time_entry_id: i64,
}

/// InMemoryRepository
///
/// A process-local `Repository` with the same observable semantics as the
/// Postgres implementation: CAS updates, ordering and pagination. Used by the
/// test suites and for running the server without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    fail_document_inserts: bool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `insert_document` call fails; used to exercise cleanup paths.
    pub fn with_failing_document_inserts() -> Self {
        Self {
            fail_document_inserts: true,
            ..Self::default()
        }
    }

    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_employee_by_email(
        &self,
        email: &str,
    ) -> Result<Option<EmployeeCredentials>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .employees
            .iter()
            .find(|c| c.employee.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .employees
            .iter()
            .find(|c| c.employee.id == id)
            .map(|c| c.employee.clone()))
    }

    async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let mut tables = self.lock();
        if tables
            .employees
            .iter()
            .any(|c| c.employee.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Conflict(format!("email {} already exists", new.email)));
        }

        tables.next_employee_id += 1;
        let now = Utc::now();
        let employee = Employee {
            id: tables.next_employee_id,
            uuid: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            role_id: new.role_id,
            hired_on: new.hired_on,
            status: new.status,
            profile_photo: None,
            phone: None,
            created_at: now,
            updated_at: now,
        };
        tables.employees.push(EmployeeCredentials {
            employee: employee.clone(),
            password_hash: new.password_hash,
        });
        Ok(employee)
    }

    async fn update_employee_profile(
        &self,
        id: EmployeeId,
        req: &UpdateProfileRequest,
    ) -> Result<Option<Employee>, StoreError> {
        let mut tables = self.lock();
        let Some(row) = tables.employees.iter_mut().find(|c| c.employee.id == id) else {
            return Ok(None);
        };

        row.employee.name = req.name.clone();
        if let Some(phone) = &req.phone {
            row.employee.phone = Some(phone.clone());
        }
        if let Some(photo) = &req.profile_photo {
            row.employee.profile_photo = Some(photo.clone());
        }
        row.employee.updated_at = Utc::now();
        Ok(Some(row.employee.clone()))
    }

    async fn insert_document(&self, doc: NewDocumentRecord) -> Result<Document, StoreError> {
        if self.fail_document_inserts {
            return Err(StoreError::Unavailable("document inserts disabled".to_string()));
        }

        let mut tables = self.lock();
        tables.next_document_id += 1;
        let now = Utc::now();
        let document = Document {
            id: tables.next_document_id,
            uuid: Uuid::new_v4(),
            owner_id: doc.owner_id,
            title: doc.title,
            description: doc.description,
            doc_type: doc.doc_type,
            document_date: doc.document_date,
            amount: doc.amount,
            file_key: doc.file_key,
            mime_type: doc.mime_type,
            size_bytes: doc.size_bytes,
            status: DocumentStatus::Pending,
            approver_id: None,
            approved_at: None,
            rejection_reason: None,
            sent_to_finance: false,
            sent_at: None,
            send_note: None,
            created_at: now,
            updated_at: now,
        };
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let tables = self.lock();
        Ok(tables.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn query_documents(&self, query: &DocumentQuery) -> Result<Vec<Document>, StoreError> {
        let tables = self.lock();
        let mut rows: Vec<Document> = tables
            .documents
            .iter()
            .filter(|d| query.owner_id.is_none_or(|owner| d.owner_id == owner))
            .filter(|d| query.status.is_none_or(|status| d.status == status))
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(query.offset.max(0)).unwrap_or(0);
        let rows = rows.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => rows.take(usize::try_from(limit.max(0)).unwrap_or(0)).collect(),
            None => rows.collect(),
        })
    }

    async fn update_document_status(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        change: StatusChange,
    ) -> Result<Option<Document>, StoreError> {
        let mut tables = self.lock();
        let Some(doc) = tables
            .documents
            .iter_mut()
            .find(|d| d.id == id && d.status == expected)
        else {
            return Ok(None);
        };

        doc.status = change.status;
        doc.approver_id = Some(change.approver_id);
        doc.approved_at = Some(change.at);
        doc.rejection_reason = change.reason;
        doc.updated_at = Utc::now();
        Ok(Some(doc.clone()))
    }

    async fn mark_document_sent(
        &self,
        id: DocumentId,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Option<Document>, StoreError> {
        let mut tables = self.lock();
        let Some(doc) = tables
            .documents
            .iter_mut()
            .find(|d| d.id == id && d.can_send_to_finance())
        else {
            return Ok(None);
        };

        doc.sent_to_finance = true;
        doc.sent_at = Some(at);
        doc.send_note = note;
        doc.updated_at = Utc::now();
        Ok(Some(doc.clone()))
    }

    async fn insert_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError> {
        let mut tables = self.lock();
        tables.next_time_entry_id += 1;
        let row = TimeEntry {
            id: tables.next_time_entry_id,
            employee_id: entry.employee_id,
            kind: entry.kind,
            recorded_at: entry.recorded_at,
            location: entry.location,
            source_ip: entry.source_ip,
            device: entry.device,
            note: entry.note,
            created_at: Utc::now(),
        };
        tables.time_entries.push(row.clone());
        Ok(row)
    }

    async fn list_time_entries(
        &self,
        employee_id: EmployeeId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeEntry>, StoreError> {
        let tables = self.lock();
        let mut rows: Vec<TimeEntry> = tables
            .time_entries
            .iter()
            .filter(|e| e.employee_id == employee_id && e.recorded_at >= from && e.recorded_at < to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}
