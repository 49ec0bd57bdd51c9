use intranet_portal::{
    AppConfig, AppState, InMemoryRepository, MockStorageService, create_router,
    error::ErrorResponse,
    models::{Document, DocumentStatus, Employee, LoginResponse, NewEmployee, TimeEntry},
    repository::Repository,
};
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
    pub storage: MockStorageService,
    pub client: reqwest::Client,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let storage = MockStorageService::new();
    let state = AppState::new(repo.clone(), Arc::new(storage.clone()), AppConfig::default());
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        storage,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn seed_employee(&self, email: &str, role_id: i32) -> Employee {
        self.repo
            .create_employee(NewEmployee {
                name: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                password_hash: bcrypt::hash("password123", 4).unwrap(),
                role_id,
                hired_on: None,
                status: "active".to_string(),
            })
            .await
            .unwrap()
    }

    async fn login(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": "password123" }))
            .send()
            .await
            .expect("req fail");
        assert_eq!(response.status(), StatusCode::OK);
        response.json::<LoginResponse>().await.unwrap().token
    }

    async fn upload(&self, token: &str, mime: &str, filename: &str) -> reqwest::Response {
        let form = Form::new()
            .text("title", "Hotel")
            .text("description", "Two nights")
            .text("doc_type", "invoice")
            .text("document_date", "2024-04-02")
            .text("amount", "310.00")
            .part(
                "file",
                Part::bytes(b"%PDF-1.7 hotel invoice".to_vec())
                    .file_name(filename.to_string())
                    .mime_str(mime)
                    .unwrap(),
            );

        self.client
            .post(self.url("/api/documents"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .expect("req fail")
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = spawn_app().await;

    for path in ["/api/me", "/api/documents", "/api/documents/1", "/api/time-entries"] {
        let response = app.client.get(app.url(path)).send().await.expect("req fail");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.kind, "unauthenticated");
    }

    let response = app
        .client
        .put(app.url("/api/documents/1/approve"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("req fail");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "invalid token");
}

#[tokio::test]
async fn test_login_and_profile() {
    let app = spawn_app().await;
    let ana = app.seed_employee("ana@example.com", 1).await;
    let bruno = app.seed_employee("bruno@example.com", 1).await;

    let bad = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "email": "ana@example.com", "password": "wrong" }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

    let token = app.login("ana@example.com").await;

    let me: Employee = app
        .client
        .get(app.url("/api/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("req fail")
        .json()
        .await
        .unwrap();
    assert_eq!(me.id, ana.id);

    // The body claims to be Bruno; the token wins.
    let updated = app
        .client
        .put(app.url("/api/me"))
        .bearer_auth(&token)
        .json(&json!({ "id": bruno.id, "name": "Ana Paula" }))
        .send()
        .await
        .expect("req fail");
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: Employee = updated.json().await.unwrap();
    assert_eq!(updated.id, ana.id);
    assert_eq!(updated.name, "Ana Paula");
    assert_eq!(
        app.repo.get_employee(bruno.id).await.unwrap().unwrap().name,
        "bruno"
    );
}

#[tokio::test]
async fn test_document_lifecycle() {
    let app = spawn_app().await;
    app.seed_employee("ana@example.com", 1).await;
    app.seed_employee("bruno@example.com", 1).await;
    app.seed_employee("carla@example.com", 2).await;
    let ana = app.login("ana@example.com").await;
    let bruno = app.login("bruno@example.com").await;
    let manager = app.login("carla@example.com").await;

    // 1. Submit
    let response = app.upload(&ana, "application/pdf", "hotel.pdf").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let doc: Document = response.json().await.unwrap();
    assert_eq!(doc.status, DocumentStatus::Pending);
    assert_eq!(app.storage.keys().len(), 1);

    let doc_url = app.url(&format!("/api/documents/{}", doc.id));

    // 2. Visibility
    let other = app.client.get(&doc_url).bearer_auth(&bruno).send().await.unwrap();
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
    let seen = app.client.get(&doc_url).bearer_auth(&manager).send().await.unwrap();
    assert_eq!(seen.status(), StatusCode::OK);

    // 3. Standard roles cannot review, not even their own documents.
    let denied = app
        .client
        .put(format!("{}/approve", doc_url))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let body: ErrorResponse = denied.json().await.unwrap();
    assert_eq!(body.kind, "forbidden");

    // 4. Sending before approval is a precondition failure.
    let early = app
        .client
        .put(format!("{}/send", doc_url))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(early.status(), StatusCode::CONFLICT);

    // 5. Approve, then hand off.
    let approved: Document = app
        .client
        .put(format!("{}/approve", doc_url))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(approved.status, DocumentStatus::Approved);

    let sent = app
        .client
        .put(format!("{}/send", doc_url))
        .bearer_auth(&manager)
        .json(&json!({ "note": "paid" }))
        .send()
        .await
        .unwrap();
    assert_eq!(sent.status(), StatusCode::OK);
    let sent: Document = sent.json().await.unwrap();
    assert!(sent.sent_to_finance);
    assert_eq!(sent.send_note.as_deref(), Some("paid"));

    let twice = app
        .client
        .put(format!("{}/send", doc_url))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(twice.status(), StatusCode::CONFLICT);
    let body: ErrorResponse = twice.json().await.unwrap();
    assert_eq!(body.kind, "precondition_failed");

    // 6. Download
    let file = app
        .client
        .get(format!("{}/file", doc_url))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap();
    assert_eq!(file.status(), StatusCode::OK);
    assert_eq!(file.headers()["content-type"], "application/pdf");
    let disposition = file.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"Hotel-"));
    assert_eq!(file.bytes().await.unwrap().as_ref(), b"%PDF-1.7 hotel invoice");
}

#[tokio::test]
async fn test_reject_requires_reason() {
    let app = spawn_app().await;
    app.seed_employee("ana@example.com", 1).await;
    app.seed_employee("dora@example.com", 6).await;
    let ana = app.login("ana@example.com").await;
    let manager = app.login("dora@example.com").await;

    let doc: Document = app
        .upload(&ana, "image/png", "scan.png")
        .await
        .json()
        .await
        .unwrap();
    let reject_url = app.url(&format!("/api/documents/{}/reject", doc.id));

    let empty = app
        .client
        .put(&reject_url)
        .bearer_auth(&manager)
        .json(&json!({ "reason": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let rejected = app
        .client
        .put(&reject_url)
        .bearer_auth(&manager)
        .json(&json!({ "reason": "missing receipt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::OK);
    let rejected: Document = rejected.json().await.unwrap();
    assert_eq!(rejected.status, DocumentStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("missing receipt"));

    let missing = app
        .client
        .put(app.url("/api/documents/999999/approve"))
        .bearer_auth(&manager)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_text_upload_is_rejected() {
    let app = spawn_app().await;
    app.seed_employee("ana@example.com", 1).await;
    let ana = app.login("ana@example.com").await;

    let response = app.upload(&ana, "text/plain", "notes.txt").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.kind, "invalid_input");
    assert_eq!(app.repo.document_count(), 0);
    assert!(app.storage.keys().is_empty());
}

#[tokio::test]
async fn test_document_listing_is_scoped() {
    let app = spawn_app().await;
    let ana_record = app.seed_employee("ana@example.com", 1).await;
    app.seed_employee("bruno@example.com", 1).await;
    app.seed_employee("eva@example.com", 5).await;
    let ana = app.login("ana@example.com").await;
    let bruno = app.login("bruno@example.com").await;
    let manager = app.login("eva@example.com").await;

    app.upload(&ana, "application/pdf", "a.pdf").await;
    app.upload(&ana, "image/jpeg", "b.jpg").await;
    app.upload(&bruno, "application/pdf", "c.pdf").await;

    let list = |token: String, query: String| {
        let client = app.client.clone();
        let url = app.url(&format!("/api/documents{}", query));
        async move {
            client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .unwrap()
                .json::<Vec<Document>>()
                .await
                .unwrap()
        }
    };

    assert_eq!(list(bruno.clone(), String::new()).await.len(), 1);
    assert_eq!(
        list(bruno.clone(), format!("?owner_id={}", ana_record.id)).await.len(),
        1
    );
    assert_eq!(list(manager.clone(), String::new()).await.len(), 3);
    assert_eq!(
        list(manager.clone(), format!("?owner_id={}", ana_record.id)).await.len(),
        2
    );
    assert_eq!(list(manager.clone(), "?status=approved".to_string()).await.len(), 0);
    assert_eq!(list(manager, "?limit=1&offset=1".to_string()).await.len(), 1);

    let bad = app
        .client
        .get(app.url("/api/documents?status=paid"))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_time_entries() {
    let app = spawn_app().await;
    let ana_record = app.seed_employee("ana@example.com", 1).await;
    let ana = app.login("ana@example.com").await;

    let response = app
        .client
        .post(app.url("/api/time-entries"))
        .bearer_auth(&ana)
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.2")
        .header("user-agent", "intranet-mobile/1.0")
        .json(&json!({
            "kind": "clock_in",
            "recorded_at": "2024-06-03T08:01:00Z",
            "location": { "lat": -23.55, "lng": -46.63 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry: TimeEntry = response.json().await.unwrap();
    assert_eq!(entry.employee_id, ana_record.id);
    assert_eq!(entry.source_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(entry.device.as_deref(), Some("intranet-mobile/1.0"));

    let unknown_kind = app
        .client
        .post(app.url("/api/time-entries"))
        .bearer_auth(&ana)
        .json(&json!({ "kind": "lunch" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_kind.status(), StatusCode::BAD_REQUEST);

    let bad_location = app
        .client
        .post(app.url("/api/time-entries"))
        .bearer_auth(&ana)
        .json(&json!({ "kind": "clock_out", "location": "office" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_location.status(), StatusCode::BAD_REQUEST);

    let day: Vec<TimeEntry> = app
        .client
        .get(app.url("/api/time-entries?date=2024-06-03"))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(day.len(), 1);
    assert_eq!(day[0].id, entry.id);

    let other_day: Vec<TimeEntry> = app
        .client
        .get(app.url("/api/time-entries?date=2024-06-04"))
        .bearer_auth(&ana)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(other_day.is_empty());
}

#[tokio::test]
async fn test_malformed_query_and_path_are_structured_errors() {
    let app = spawn_app().await;
    app.seed_employee("ana@example.com", 1).await;
    app.seed_employee("lead@example.com", 2).await;
    let ana = app.login("ana@example.com").await;
    let lead = app.login("lead@example.com").await;

    let cases = [
        (app.client.get(app.url("/api/documents?limit=abc")), &ana),
        (app.client.get(app.url("/api/documents/abc")), &ana),
        (app.client.get(app.url("/api/documents/abc/file")), &ana),
        (app.client.get(app.url("/api/time-entries?date=yesterday")), &ana),
        (app.client.put(app.url("/api/documents/abc/approve")), &lead),
    ];

    for (request, token) in cases {
        let response = request.bearer_auth(token).send().await.expect("req fail");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.kind, "invalid_input");
        assert!(!body.error.is_empty());
    }
}

#[tokio::test]
async fn test_time_entries_on_the_last_representable_day() {
    let app = spawn_app().await;
    app.seed_employee("ana@example.com", 1).await;
    let ana = app.login("ana@example.com").await;

    let response = app
        .client
        .get(app.url("/api/time-entries?date=%2B262142-12-31"))
        .bearer_auth(&ana)
        .send()
        .await
        .expect("req fail");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.kind, "invalid_input");

    // The server is still up.
    let health = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(health.status().is_success());
}
