use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Method, Request, Uri, header, request::Parts},
};
use chrono::{Duration, Utc};
use intranet_portal::{
    AppError, AppState, Identity, InMemoryRepository, MockStorageService,
    auth::{self, AccessGuard},
    config::AppConfig,
    employees,
    models::{NewEmployee, UpdateProfileRequest},
    repository::Repository,
    token::TokenService,
};
use std::sync::Arc;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_app_state(repo: Arc<InMemoryRepository>) -> AppState {
    let config = AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    AppState::new(repo, Arc::new(MockStorageService::new()), config)
}

fn tokens() -> TokenService {
    TokenService::new(TEST_JWT_SECRET, Duration::hours(24))
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(authorization: Option<&str>) -> Parts {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri("/api/documents".parse::<Uri>().unwrap());
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let (parts, _) = builder.body(axum::body::Body::empty()).unwrap().into_parts();
    parts
}

async fn extract(state: &AppState, authorization: Option<&str>) -> Result<Identity, AppError> {
    let mut parts = get_request_parts(authorization);
    Identity::from_request_parts(&mut parts, state).await
}

async fn seed_employee(repo: &InMemoryRepository, email: &str, password: &str, status: &str) {
    repo.create_employee(NewEmployee {
        name: "Ana Souza".to_string(),
        email: email.to_string(),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        role_id: 5,
        hired_on: None,
        status: status.to_string(),
    })
    .await
    .unwrap();
}

// --- Access Guard ---

#[tokio::test]
async fn test_valid_bearer_token_yields_identity() {
    let state = create_app_state(Arc::new(InMemoryRepository::new()));
    let token = tokens().issue(10, 1).unwrap();

    let identity = extract(&state, Some(&format!("Bearer {}", token)))
        .await
        .unwrap();

    assert_eq!(identity, Identity { id: 10, role_id: 1 });
}

#[tokio::test]
async fn test_missing_or_malformed_header_is_unauthenticated() {
    let state = create_app_state(Arc::new(InMemoryRepository::new()));
    let token = tokens().issue(10, 1).unwrap();

    let cases = [
        None,
        Some(String::new()),
        Some("Bearer".to_string()),
        Some("Bearer ".to_string()),
        Some(token.clone()),
        Some(format!("Basic {}", token)),
        Some(format!("bearer {}", token)),
        Some(format!("Bearer  {}", token)),
    ];

    for header_value in cases {
        let result = extract(&state, header_value.as_deref()).await;
        assert!(
            matches!(result, Err(AppError::Unauthenticated(_))),
            "header {:?} should be refused",
            header_value
        );
    }
}

#[tokio::test]
async fn test_expired_and_forged_tokens_are_unauthenticated() {
    let state = create_app_state(Arc::new(InMemoryRepository::new()));
    let expired = tokens()
        .issue_at(10, 2, Utc::now() - Duration::hours(25))
        .unwrap();
    let forged = TokenService::new("attacker-secret", Duration::hours(24))
        .issue(10, 2)
        .unwrap();

    for token in [expired, forged] {
        let err = extract(&state, Some(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        // Expired and forged look the same from the outside.
        assert_eq!(err.public_message(), "invalid token");
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_identity_from_extensions_wins() {
    let state = create_app_state(Arc::new(InMemoryRepository::new()));
    let mut parts = get_request_parts(None);
    parts.extensions.insert(Identity { id: 5, role_id: 6 });

    let identity = Identity::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(identity, Identity { id: 5, role_id: 6 });
}

#[test]
fn test_guard_header_parsing() {
    let guard = AccessGuard::new(Arc::new(tokens()));
    let token = guard.tokens().issue(3, 5).unwrap();
    let value = HeaderValue::from_str(&format!("Bearer {}", token)).unwrap();

    let identity = guard.authenticate_header(Some(&value)).unwrap();
    assert_eq!(identity.id, 3);
    assert!(identity.is_privileged());

    assert!(guard.authenticate_header(None).is_err());
}

// --- Login ---

#[tokio::test]
async fn test_login_success_issues_valid_token() {
    let repo = Arc::new(InMemoryRepository::new());
    seed_employee(&repo, "ana@example.com", "s3cret!", "active").await;
    let tokens = tokens();

    let response = auth::login(repo.as_ref(), &tokens, "ANA@example.com", "s3cret!")
        .await
        .unwrap();

    let claims = tokens.validate(&response.token).unwrap();
    assert_eq!(claims.id, response.user.id);
    assert_eq!(claims.cargo_id, 5);
    assert_eq!(response.user.email, "ana@example.com");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let repo = Arc::new(InMemoryRepository::new());
    seed_employee(&repo, "ana@example.com", "s3cret!", "active").await;
    let tokens = tokens();

    let wrong_password = auth::login(repo.as_ref(), &tokens, "ana@example.com", "nope")
        .await
        .unwrap_err();
    let unknown_email = auth::login(repo.as_ref(), &tokens, "who@example.com", "s3cret!")
        .await
        .unwrap_err();

    assert_eq!(wrong_password.public_message(), "invalid credentials");
    assert_eq!(unknown_email.public_message(), "invalid credentials");
    assert_eq!(wrong_password.kind(), "unauthenticated");
    assert_eq!(unknown_email.kind(), "unauthenticated");
}

#[tokio::test]
async fn test_inactive_employee_is_forbidden() {
    let repo = Arc::new(InMemoryRepository::new());
    seed_employee(&repo, "old@example.com", "s3cret!", "inactive").await;

    let err = auth::login(repo.as_ref(), &tokens(), "old@example.com", "s3cret!")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Forbidden(_)));
}

// --- Profile ---

#[tokio::test]
async fn test_update_profile_ignores_body_id() {
    let repo = Arc::new(InMemoryRepository::new());
    seed_employee(&repo, "ana@example.com", "pw", "active").await;
    seed_employee(&repo, "bruno@example.com", "pw", "active").await;
    let ana = repo.find_employee_by_email("ana@example.com").await.unwrap().unwrap();
    let bruno = repo.find_employee_by_email("bruno@example.com").await.unwrap().unwrap();
    let caller = Identity {
        id: ana.employee.id,
        role_id: 1,
    };

    let updated = employees::update_profile(
        repo.as_ref(),
        &caller,
        UpdateProfileRequest {
            id: Some(bruno.employee.id),
            name: "Ana S.".to_string(),
            phone: Some("+55 11 99999-0000".to_string()),
            profile_photo: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(updated.id, ana.employee.id);
    assert_eq!(updated.name, "Ana S.");
    let untouched = repo.get_employee(bruno.employee.id).await.unwrap().unwrap();
    assert_eq!(untouched.name, "Ana Souza");
}

#[tokio::test]
async fn test_update_profile_requires_name() {
    let repo = Arc::new(InMemoryRepository::new());
    let caller = Identity { id: 1, role_id: 1 };

    let err = employees::update_profile(
        repo.as_ref(),
        &caller,
        UpdateProfileRequest {
            name: "   ".to_string(),
            ..UpdateProfileRequest::default()
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
}
