use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, AppResult},
    models::{EmployeeId, LoginResponse},
    policy::{self, Capabilities, RoleId},
    repository::Repository,
    token::TokenService,
};

/// Identity
///
/// The resolved caller of an authenticated request. Built only from validated
/// token claims; request bodies never contribute to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub id: EmployeeId,
    pub role_id: RoleId,
}

impl Identity {
    pub fn capabilities(&self) -> Capabilities {
        policy::capabilities(self.role_id)
    }

    pub fn is_privileged(&self) -> bool {
        self.capabilities().is_privileged
    }

    /// Privilege check composed on top of authentication.
    pub fn require_privileged(&self) -> AppResult<()> {
        if self.is_privileged() {
            Ok(())
        } else {
            tracing::warn!(
                employee_id = self.id,
                role_id = self.role_id,
                "privileged operation denied"
            );
            Err(AppError::forbidden("privileged role required"))
        }
    }
}

/// AccessGuard
///
/// Request-scoped gate in front of every protected route. Constructed once at
/// startup around the shared `TokenService` and handed to the router through
/// `AppState`; it keeps no per-request state and performs no I/O.
#[derive(Clone)]
pub struct AccessGuard {
    tokens: Arc<TokenService>,
}

impl AccessGuard {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Validates a bare token and projects its claims into an `Identity`.
    pub fn authenticate(&self, token: &str) -> AppResult<Identity> {
        let claims = self.tokens.validate(token)?;
        Ok(Identity {
            id: claims.id,
            role_id: claims.cargo_id,
        })
    }

    /// Accepts only the exact form `Bearer <token>`.
    pub fn authenticate_header(&self, value: Option<&HeaderValue>) -> AppResult<Identity> {
        let value = value
            .ok_or_else(|| AppError::unauthenticated("missing authorization header"))?
            .to_str()
            .map_err(|_| AppError::unauthenticated("invalid authorization header"))?;

        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthenticated("expected bearer token"))?;

        if token.is_empty() || token.contains(char::is_whitespace) {
            return Err(AppError::unauthenticated("expected bearer token"));
        }

        self.authenticate(token)
    }
}

/// Identity Extractor
///
/// Makes `Identity` usable as a handler argument. Behind `auth_middleware` the
/// identity is already in the request extensions; anywhere else the
/// `Authorization` header is validated on the spot.
///
/// Rejection: `AppError::Unauthenticated` (401).
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    AccessGuard: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(*identity);
        }

        let guard = AccessGuard::from_ref(state);
        guard.authenticate_header(parts.headers.get(header::AUTHORIZATION))
    }
}

/// auth_middleware
///
/// Short-circuits with 401 before any handler runs when the token is missing or
/// invalid; otherwise publishes the `Identity` into the request extensions.
pub async fn auth_middleware(
    State(guard): State<AccessGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = guard.authenticate_header(request.headers().get(header::AUTHORIZATION))?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// privileged_middleware
///
/// Layered inside `auth_middleware` on the review routes: a standard role is
/// refused with 403 before the body is even read.
pub async fn privileged_middleware(
    identity: Identity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    identity.require_privileged()?;
    Ok(next.run(request).await)
}

/// login
///
/// Exchanges credentials for a token. Unknown email and wrong password are
/// indistinguishable to the caller.
pub async fn login(
    repo: &dyn Repository,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> AppResult<LoginResponse> {
    let invalid = || AppError::unauthenticated("invalid credentials");

    let Some(credentials) = repo.find_employee_by_email(email.trim()).await? else {
        tracing::debug!("login attempt for unknown email");
        return Err(invalid());
    };

    if !repo.verify_secret(&credentials.password_hash, password) {
        tracing::debug!(employee_id = credentials.employee.id, "login with wrong password");
        return Err(invalid());
    }

    let user = credentials.employee;
    if !user.is_active() {
        tracing::warn!(employee_id = user.id, "login refused for inactive employee");
        return Err(AppError::forbidden("employee is inactive"));
    }

    let token = tokens.issue(user.id, user.role_id)?;
    tracing::info!(employee_id = user.id, "employee logged in");

    Ok(LoginResponse { token, user })
}
