//! Authentication middleware for Axum

use acerto_billing::Scope;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

/// Authenticated user extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Identity provider user id; doubles as the tenant id
    pub user_id: Uuid,
    pub email: Option<String>,
    pub is_platform_admin: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid authentication format")]
    InvalidAuthFormat,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::MissingAuth | AuthError::InvalidAuthFormat | AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AuthError::InsufficientPermissions => (StatusCode::FORBIDDEN, "forbidden"),
        };

        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Result<&str, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthFormat)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthFormat)
}

fn authenticate(state: &AppState, request: &Request) -> Result<AuthUser, AuthError> {
    let token = extract_bearer_token(request)?;
    let claims = state.jwt_manager.validate(token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        AuthError::InvalidToken
    })?;

    Ok(AuthUser {
        user_id: claims.sub,
        is_platform_admin: claims.is_platform_admin(),
        email: claims.email,
    })
}

/// Middleware that requires a valid access token
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match authenticate(&state, &request) {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                is_platform_admin = auth_user.is_platform_admin,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Scope tenant routes to the caller's own clients, plans and ledger.
///
/// Must run after [`require_auth`].
pub async fn tenant_scope(mut request: Request, next: Next) -> Response {
    let Some(user_id) = request.extensions().get::<AuthUser>().map(|u| u.user_id) else {
        return AuthError::MissingAuth.into_response();
    };
    request.extensions_mut().insert(Scope::Tenant(user_id));
    next.run(request).await
}

/// Admit platform admins only and scope the route to subscribers.
///
/// Must run after [`require_auth`].
pub async fn require_platform_admin(mut request: Request, next: Next) -> Response {
    let Some(auth_user) = request.extensions().get::<AuthUser>().cloned() else {
        return AuthError::MissingAuth.into_response();
    };

    if !auth_user.is_platform_admin {
        tracing::warn!(
            user_id = %auth_user.user_id,
            path = %request.uri().path(),
            "Unauthorized admin access attempt"
        );
        return AuthError::InsufficientPermissions.into_response();
    }

    request.extensions_mut().insert(Scope::Platform);
    next.run(request).await
}
