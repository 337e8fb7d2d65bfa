//! Authentication gate for protected routes
//!
//! Extracts and verifies the bearer token from the Authorization header.
//! On success the caller's `Identity` is added to request extensions; on
//! any failure the request is answered with 401 and the handler never runs.
use super::token::{TokenError, TokenService};
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::{ApiError, UNAUTHORIZED_MESSAGE};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use bookshelf_core::Role;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Authorization scheme prefix, matched case-insensitively
pub const BEARER_PREFIX: &str = "Bearer ";

/// Verified caller identity
///
/// Only the authentication gate inserts this into request extensions.
/// Handlers take it as an extractor argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Insufficient permissions")]
    Forbidden,

    /// No identity on a route that requires one; the gate was not installed
    #[error("Request reached an authenticated route without an identity")]
    MissingIdentity,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_) => (
                StatusCode::UNAUTHORIZED,
                ApiError::unauthorized(UNAUTHORIZED_MESSAGE),
            ),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, ApiError::forbidden()),
            AuthError::MissingIdentity => {
                tracing::error!("authenticated route reached without identity");
                (StatusCode::INTERNAL_SERVER_ERROR, ApiError::internal_error())
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Extract the token from `Authorization: Bearer <token>`
///
/// The scheme prefix is length-checked before anything is sliced off, so
/// short or non-ASCII header values are rejected rather than panicking.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let scheme = value
        .get(..BEARER_PREFIX.len())
        .ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = value
        .get(BEARER_PREFIX.len()..)
        .map(str::trim)
        .unwrap_or_default();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}

/// Authentication middleware that requires a valid token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use bookshelf_api::auth::auth_middleware;
///
/// let app = Router::new()
///     .route("/api/me", get(me))
///     .route_layer(middleware::from_fn_with_state(tokens, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(tokens): State<Arc<TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let claims = match extract_bearer_token(request.headers())
        .and_then(|token| tokens.verify(token).map_err(AuthError::from))
    {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(error = %e, path = %request.uri().path(), "authentication failed");
            audit_log(&AuditEvent::InvalidToken {
                reason: e.to_string(),
                client: ClientInfo::from_headers(request.headers()),
            });
            return Err(e);
        }
    };

    request.extensions_mut().insert(Identity {
        username: claims.sub,
        role: claims.role,
    });

    Ok(next.run(request).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        let headers = headers_with("Bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");

        let lowercase = headers_with("bearer abc.def.ghi");
        assert_eq!(extract_bearer_token(&lowercase).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthHeader)
        ));
    }

    #[test]
    fn test_short_header_does_not_panic() {
        for value in ["", "B", "Bear", "Bearer"] {
            assert!(
                matches!(
                    extract_bearer_token(&headers_with(value)),
                    Err(AuthError::InvalidAuthHeader)
                ),
                "value: {value:?}"
            );
        }
    }

    #[test]
    fn test_wrong_scheme_and_empty_token() {
        for value in ["Basic dXNlcjpwdw==", "Token abc", "Bearer ", "Bearer    "] {
            assert!(
                matches!(
                    extract_bearer_token(&headers_with(value)),
                    Err(AuthError::InvalidAuthHeader)
                ),
                "value: {value:?}"
            );
        }
    }

    #[test]
    fn test_non_ascii_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes("Beärer x".as_bytes()).unwrap(),
        );
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[tokio::test]
    async fn test_token_failures_share_one_message() {
        let errors = [
            AuthError::MissingAuthHeader,
            AuthError::InvalidAuthHeader,
            AuthError::InvalidToken(TokenError::Expired),
            AuthError::InvalidToken(TokenError::InvalidSignature),
        ];

        for error in errors {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: ApiError = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body.code, "UNAUTHORIZED");
            assert_eq!(body.message, UNAUTHORIZED_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_forbidden_body() {
        let response = AuthError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ApiError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "FORBIDDEN");
        assert_eq!(body.message, crate::error::FORBIDDEN_MESSAGE);
    }

    #[test]
    fn test_missing_identity_fails_closed() {
        let response = AuthError::MissingIdentity.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
