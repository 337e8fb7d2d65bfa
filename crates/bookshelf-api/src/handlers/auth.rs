//! Authentication API handlers
//!
//! Registration and login are public; `/api/me` sits behind the gate.

use crate::audit::ClientInfo;
use crate::auth::{Identity, LoginRequest, LoginResponse, RegisterRequest, UserInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

/// Register a new user account
///
/// New users get the `user` role unless another one is requested.
/// `admin` cannot be requested.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserInfo),
        (status = 400, description = "Invalid input or role", body = crate::error::ApiError),
        (status = 409, description = "Username already exists", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = ClientInfo::from_headers(&headers);
    let user = state.auth.register(request, &client).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with username and password
///
/// Returns a bearer token to send as `Authorization: Bearer <token>`.
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = ClientInfo::from_headers(&headers);
    let response = state.auth.login(request, &client).await?;

    Ok(Json(response))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User no longer exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.me(&identity).await?;
    Ok(Json(user))
}
