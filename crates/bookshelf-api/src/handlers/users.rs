//! User management API handlers
//!
//! Password hashes never leave through these endpoints; every response
//! carries `UserInfo`.

use crate::auth::{Identity, UserInfo};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bookshelf_core::{Role, UserUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Profile update request
///
/// Roles are changed through the role endpoint only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub username: String,
}

/// Role assignment request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    #[schema(example = "supervisor")]
    pub role: String,
}

/// List all users
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "All users", body = Vec<UserInfo>),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let users: Vec<UserInfo> = state
        .users
        .get_all()
        .await?
        .into_iter()
        .map(UserInfo::from)
        .collect();

    Ok(Json(users))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.get_by_id(id).await?;
    Ok(Json(UserInfo::from(user)))
}

/// Rename a user (supervisor or higher)
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserInfo),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
        (status = 409, description = "Username already exists", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username must not be empty".to_string()));
    }

    let user = state
        .users
        .update(
            id,
            UserUpdate {
                username: Some(username.to_string()),
                role: None,
            },
        )
        .await?;

    Ok(Json(UserInfo::from(user)))
}

/// Assign a role (admin only)
#[utoipa::path(
    put,
    path = "/api/users/{id}/role",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserInfo),
        (status = 400, description = "Invalid role", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Not an admin", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_role(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role: Role = request.role.trim().parse()?;

    let user = state
        .users
        .update(
            id,
            UserUpdate {
                username: None,
                role: Some(role),
            },
        )
        .await?;

    tracing::info!(
        target: "audit",
        user_id = user.id,
        role = %user.role,
        assigned_by = %identity.username,
        "Role assigned"
    );
    Ok(Json(UserInfo::from(user)))
}

/// Delete a user (manager or higher)
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.users.delete(id).await?;

    tracing::info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
