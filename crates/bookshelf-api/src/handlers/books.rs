//! Book API handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bookshelf_core::{Book, NewBook};
use std::sync::Arc;

/// List all books
#[utoipa::path(
    get,
    path = "/api/books",
    tag = "books",
    responses(
        (status = 200, description = "All books", body = Vec<Book>),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_books(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let books = state.books.get_all().await?;
    Ok(Json(books))
}

/// Get a book by id
#[utoipa::path(
    get,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book found", body = Book),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 404, description = "Book not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let book = state.books.get_by_id(id).await?;
    Ok(Json(book))
}

/// Create a book (supervisor or higher)
#[utoipa::path(
    post,
    path = "/api/books",
    tag = "books",
    request_body = NewBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid book", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_book(
    State(state): State<Arc<AppState>>,
    Json(book): Json<NewBook>,
) -> Result<impl IntoResponse, AppError> {
    book.validate()?;
    let book = state.books.create(book).await?;

    tracing::info!(book_id = book.id, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Replace a book (supervisor or higher)
#[utoipa::path(
    put,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    request_body = NewBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid book", body = crate::error::ApiError),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 404, description = "Book not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(book): Json<NewBook>,
) -> Result<impl IntoResponse, AppError> {
    book.validate()?;
    let book = state.books.update(id, book).await?;
    Ok(Json(book))
}

/// Delete a book (manager or higher)
#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = i64, Path, description = "Book id")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 401, description = "Not authenticated", body = crate::error::ApiError),
        (status = 403, description = "Insufficient role", body = crate::error::ApiError),
        (status = 404, description = "Book not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.books.delete(id).await?;

    tracing::info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}
