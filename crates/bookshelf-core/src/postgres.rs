//! PostgreSQL store
//!
//! Implements the book and user repositories using SQLx and PostgreSQL.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use crate::repository::{BookRepository, UserRepository};
use crate::{Book, BookshelfError, NewBook, NewUser, Result, Role, User, UserUpdate};

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store connection
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| BookshelfError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `books` and `users` tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id BIGSERIAL PRIMARY KEY,
                title TEXT NOT NULL,
                author TEXT NOT NULL DEFAULT '',
                isbn TEXT NOT NULL DEFAULT '',
                published_date TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BookshelfError::DatabaseError(format!("Failed to create books table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BookshelfError::DatabaseError(format!("Failed to create users table: {e}")))?;

        tracing::debug!("database schema ensured");
        Ok(())
    }
}

/// Book row from database
#[derive(Debug, FromRow)]
struct BookRow {
    id: i64,
    title: String,
    author: String,
    isbn: String,
    published_date: String,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            published_date: row.published_date,
        }
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = BookshelfError;

    fn try_from(row: UserRow) -> Result<Self> {
        let role: Role = row.role.parse().map_err(|_| {
            BookshelfError::DatabaseError(format!(
                "user {} has unknown role {:?}",
                row.id, row.role
            ))
        })?;

        Ok(User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role,
        })
    }
}

fn db_error(context: &str, err: sqlx::Error) -> BookshelfError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            BookshelfError::Conflict(format!("{context}: duplicate value"))
        }
        _ => BookshelfError::DatabaseError(format!("{context}: {err}")),
    }
}

const BOOK_COLUMNS: &str = "id, title, author, isbn, published_date";
const USER_COLUMNS: &str = "id, username, password_hash, role";

#[async_trait]
impl BookRepository for PgStore {
    async fn get_all(&self) -> Result<Vec<Book>> {
        let rows: Vec<BookRow> =
            sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list books", e))?;

        Ok(rows.into_iter().map(Book::from).collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Book> {
        let row: Option<BookRow> =
            sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to get book", e))?;

        row.map(Book::from)
            .ok_or_else(|| BookshelfError::NotFound(format!("book {id}")))
    }

    async fn create(&self, book: NewBook) -> Result<Book> {
        let row: BookRow = sqlx::query_as(&format!(
            "INSERT INTO books (title, author, isbn, published_date) \
             VALUES ($1, $2, $3, $4) RETURNING {BOOK_COLUMNS}"
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.published_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create book", e))?;

        Ok(row.into())
    }

    async fn update(&self, id: i64, book: NewBook) -> Result<Book> {
        let row: Option<BookRow> = sqlx::query_as(&format!(
            "UPDATE books SET title = $2, author = $3, isbn = $4, published_date = $5 \
             WHERE id = $1 RETURNING {BOOK_COLUMNS}"
        ))
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.published_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update book", e))?;

        row.map(Book::from)
            .ok_or_else(|| BookshelfError::NotFound(format!("book {id}")))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete book", e))?;

        if result.rows_affected() == 0 {
            return Err(BookshelfError::NotFound(format!("book {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn get_all(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list users", e))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_by_id(&self, id: i64) -> Result<User> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to get user", e))?;

        row.ok_or_else(|| BookshelfError::NotFound(format!("user {id}")))?
            .try_into()
    }

    async fn get_by_username(&self, username: &str) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get user", e))?;

        row.ok_or_else(|| BookshelfError::NotFound(format!("user {username}")))?
            .try_into()
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, password_hash, role) \
             VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create user", e))?;

        row.try_into()
    }

    async fn update(&self, id: i64, update: UserUpdate) -> Result<User> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET username = COALESCE($2, username), role = COALESCE($3, role) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(update.username)
        .bind(update.role.map(|r| r.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update user", e))?;

        row.ok_or_else(|| BookshelfError::NotFound(format!("user {id}")))?
            .try_into()
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete user", e))?;

        if result.rows_affected() == 0 {
            return Err(BookshelfError::NotFound(format!("user {id}")));
        }
        Ok(())
    }
}
