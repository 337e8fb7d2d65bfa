//! Bookshelf Core - Domain models, repositories, and shared types
//!
//! This crate defines the core abstractions used by the bookshelf service:
//! - Resource models (books, users) and the role set
//! - Common error types
//! - Repository traits with in-memory and PostgreSQL backends
//! - Configuration management

pub mod config;
pub mod postgres;
pub mod repository;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig,
    DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS,
};
pub use postgres::PgStore;
pub use repository::{BookRepository, MemoryStore, UserRepository};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for bookshelf operations
#[derive(Error, Debug)]
pub enum BookshelfError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, BookshelfError>;

// ============================================================================
// Roles
// ============================================================================

/// Role assigned to every user account
///
/// `User`, `Supervisor` and `Manager` form an ordered hierarchy. `Admin`
/// sits outside it: it ranks below every hierarchical threshold and is
/// only granted access by routes that name it explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Supervisor,
    Manager,
    Admin,
}

impl Role {
    /// Every role, in hierarchy order followed by admin
    pub const ALL: [Role; 4] = [Role::User, Role::Supervisor, Role::Manager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Supervisor => "supervisor",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Rank of the role in the privilege hierarchy
    ///
    /// Roles outside the hierarchy rank 0, below every threshold.
    pub fn rank(&self) -> u8 {
        match self {
            Role::User => 1,
            Role::Supervisor => 2,
            Role::Manager => 3,
            Role::Admin => 0,
        }
    }
}

impl FromStr for Role {
    type Err = BookshelfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "supervisor" => Ok(Role::Supervisor),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            _ => Err(BookshelfError::ValidationError(format!("unknown role: {s}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Books
// ============================================================================

/// A stored book record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "The Rust Programming Language")]
    pub title: String,
    #[schema(example = "Steve Klabnik")]
    pub author: String,
    #[schema(example = "978-1718503106")]
    pub isbn: String,
    #[schema(example = "2023-02-28")]
    pub published_date: String,
}

/// Book payload used for both creation and full replacement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewBook {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub isbn: String,
    #[serde(default)]
    pub published_date: String,
}

impl NewBook {
    /// Reject payloads without a title
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(BookshelfError::ValidationError(
                "title must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_book(self, id: i64) -> Book {
        Book {
            id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            published_date: self.published_date,
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// A stored user account
///
/// The password hash never leaves the process in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
}

/// A user account about to be stored
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update of a user account; `None` fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.role.is_none()
    }
}
