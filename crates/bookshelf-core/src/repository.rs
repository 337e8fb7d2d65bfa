//! Repository traits and the in-memory store
//!
//! Persistence is a collaborator of the service: handlers only see these
//! traits. `MemoryStore` backs development runs and tests; `PgStore`
//! (see [`crate::postgres`]) backs production deployments.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{Book, BookshelfError, NewBook, NewUser, Result, User, UserUpdate};

/// Book persistence operations
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// List all books ordered by id
    async fn get_all(&self) -> Result<Vec<Book>>;

    /// Get a book by id, `NotFound` if absent
    async fn get_by_id(&self, id: i64) -> Result<Book>;

    /// Store a new book and return it with its assigned id
    async fn create(&self, book: NewBook) -> Result<Book>;

    /// Replace every field of an existing book
    async fn update(&self, id: i64, book: NewBook) -> Result<Book>;

    /// Delete a book, `NotFound` if absent
    async fn delete(&self, id: i64) -> Result<()>;
}

/// User persistence operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// List all users ordered by id
    async fn get_all(&self) -> Result<Vec<User>>;

    /// Get a user by id, `NotFound` if absent
    async fn get_by_id(&self, id: i64) -> Result<User>;

    /// Get a user by unique username, `NotFound` if absent
    async fn get_by_username(&self, username: &str) -> Result<User>;

    /// Store a new user; `Conflict` if the username is taken
    async fn create(&self, user: NewUser) -> Result<User>;

    /// Apply a partial update; `Conflict` if a new username is taken
    async fn update(&self, id: i64, update: UserUpdate) -> Result<User>;

    /// Delete a user, `NotFound` if absent
    async fn delete(&self, id: i64) -> Result<()>;
}

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// In-memory store implementing every repository trait
///
/// Ids are assigned from a per-table counter and never reused.
#[derive(Default)]
pub struct MemoryStore {
    books: RwLock<Table<Book>>,
    users: RwLock<Table<User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn book_not_found(id: i64) -> BookshelfError {
    BookshelfError::NotFound(format!("book {id}"))
}

fn user_not_found(id: i64) -> BookshelfError {
    BookshelfError::NotFound(format!("user {id}"))
}

#[async_trait]
impl BookRepository for MemoryStore {
    async fn get_all(&self) -> Result<Vec<Book>> {
        Ok(self.books.read().await.rows.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<Book> {
        self.books
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| book_not_found(id))
    }

    async fn create(&self, book: NewBook) -> Result<Book> {
        let mut table = self.books.write().await;
        let id = table.allocate_id();
        let book = book.into_book(id);
        table.rows.insert(id, book.clone());
        Ok(book)
    }

    async fn update(&self, id: i64, book: NewBook) -> Result<Book> {
        let mut table = self.books.write().await;
        let slot = table.rows.get_mut(&id).ok_or_else(|| book_not_found(id))?;
        *slot = book.into_book(id);
        Ok(slot.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.books
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| book_not_found(id))
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_all(&self) -> Result<Vec<User>> {
        Ok(self.users.read().await.rows.values().cloned().collect())
    }

    async fn get_by_id(&self, id: i64) -> Result<User> {
        self.users
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| user_not_found(id))
    }

    async fn get_by_username(&self, username: &str) -> Result<User> {
        self.users
            .read()
            .await
            .rows
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| BookshelfError::NotFound(format!("user {username}")))
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut table = self.users.write().await;
        if table.rows.values().any(|u| u.username == user.username) {
            return Err(BookshelfError::Conflict(format!(
                "username {} already exists",
                user.username
            )));
        }

        let id = table.allocate_id();
        let user = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        };
        table.rows.insert(id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> Result<User> {
        let mut table = self.users.write().await;

        if let Some(name) = &update.username {
            if table.rows.values().any(|u| u.id != id && &u.username == name) {
                return Err(BookshelfError::Conflict(format!(
                    "username {name} already exists"
                )));
            }
        }

        let user = table.rows.get_mut(&id).ok_or_else(|| user_not_found(id))?;
        if let Some(name) = update.username {
            user.username = name;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.users
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| user_not_found(id))
    }
}
