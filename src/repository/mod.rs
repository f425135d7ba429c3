//! Repository layer for database operations.
//!
//! Each concern is a store port (`async_trait`) with a Postgres adapter and
//! an in-memory adapter. Services only ever see the ports through
//! [`Repository`].

pub mod authors;
pub mod books;
pub mod genres;
pub mod memory;
pub mod users;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{Author, Book, BookListQuery, BookPage, BookRecord, Genre, User},
    similarity::SearchPolicy,
};

/// Book persistence, listing and search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Exact title match
    async fn title_exists(&self, title: &str) -> AppResult<bool>;

    /// Persist a book and its author associations atomically.
    /// A duplicate title yields `Conflict`.
    async fn insert(&self, record: &BookRecord) -> AppResult<Book>;

    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    /// Overwrite every field and the author set of a book.
    /// Returns `None` when the book does not exist.
    async fn replace(&self, id: i32, record: &BookRecord) -> AppResult<Option<Book>>;

    /// Remove a book and its associations; `false` when it did not exist
    async fn delete(&self, id: i32) -> AppResult<bool>;

    /// Filtered, sorted page of books plus the unpaginated total
    async fn list(&self, query: &BookListQuery) -> AppResult<BookPage>;

    /// Books whose title or author names match `needle` (trimmed, lower-cased)
    async fn search(&self, needle: &str) -> AppResult<Vec<Book>>;
}

/// Author lookups and creation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Authors whose name is in `names`, in one round-trip
    async fn find_by_names(&self, names: &[String]) -> AppResult<Vec<Author>>;

    /// Create authors for `names`, skipping names that already exist.
    /// Returns only the rows created by this call.
    async fn insert_missing(&self, names: &[String]) -> AppResult<Vec<Author>>;

    async fn get(&self, id: i32) -> AppResult<Option<Author>>;
}

/// Genre lookups. Genres are seeded, never created by the catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenreStore: Send + Sync {
    /// Exact, case-sensitive name match
    async fn get_by_name(&self, name: &str) -> AppResult<Option<Genre>>;

    async fn list(&self) -> AppResult<Vec<Genre>>;
}

/// User accounts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Create a user; a duplicate email yields `Conflict`
    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User>;
}

/// Main repository struct holding the store handles
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub authors: Arc<dyn AuthorStore>,
    pub genres: Arc<dyn GenreStore>,
    pub users: Arc<dyn UserStore>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>, search: SearchPolicy) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone(), search)),
            authors: Arc::new(authors::AuthorsRepository::new(pool.clone())),
            genres: Arc::new(genres::GenresRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool)),
        }
    }

    /// Create a repository where every store is the same in-memory store
    pub fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            books: store.clone(),
            authors: store.clone(),
            genres: store.clone(),
            users: store,
        }
    }
}
