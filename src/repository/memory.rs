//! In-memory store implementing every store port.
//!
//! Mirrors the relational schema: books keep genre and author ids and are
//! hydrated on read, names and titles are unique, deleting a book never
//! touches authors or genres.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{AuthorStore, BookStore, GenreStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Author, Book, BookListQuery, BookPage, BookRecord, Genre, User},
    similarity::SearchPolicy,
};

#[derive(Debug, Clone)]
struct StoredBook {
    title: String,
    description: Option<String>,
    published_year: Option<i32>,
    genre_id: i32,
    author_ids: Vec<i32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    genres: BTreeMap<i32, Genre>,
    authors: BTreeMap<i32, Author>,
    books: BTreeMap<i32, StoredBook>,
    users: BTreeMap<i32, User>,
    last_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn add_genre(&mut self, name: &str) -> Genre {
        if let Some(existing) = self.genres.values().find(|g| g.name == name) {
            return existing.clone();
        }
        let genre = Genre {
            id: self.next_id(),
            name: name.to_string(),
        };
        self.genres.insert(genre.id, genre.clone());
        genre
    }

    fn title_taken(&self, title: &str, except: Option<i32>) -> bool {
        self.books
            .iter()
            .any(|(id, book)| book.title == title && Some(*id) != except)
    }

    fn hydrate(&self, id: i32, stored: &StoredBook) -> AppResult<Book> {
        let genre = self
            .genres
            .get(&stored.genre_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("Book {} references a missing genre", id)))?;

        let mut authors = stored
            .author_ids
            .iter()
            .filter_map(|author_id| self.authors.get(author_id).cloned())
            .collect::<Vec<_>>();
        authors.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Book {
            id,
            title: stored.title.clone(),
            description: stored.description.clone(),
            published_year: stored.published_year,
            genre,
            authors,
        })
    }

    fn all_books(&self) -> AppResult<Vec<Book>> {
        self.books
            .iter()
            .map(|(id, stored)| self.hydrate(*id, stored))
            .collect()
    }
}

fn stored_from(record: &BookRecord) -> StoredBook {
    let mut author_ids: Vec<i32> = record.authors.iter().map(|a| a.id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();
    StoredBook {
        title: record.title.clone(),
        description: record.description.clone(),
        published_year: record.published_year,
        genre_id: record.genre.id,
        author_ids,
    }
}

/// Store keeping everything in process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    search: SearchPolicy,
}

impl MemoryStore {
    pub fn new(search: SearchPolicy) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            search,
        }
    }

    /// Create a store pre-seeded with the given genre names
    pub fn with_genres<'a>(search: SearchPolicy, genres: impl IntoIterator<Item = &'a str>) -> Self {
        let mut state = MemoryState::default();
        for name in genres {
            state.add_genre(name);
        }
        Self {
            state: Mutex::new(state),
            search,
        }
    }

    /// Register a genre, returning the existing one when the name is taken
    pub async fn add_genre(&self, name: &str) -> Genre {
        self.state.lock().await.add_genre(name)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(SearchPolicy::default())
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn title_exists(&self, title: &str) -> AppResult<bool> {
        Ok(self.state.lock().await.title_taken(title, None))
    }

    async fn insert(&self, record: &BookRecord) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.title_taken(&record.title, None) {
            return Err(AppError::Conflict("Book already exists".to_string()));
        }
        if !state.genres.contains_key(&record.genre.id) {
            return Err(AppError::NotFound("Genre not found".to_string()));
        }

        let id = state.next_id();
        let stored = stored_from(record);
        let book = state.hydrate(id, &stored)?;
        state.books.insert(id, stored);
        Ok(book)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let state = self.state.lock().await;
        state
            .books
            .get(&id)
            .map(|stored| state.hydrate(id, stored))
            .transpose()
    }

    async fn replace(&self, id: i32, record: &BookRecord) -> AppResult<Option<Book>> {
        let mut state = self.state.lock().await;
        if !state.books.contains_key(&id) {
            return Ok(None);
        }
        if state.title_taken(&record.title, Some(id)) {
            return Err(AppError::Conflict("Book already exists".to_string()));
        }

        let stored = stored_from(record);
        let book = state.hydrate(id, &stored)?;
        state.books.insert(id, stored);
        Ok(Some(book))
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        Ok(self.state.lock().await.books.remove(&id).is_some())
    }

    async fn list(&self, query: &BookListQuery) -> AppResult<BookPage> {
        let books = self.state.lock().await.all_books()?;
        Ok(query.apply(books))
    }

    async fn search(&self, needle: &str) -> AppResult<Vec<Book>> {
        let books = self.state.lock().await.all_books()?;
        Ok(books
            .into_iter()
            .filter(|book| {
                self.search.matches(&book.title, needle)
                    || book.authors.iter().any(|a| self.search.matches(&a.name, needle))
            })
            .collect())
    }
}

#[async_trait]
impl AuthorStore for MemoryStore {
    async fn find_by_names(&self, names: &[String]) -> AppResult<Vec<Author>> {
        let state = self.state.lock().await;
        Ok(state
            .authors
            .values()
            .filter(|a| names.contains(&a.name))
            .cloned()
            .collect())
    }

    async fn insert_missing(&self, names: &[String]) -> AppResult<Vec<Author>> {
        let mut state = self.state.lock().await;
        let mut created = Vec::new();
        for name in names {
            if state.authors.values().any(|a| &a.name == name) {
                continue;
            }
            let author = Author {
                id: state.next_id(),
                name: name.clone(),
            };
            state.authors.insert(author.id, author.clone());
            created.push(author);
        }
        Ok(created)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Author>> {
        Ok(self.state.lock().await.authors.get(&id).cloned())
    }
}

#[async_trait]
impl GenreStore for MemoryStore {
    async fn get_by_name(&self, name: &str) -> AppResult<Option<Genre>> {
        let state = self.state.lock().await;
        Ok(state.genres.values().find(|g| g.name == name).cloned())
    }

    async fn list(&self) -> AppResult<Vec<Genre>> {
        let state = self.state.lock().await;
        let mut genres: Vec<Genre> = state.genres.values().cloned().collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        let user = User {
            id: state.next_id(),
            email: email.to_string(),
            password: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }
}
