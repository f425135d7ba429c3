//! Catalog management service

use crate::{
    error::{AppError, AppResult},
    models::{
        import_report::{ImportFailure, ImportReport},
        Author, Book, BookListQuery, BookPage, BookPayload, BookRecord, Genre,
    },
    repository::Repository,
    services::authors::AuthorReconciler,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    reconciler: AuthorReconciler,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        let reconciler = AuthorReconciler::new(repository.authors.clone());
        Self {
            repository,
            reconciler,
        }
    }

    async fn require_genre(&self, name: &str) -> AppResult<Genre> {
        self.repository
            .genres
            .get_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound("Genre not found".to_string()))
    }

    /// Resolve genre then authors. The genre goes first so that a missing
    /// genre never leaves freshly created authors behind.
    async fn resolve(&self, payload: BookPayload) -> AppResult<BookRecord> {
        let genre = self.require_genre(&payload.genre).await?;
        let authors = self.reconciler.reconcile(&payload.authors).await?;

        Ok(BookRecord {
            title: payload.title,
            description: payload.description,
            published_year: payload.published_year,
            genre,
            authors,
        })
    }

    /// Create a new book
    pub async fn create_book(&self, payload: BookPayload) -> AppResult<Book> {
        if self.repository.books.title_exists(&payload.title).await? {
            return Err(AppError::Conflict("Book already exists".to_string()));
        }

        let record = self.resolve(payload).await?;
        let book = self.repository.books.insert(&record).await?;

        tracing::info!("Catalog create: book id={} \"{}\"", book.id, book.title);
        Ok(book)
    }

    /// Get book by ID with genre and authors
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        self.repository
            .books
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    /// Replace every field and the author set of an existing book
    pub async fn update_book(&self, id: i32, payload: BookPayload) -> AppResult<Book> {
        if self.repository.books.get(id).await?.is_none() {
            return Err(AppError::NotFound("Book not found".to_string()));
        }

        let record = self.resolve(payload).await?;
        self.repository
            .books
            .replace(id, &record)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    /// Delete a book; its authors and genre stay
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        if !self.repository.books.delete(id).await? {
            return Err(AppError::NotFound("Book not found".to_string()));
        }
        tracing::info!("Catalog delete: book id={}", id);
        Ok(())
    }

    /// Filtered, sorted and paginated listing
    pub async fn list_books(&self, query: &BookListQuery) -> AppResult<BookPage> {
        self.repository.books.list(query).await
    }

    /// Substring and fuzzy search over titles and author names
    pub async fn search_books(&self, query: &str) -> AppResult<Vec<Book>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        self.repository.books.search(&needle).await
    }

    /// Create books one by one, stopping at the first failure.
    /// Books created before the failure are kept and listed in the report,
    /// whatever the failure was.
    pub async fn import_books(&self, payloads: Vec<BookPayload>) -> AppResult<ImportReport> {
        let mut imported = Vec::with_capacity(payloads.len());

        for (index, payload) in payloads.into_iter().enumerate() {
            let title = payload.title.clone();
            let error = match self.create_book(payload).await {
                Ok(book) => {
                    imported.push(book);
                    continue;
                }
                Err(e) => e,
            };

            match &error {
                AppError::Database(_) | AppError::Internal(_) => tracing::error!(
                    "Bulk import aborted at record {} (\"{}\") after {} book(s): {}",
                    index,
                    title,
                    imported.len(),
                    error
                ),
                _ => tracing::info!(
                    "Bulk import stopped at record {} (\"{}\") after {} book(s): {}",
                    index,
                    title,
                    imported.len(),
                    error
                ),
            }

            return Ok(ImportReport {
                imported,
                failure: Some(ImportFailure {
                    index,
                    title,
                    message: error.public_message(),
                }),
            });
        }

        Ok(ImportReport {
            imported,
            failure: None,
        })
    }

    pub async fn list_genres(&self) -> AppResult<Vec<Genre>> {
        self.repository.genres.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository
            .authors
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Author not found".to_string()))
    }
}
