//! Book listing: filters, sort order and pagination.
//!
//! The same semantics are rendered to SQL by the Postgres store and
//! evaluated directly by the in-memory store:
//!
//! * every provided filter is ANDed; blank strings count as absent;
//! * `title` and `author` are case-insensitive substring matches, a book
//!   qualifies for `author` when at least one of its authors matches;
//! * `genre` is an exact, case-sensitive name match;
//! * year bounds are inclusive and exclude books without a year;
//! * each book appears once, whatever its number of authors. Sorting by
//!   author ranks a book by its alphabetically smallest author name;
//! * missing sort values (no year, no author) sort last and `id` breaks
//!   every tie, so pages never overlap.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{book::Book, genre::normalize_genre_name};
use crate::config::CatalogConfig;
use crate::error::{AppError, AppResult};

/// Sort key for book listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Title,
    Year,
    Author,
}

fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl SortBy {
    /// Total order over books for this key, ties broken by id
    pub fn compare(&self, a: &Book, b: &Book) -> Ordering {
        let primary = match self {
            SortBy::Title => a.title.cmp(&b.title),
            SortBy::Year => nulls_last(a.published_year, b.published_year),
            SortBy::Author => nulls_last(a.first_author_name(), b.first_author_name()),
        };
        primary.then(a.id.cmp(&b.id))
    }
}

/// Sort books in place; without a key books keep insertion (id) order
pub fn sort_books(books: &mut [Book], sort_by: Option<SortBy>) {
    match sort_by {
        Some(key) => books.sort_by(|a, b| key.compare(a, b)),
        None => books.sort_by_key(|book| book.id),
    }
}

/// Filters applied to a book listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub published_year_from: Option<i32>,
    pub published_year_to: Option<i32>,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl BookFilter {
    /// Whether a hydrated book satisfies every filter
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(ref title) = self.title {
            if !contains_ignore_case(&book.title, title) {
                return false;
            }
        }
        if let Some(ref author) = self.author {
            if !book.authors.iter().any(|a| contains_ignore_case(&a.name, author)) {
                return false;
            }
        }
        if let Some(ref genre) = self.genre {
            if book.genre.name != *genre {
                return false;
            }
        }
        if let Some(from) = self.published_year_from {
            if !book.published_year.is_some_and(|year| year >= from) {
                return false;
            }
        }
        if let Some(to) = self.published_year_to {
            if !book.published_year.is_some_and(|year| year <= to) {
                return false;
            }
        }
        true
    }
}

/// Zero-indexed page of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
}

impl Pagination {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Number of rows skipped before this page
    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.page_size)
    }
}

/// Complete listing request handed to a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookListQuery {
    pub filter: BookFilter,
    pub sort_by: Option<SortBy>,
    pub pagination: Pagination,
}

impl BookListQuery {
    pub fn new(filter: BookFilter, sort_by: Option<SortBy>, pagination: Pagination) -> Self {
        Self {
            filter,
            sort_by,
            pagination,
        }
    }

    /// Apply the query to an unordered set of books
    pub fn apply(&self, books: impl IntoIterator<Item = Book>) -> BookPage {
        let mut matching: Vec<Book> = books
            .into_iter()
            .filter(|book| self.filter.matches(book))
            .collect();
        sort_books(&mut matching, self.sort_by);

        let total = matching.len() as i64;
        let offset = usize::try_from(self.pagination.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.pagination.page_size).unwrap_or(0);
        let books = matching.into_iter().skip(offset).take(limit).collect();

        BookPage { books, total }
    }
}

/// One page of books plus the number of books matching the filters
#[derive(Debug, Clone, PartialEq)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub total: i64,
}

/// Book listing query parameters (API)
#[derive(Debug, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BookListParams {
    /// Case-insensitive substring of the title
    pub title: Option<String>,
    /// Case-insensitive substring of any author name
    pub author: Option<String>,
    /// Genre name
    pub genre: Option<String>,
    /// Inclusive lower bound on the publication year
    pub published_year_from: Option<i32>,
    /// Inclusive upper bound on the publication year
    pub published_year_to: Option<i32>,
    pub sort_by: Option<SortBy>,
    /// Zero-indexed page number (default: 0)
    #[validate(range(min = 0, message = "page must not be negative"))]
    pub page: Option<i64>,
    /// Page size (default: 5)
    #[validate(range(min = 1, message = "limit must be at least 1"))]
    pub limit: Option<i64>,
}

impl BookListParams {
    /// Validate and turn the raw parameters into a store query
    pub fn into_query(self, catalog: &CatalogConfig) -> AppResult<BookListQuery> {
        self.validate()?;

        let page_size = self.limit.unwrap_or(catalog.default_page_size);
        if page_size > catalog.max_page_size {
            return Err(AppError::Validation(format!(
                "limit must not exceed {}",
                catalog.max_page_size
            )));
        }

        let filter = BookFilter {
            title: non_blank(self.title),
            author: non_blank(self.author),
            genre: non_blank(self.genre).map(|g| normalize_genre_name(&g)),
            published_year_from: self.published_year_from,
            published_year_to: self.published_year_to,
        };

        Ok(BookListQuery::new(
            filter,
            self.sort_by,
            Pagination::new(self.page.unwrap_or(0), page_size),
        ))
    }
}

/// Paginated book listing response
#[derive(Debug, Serialize, ToSchema)]
pub struct BookListResponse {
    pub books: Vec<Book>,
    /// Number of books matching the filters, ignoring pagination
    pub total: i64,
    /// Zero-indexed page number
    pub page: i64,
    /// Page size
    pub size: i64,
}
