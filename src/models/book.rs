//! Book model and related types

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::{author::Author, genre::Genre};

/// Earliest accepted publication year
pub const MIN_PUBLISHED_YEAR: i32 = 1800;

/// Longest accepted author name, in characters
pub const MAX_AUTHOR_NAME_LENGTH: usize = 255;

/// Fully hydrated book, with its genre and authors resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub genre: Genre,
    /// Authors ordered by name
    pub authors: Vec<Author>,
}

impl Book {
    /// Alphabetically smallest author name, used as the author sort key
    pub fn first_author_name(&self) -> Option<&str> {
        self.authors.iter().map(|a| a.name.as_str()).min()
    }
}

/// Book submission, used for both creation and full replacement
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_book_payload"))]
pub struct BookPayload {
    #[validate(length(min = 1, max = 512, message = "Title must be 1 to 512 characters"))]
    #[schema(example = "The Great Gatsby")]
    pub title: String,
    #[schema(example = "A novel set in the Roaring Twenties.")]
    pub description: Option<String>,
    #[schema(example = 1925)]
    pub published_year: Option<i32>,
    #[validate(length(min = 1, message = "At least one author is required"))]
    #[schema(example = json!(["F. Scott Fitzgerald"]))]
    pub authors: Vec<String>,
    #[schema(example = "fiction")]
    pub genre: String,
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn validate_book_payload(payload: &BookPayload) -> Result<(), ValidationError> {
    if payload.title.trim().is_empty() {
        return Err(invalid("blank_title", "Title must not be blank"));
    }
    if payload.genre.trim().is_empty() {
        return Err(invalid("blank_genre", "Genre must not be blank"));
    }
    if payload.authors.iter().any(|name| name.trim().is_empty()) {
        return Err(invalid("blank_author", "Author names must not be blank"));
    }
    // authors.name is VARCHAR(255), counted in characters
    if payload
        .authors
        .iter()
        .any(|name| name.chars().count() > MAX_AUTHOR_NAME_LENGTH)
    {
        return Err(invalid(
            "author_name_too_long",
            "Author names must be at most 255 characters",
        ));
    }
    if let Some(year) = payload.published_year {
        let current_year = Utc::now().year();
        if !(MIN_PUBLISHED_YEAR..=current_year).contains(&year) {
            return Err(invalid(
                "published_year_out_of_range",
                "Published year must be between 1800 and the current year",
            ));
        }
    }
    Ok(())
}

/// Book contents with genre and authors already resolved against the store
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub title: String,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub genre: Genre,
    pub authors: Vec<Author>,
}

impl BookRecord {
    /// Materialize the record as a book with the given identity
    pub fn into_book(self, id: i32) -> Book {
        let mut authors = self.authors;
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        Book {
            id,
            title: self.title,
            description: self.description,
            published_year: self.published_year,
            genre: self.genre,
            authors,
        }
    }
}

/// Books matching a search query
#[derive(Debug, Serialize, ToSchema)]
pub struct BookSearchResponse {
    pub books: Vec<Book>,
}
