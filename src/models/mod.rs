//! Data models for Bookshelf

pub mod author;
pub mod book;
pub mod genre;
pub mod import_report;
pub mod query;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookPayload, BookRecord};
pub use genre::Genre;
pub use query::{BookFilter, BookListQuery, BookPage, Pagination, SortBy};
pub use user::{User, UserClaims};
