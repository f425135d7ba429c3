//! Genre model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Genres available out of the box (mirrors the seed migration)
pub const DEFAULT_GENRES: &[&str] = &[
    "fiction",
    "non-fiction",
    "thriller",
    "mystery",
    "fantasy",
    "science fiction",
    "romance",
    "horror",
    "biography",
    "history",
    "poetry",
    "children",
];

/// Book genre. Names are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

/// Normalize a genre name the way it is stored
pub fn normalize_genre_name(name: &str) -> String {
    name.trim().to_lowercase()
}
