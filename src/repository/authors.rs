//! Authors repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use super::AuthorStore;
use crate::{error::AppResult, models::Author};

#[derive(Clone)]
pub struct AuthorsRepository {
    pool: Pool<Postgres>,
}

impl AuthorsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorStore for AuthorsRepository {
    async fn find_by_names(&self, names: &[String]) -> AppResult<Vec<Author>> {
        let authors = sqlx::query_as::<_, Author>(
            "SELECT id, name FROM authors WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        Ok(authors)
    }

    async fn insert_missing(&self, names: &[String]) -> AppResult<Vec<Author>> {
        // Rows that lost a race against a concurrent insert are skipped here
        // and picked up by the caller's next lookup.
        let authors = sqlx::query_as::<_, Author>(
            r#"
            INSERT INTO authors (name)
            SELECT DISTINCT name FROM UNNEST($1::text[]) AS t(name)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        Ok(authors)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Author>> {
        let author = sqlx::query_as::<_, Author>("SELECT id, name FROM authors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(author)
    }
}
