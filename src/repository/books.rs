//! Books repository for database operations.
//!
//! Listing and search statements are composed with `QueryBuilder`; every
//! user-supplied value is bound. Author predicates use `EXISTS` sub-queries
//! so a book with several authors never appears twice and `COUNT(*)` counts
//! books, not join rows.

use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, Pool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::BookStore;
use crate::{
    error::{conflict_on_unique, AppResult},
    models::{
        Author, Book, BookFilter, BookListQuery, BookPage, BookRecord, Genre, Pagination, SortBy,
    },
    similarity::SearchPolicy,
};

const SELECT_BOOKS: &str = r#"
    SELECT b.id, b.title, b.description, b.published_year,
           b.genre_id, g.name AS genre_name
    FROM books b
    JOIN genres g ON g.id = b.genre_id"#;

const COUNT_BOOKS: &str = "SELECT COUNT(*) FROM books b JOIN genres g ON g.id = b.genre_id";

const AUTHOR_EXISTS: &str = " EXISTS (SELECT 1 FROM book_authors ba \
     JOIN authors a ON a.id = ba.author_id WHERE ba.book_id = b.id AND ";

#[derive(Debug, FromRow)]
struct BookRow {
    id: i32,
    title: String,
    description: Option<String>,
    published_year: Option<i32>,
    genre_id: i32,
    genre_name: String,
}

#[derive(Debug, FromRow)]
struct AuthorLink {
    book_id: i32,
    id: i32,
    name: String,
}

/// Wrap a substring in `%...%`, escaping LIKE metacharacters
fn contains_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookFilter) {
    qb.push(" WHERE TRUE");

    if let Some(ref title) = filter.title {
        qb.push(" AND b.title ILIKE ").push_bind(contains_pattern(title));
    }

    if let Some(ref author) = filter.author {
        qb.push(" AND")
            .push(AUTHOR_EXISTS)
            .push("a.name ILIKE ")
            .push_bind(contains_pattern(author))
            .push(")");
    }

    if let Some(ref genre) = filter.genre {
        qb.push(" AND g.name = ").push_bind(genre.clone());
    }

    if let Some(from) = filter.published_year_from {
        qb.push(" AND b.published_year >= ").push_bind(from);
    }

    if let Some(to) = filter.published_year_to {
        qb.push(" AND b.published_year <= ").push_bind(to);
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort_by: Option<SortBy>) {
    qb.push(match sort_by {
        Some(SortBy::Title) => r#" ORDER BY b.title COLLATE "C" ASC, b.id"#,
        Some(SortBy::Year) => " ORDER BY b.published_year ASC NULLS LAST, b.id",
        Some(SortBy::Author) => {
            r#" ORDER BY (SELECT MIN(a.name COLLATE "C") FROM book_authors ba
                JOIN authors a ON a.id = ba.author_id
                WHERE ba.book_id = b.id) ASC NULLS LAST, b.id"#
        }
        None => " ORDER BY b.id",
    });
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, pagination: Pagination) {
    qb.push(" LIMIT ")
        .push_bind(pagination.page_size)
        .push(" OFFSET ")
        .push_bind(pagination.offset());
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, needle: &str, policy: &SearchPolicy) {
    let pattern = contains_pattern(needle);

    qb.push(" WHERE b.title ILIKE ").push_bind(pattern.clone());
    if let Some(threshold) = policy.fuzzy_threshold() {
        qb.push(" OR similarity(b.title, ")
            .push_bind(needle.to_string())
            .push(") > ")
            .push_bind(threshold);
    }

    qb.push(" OR")
        .push(AUTHOR_EXISTS)
        .push("(a.name ILIKE ")
        .push_bind(pattern);
    if let Some(threshold) = policy.fuzzy_threshold() {
        qb.push(" OR similarity(a.name, ")
            .push_bind(needle.to_string())
            .push(") > ")
            .push_bind(threshold);
    }
    qb.push("))");

    qb.push(" ORDER BY b.id");
}

/// Load the authors of many books at once, keyed by book id
async fn load_authors(
    conn: &mut PgConnection,
    book_ids: &[i32],
) -> AppResult<HashMap<i32, Vec<Author>>> {
    let links = sqlx::query_as::<_, AuthorLink>(
        r#"
        SELECT ba.book_id, a.id, a.name
        FROM book_authors ba
        JOIN authors a ON a.id = ba.author_id
        WHERE ba.book_id = ANY($1)
        ORDER BY a.name COLLATE "C"
        "#,
    )
    .bind(book_ids.to_vec())
    .fetch_all(conn)
    .await?;

    let mut by_book: HashMap<i32, Vec<Author>> = HashMap::new();
    for link in links {
        by_book.entry(link.book_id).or_default().push(Author {
            id: link.id,
            name: link.name,
        });
    }
    Ok(by_book)
}

/// Attach genres and authors to rows, keeping row order
async fn hydrate(conn: &mut PgConnection, rows: Vec<BookRow>) -> AppResult<Vec<Book>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
    let mut authors = load_authors(conn, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| Book {
            id: row.id,
            title: row.title,
            description: row.description,
            published_year: row.published_year,
            genre: Genre {
                id: row.genre_id,
                name: row.genre_name,
            },
            authors: authors.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}

async fn link_authors(conn: &mut PgConnection, book_id: i32, authors: &[Author]) -> AppResult<()> {
    let author_ids: Vec<i32> = authors.iter().map(|a| a.id).collect();

    sqlx::query(
        r#"
        INSERT INTO book_authors (book_id, author_id)
        SELECT $1, UNNEST($2::int4[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(book_id)
    .bind(author_ids)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
    search: SearchPolicy,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>, search: SearchPolicy) -> Self {
        Self { pool, search }
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn title_exists(&self, title: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE title = $1)")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert(&self, record: &BookRecord) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (title, description, published_year, genre_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.published_year)
        .bind(record.genre.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Book already exists"))?;

        link_authors(&mut tx, id, &record.authors).await?;
        tx.commit().await?;

        tracing::debug!("Created book id={} with {} author(s)", id, record.authors.len());
        Ok(record.clone().into_book(id))
    }

    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, BookRow>(&format!("{} WHERE b.id = $1", SELECT_BOOKS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(hydrate(&mut conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn replace(&self, id: i32, record: &BookRecord) -> AppResult<Option<Book>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE books SET
                title = $1,
                description = $2,
                published_year = $3,
                genre_id = $4
            WHERE id = $5
            "#,
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.published_year)
        .bind(record.genre.id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Book already exists"))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        link_authors(&mut tx, id, &record.authors).await?;
        tx.commit().await?;

        Ok(Some(record.clone().into_book(id)))
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        // book_authors rows go with the book (ON DELETE CASCADE)
        let deleted = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected() > 0)
    }

    async fn list(&self, query: &BookListQuery) -> AppResult<BookPage> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new(COUNT_BOOKS);
        push_filters(&mut count, &query.filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let books = if query.pagination.offset() < total {
            let mut select = QueryBuilder::<Postgres>::new(SELECT_BOOKS);
            push_filters(&mut select, &query.filter);
            push_order(&mut select, query.sort_by);
            push_page(&mut select, query.pagination);

            let rows: Vec<BookRow> = select.build_query_as::<BookRow>().fetch_all(&mut *tx).await?;
            hydrate(&mut tx, rows).await?
        } else {
            Vec::new()
        };

        tx.commit().await?;
        Ok(BookPage { books, total })
    }

    async fn search(&self, needle: &str) -> AppResult<Vec<Book>> {
        let mut conn = self.pool.acquire().await?;

        let mut select = QueryBuilder::<Postgres>::new(SELECT_BOOKS);
        push_search(&mut select, needle, &self.search);
        let rows: Vec<BookRow> = select.build_query_as::<BookRow>().fetch_all(&mut *conn).await?;

        hydrate(&mut conn, rows).await
    }
}
