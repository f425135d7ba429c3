//! Postgres store tests.
//!
//! Each test gets a fresh migrated database from `#[sqlx::test]`.
//! Run with: DATABASE_URL=postgres://... cargo test -- --ignored

use sqlx::PgPool;

use bookshelf_server::{
    error::AppError,
    models::{Book, BookFilter, BookListQuery, BookPayload, Pagination, SortBy},
    repository::Repository,
    services::catalog::CatalogService,
    similarity::SearchPolicy,
};

fn catalog(pool: PgPool) -> CatalogService {
    CatalogService::new(Repository::postgres(pool, SearchPolicy::default()))
}

fn payload(title: &str, authors: &[&str], genre: &str, year: Option<i32>) -> BookPayload {
    BookPayload {
        title: title.to_string(),
        description: None,
        published_year: year,
        authors: authors.iter().map(|a| a.to_string()).collect(),
        genre: genre.to_string(),
    }
}

fn all(sort_by: Option<SortBy>) -> BookListQuery {
    BookListQuery::new(BookFilter::default(), sort_by, Pagination::new(0, 100))
}

#[sqlx::test]
#[ignore]
async fn test_create_get_and_unique_title(pool: PgPool) {
    let catalog = catalog(pool);
    let book = catalog
        .create_book(payload("Good Omens", &["Terry Pratchett", "Neil Gaiman"], "fantasy", Some(1990)))
        .await
        .unwrap();
    assert_eq!(book.authors.len(), 2);
    assert_eq!(catalog.get_book(book.id).await.unwrap(), book);

    let err = catalog
        .create_book(payload("Good Omens", &["Someone"], "fiction", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test]
#[ignore]
async fn test_update_to_taken_title_conflicts(pool: PgPool) {
    let catalog = catalog(pool);
    catalog.create_book(payload("Emma", &["Jane Austen"], "fiction", None)).await.unwrap();
    let other = catalog.create_book(payload("Persuasion", &["Jane Austen"], "fiction", None)).await.unwrap();

    let err = catalog
        .update_book(other.id, payload("Emma", &["Jane Austen"], "fiction", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test]
#[ignore]
async fn test_missing_genre_creates_no_authors(pool: PgPool) {
    let catalog = catalog(pool.clone());
    let err = catalog
        .create_book(payload("Emma", &["Jane Austen"], "no such genre", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let authors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(authors, 0);
}

#[sqlx::test]
#[ignore]
async fn test_delete_cascades_links_only(pool: PgPool) {
    let catalog = catalog(pool.clone());
    let book = catalog.create_book(payload("Emma", &["Jane Austen"], "fiction", None)).await.unwrap();
    catalog.delete_book(book.id).await.unwrap();

    let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_authors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(links, 0);
    assert!(catalog.get_author(book.authors[0].id).await.is_ok());
    assert!(matches!(catalog.delete_book(book.id).await, Err(AppError::NotFound(_))));
}

#[sqlx::test]
#[ignore]
async fn test_list_sorts_and_counts_books_once(pool: PgPool) {
    let catalog = catalog(pool);
    catalog.create_book(payload("Good Omens", &["Terry Pratchett", "Neil Gaiman"], "fantasy", None)).await.unwrap();
    catalog.create_book(payload("Coraline", &["Neil Gaiman"], "fantasy", Some(2002))).await.unwrap();
    catalog.create_book(payload("Emma", &["Jane Austen"], "fiction", Some(1815))).await.unwrap();

    let by_author = catalog.list_books(&all(Some(SortBy::Author))).await.unwrap();
    let titles: Vec<&str> = by_author.books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Emma", "Good Omens", "Coraline"]);
    assert_eq!(by_author.total, 3);

    let by_year = catalog.list_books(&all(Some(SortBy::Year))).await.unwrap();
    let titles: Vec<&str> = by_year.books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Emma", "Coraline", "Good Omens"]);

    let filter = BookFilter { author: Some("a".into()), ..Default::default() };
    let page = catalog
        .list_books(&BookListQuery::new(filter, None, Pagination::new(0, 2)))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.books.len(), 2);
}

#[sqlx::test]
#[ignore]
async fn test_like_metacharacters_are_literal(pool: PgPool) {
    let catalog = catalog(pool);
    catalog.create_book(payload("100% Pure", &["Someone"], "fiction", None)).await.unwrap();
    catalog.create_book(payload("1000 Pure", &["Someone"], "fiction", None)).await.unwrap();

    let filter = BookFilter { title: Some("0%".into()), ..Default::default() };
    let page = catalog
        .list_books(&BookListQuery::new(filter, None, Pagination::new(0, 10)))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.books[0].title, "100% Pure");
}

#[sqlx::test]
#[ignore]
async fn test_search_substring_and_similarity(pool: PgPool) {
    let catalog = catalog(pool);
    catalog.create_book(payload("The Great Gatsby", &["F. Scott Fitzgerald"], "fiction", None)).await.unwrap();
    catalog.create_book(payload("Emma", &["Jane Austen"], "fiction", None)).await.unwrap();

    let found = catalog.search_books("GATSBY").await.unwrap();
    assert_eq!(found.len(), 1);

    let found = catalog.search_books("austen").await.unwrap();
    assert_eq!(found[0].title, "Emma");

    assert!(catalog.search_books("zzz_no_such_token").await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore]
async fn test_concurrent_creates_share_one_new_author(pool: PgPool) {
    let first = catalog(pool.clone());
    let second = catalog(pool.clone());

    let (a, b) = tokio::join!(
        first.create_book(payload("Mort", &["Terry Pratchett", "Shared Author"], "fantasy", None)),
        second.create_book(payload("Sourcery", &["Shared Author", "Terry Pratchett"], "fantasy", None)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let shared_id = |book: &Book| {
        book.authors
            .iter()
            .find(|author| author.name == "Shared Author")
            .map(|author| author.id)
    };
    assert!(shared_id(&a).is_some());
    assert_eq!(shared_id(&a), shared_id(&b));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors WHERE name = $1")
        .bind("Shared Author")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 2);
}
