//! API integration tests, run in-process against the in-memory store

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use bookshelf_server::{
    api::create_router,
    config::AppConfig,
    models::genre::DEFAULT_GENRES,
    repository::{memory::MemoryStore, Repository},
    similarity::SearchPolicy,
    AppState,
};

const BOUNDARY: &str = "bookshelf-test-boundary";

fn app() -> Router {
    let store = MemoryStore::with_genres(SearchPolicy::default(), DEFAULT_GENRES.iter().copied());
    let state = AppState::new(AppConfig::default(), Repository::in_memory(Arc::new(store)));
    create_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to send request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Failed to parse response")
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(token: &str, field: &str, document: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"books.json\"\r\n\
         Content-Type: application/json\r\n\r\n{document}\r\n--{b}--\r\n",
        b = BOUNDARY,
        field = field,
        document = document
    );
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/books/bulk-upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

/// Register a user and return a bearer token for it
async fn get_auth_token(app: &Router) -> String {
    let credentials = json!({ "email": "reader@example.com", "password": "correct horse" });

    let (status, _) = send(
        app,
        json_request(Method::POST, "/api/v1/auth/register", None, credentials.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        json_request(Method::POST, "/api/v1/auth/login", None, credentials),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().expect("No token in response").to_string()
}

fn book_json(title: &str, authors: &[&str], genre: &str, year: i32) -> Value {
    json!({
        "title": title,
        "description": format!("About {}", title),
        "published_year": year,
        "authors": authors,
        "genre": genre,
    })
}

async fn create(app: &Router, token: &str, book: Value) -> (StatusCode, Value) {
    send(app, json_request(Method::POST, "/api/v1/books", Some(token), book)).await
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_book_routes_require_authentication() {
    let app = app();

    let anonymous = Request::builder().uri("/api/v1/books").body(Body::empty()).unwrap();
    let (status, body) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 2);

    let (status, _) = send(&app, get("/api/v1/books", "not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/v1/books", None, book_json("Emma", &["Jane Austen"], "fiction", 1815)),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_and_login_errors() {
    let app = app();
    let token = get_auth_token(&app).await;

    let (status, body) = send(&app, get("/api/v1/auth/me", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "reader@example.com");
    assert!(body.get("password").is_none());

    let duplicate = json!({ "email": "reader@example.com", "password": "another one" });
    let (status, _) = send(&app, json_request(Method::POST, "/api/v1/auth/register", None, duplicate)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let short = json!({ "email": "other@example.com", "password": "short" });
    let (status, _) = send(&app, json_request(Method::POST, "/api/v1/auth/register", None, short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong = json!({ "email": "reader@example.com", "password": "wrong password" });
    let (status, _) = send(&app, json_request(Method::POST, "/api/v1/auth/login", None, wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_lifecycle() {
    let app = app();
    let token = get_auth_token(&app).await;

    let (status, created) = create(
        &app,
        &token,
        book_json("The Great Gatsby", &["F. Scott Fitzgerald"], " Fiction ", 1925),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["genre"]["name"], "fiction");
    assert_eq!(created["authors"][0]["name"], "F. Scott Fitzgerald");
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&app, get(&format!("/api/v1/books/{}", id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let author_id = created["authors"][0]["id"].as_i64().unwrap();
    let (status, author) = send(&app, get(&format!("/api/v1/authors/{}", author_id), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(author["name"], "F. Scott Fitzgerald");

    let (status, updated) = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/v1/books/{}", id),
            Some(token.as_str()),
            book_json("The Great Gatsby", &["Fitzgerald"], "classic-less", 1925),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(updated["code"], 4);

    let (status, updated) = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/v1/books/{}", id),
            Some(token.as_str()),
            book_json("Gatsby", &["F. Scott Fitzgerald"], "history", 1926),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Gatsby");
    assert_eq!(updated["published_year"], 1926);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/v1/books/{}", id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/api/v1/books/{}", id), &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get(&format!("/api/v1/authors/{}", author_id), &token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_error_statuses() {
    let app = app();
    let token = get_auth_token(&app).await;

    let (status, _) = create(&app, &token, book_json("Emma", &["Jane Austen"], "fiction", 1815)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = create(&app, &token, book_json("Emma", &["Other"], "fantasy", 1900)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 5);

    let (status, _) = create(&app, &token, book_json("Persuasion", &["Jane Austen"], "no such genre", 1817)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = create(&app, &token, book_json("Too Old", &["Someone"], "fiction", 1799)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = create(&app, &token, book_json("Nobody Wrote It", &[], "fiction", 1900)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long_name = "a".repeat(256);
    let (status, body) = create(&app, &token, book_json("Long Name", &[&long_name], "fiction", 1900)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 6);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Author names must be at most 255 characters"));
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let app = app();
    let token = get_auth_token(&app).await;

    for i in 0..12 {
        let genre = if i % 2 == 0 { "fiction" } else { "history" };
        let (status, _) = create(
            &app,
            &token,
            book_json(&format!("Book {:02}", i), &[&format!("Author {}", i % 3)], genre, 1800 + i),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/api/v1/books", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 12);
    assert_eq!(body["page"], 0);
    assert_eq!(body["size"], 5);
    assert_eq!(body["books"].as_array().unwrap().len(), 5);

    let (_, body) = send(&app, get("/api/v1/books?page=2&limit=5&sort_by=title", &token)).await;
    let titles: Vec<&str> = body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Book 10", "Book 11"]);

    let (_, body) = send(
        &app,
        get("/api/v1/books?genre=History&published_year_from=1805&published_year_to=1809&sort_by=year&limit=100", &token),
    )
    .await;
    let years: Vec<i64> = body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["published_year"].as_i64().unwrap())
        .collect();
    assert_eq!(years, vec![1805, 1807, 1809]);
    assert_eq!(body["total"], 3);

    let (_, body) = send(&app, get("/api/v1/books?author=author%201&limit=100", &token)).await;
    assert_eq!(body["total"], 4);

    let (status, _) = send(&app, get("/api/v1/books?page=-1", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/api/v1/books?limit=0", &token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search() {
    let app = app();
    let token = get_auth_token(&app).await;
    create(&app, &token, book_json("The Great Gatsby", &["F. Scott Fitzgerald"], "fiction", 1925)).await;
    create(&app, &token, book_json("Emma", &["Jane Austen"], "fiction", 1815)).await;

    let (status, body) = send(&app, get("/api/v1/books/search?query=gatsby", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let books = body["books"].as_array().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0]["title"], "The Great Gatsby");

    let (_, body) = send(&app, get("/api/v1/books/search?query=AUSTEN", &token)).await;
    assert_eq!(body["books"][0]["title"], "Emma");

    let (status, body) = send(&app, get("/api/v1/books/search?query=", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["books"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_genres_are_listed() {
    let app = app();
    let token = get_auth_token(&app).await;

    let (status, body) = send(&app, get("/api/v1/genres", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), DEFAULT_GENRES.len());
    assert!(names.contains(&"science fiction"));
}

#[tokio::test]
async fn test_bulk_upload_stops_at_first_failure() {
    let app = app();
    let token = get_auth_token(&app).await;

    let document = json!([
        book_json("Bulk Book 1", &["Bulk Author 1"], "fiction", 2019),
        book_json("Bulk Book 2", &["Bulk Author 2"], "no such genre", 2018),
        book_json("Bulk Book 3", &["Bulk Author 3"], "fiction", 2017),
    ])
    .to_string();

    let (status, report) = send(&app, multipart_request(&token, "json_file", &document)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["imported"].as_array().unwrap().len(), 1);
    assert_eq!(report["failure"]["index"], 1);
    assert_eq!(report["failure"]["title"], "Bulk Book 2");

    let (_, body) = send(&app, get("/api/v1/books", &token)).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["books"][0]["title"], "Bulk Book 1");
}

#[tokio::test]
async fn test_bulk_upload_rejects_malformed_documents() {
    let app = app();
    let token = get_auth_token(&app).await;

    let (status, _) = send(&app, multipart_request(&token, "json_file", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, multipart_request(&token, "other_field", "[]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // second record is invalid: nothing may be written
    let document = json!([
        book_json("Valid Book", &["Someone"], "fiction", 2000),
        book_json("", &["Someone"], "fiction", 2000),
    ])
    .to_string();
    let (status, _) = send(&app, multipart_request(&token, "json_file", &document)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/api/v1/books", &token)).await;
    assert_eq!(body["total"], 0);
}
