//! Book endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookSearchResponse,
        genre::normalize_genre_name,
        import_report::ImportReport,
        query::{BookListParams, BookListResponse},
        Book, BookPayload,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Multipart field carrying the bulk upload document
const BULK_UPLOAD_FIELD: &str = "json_file";

/// Validate a payload and bring its genre to stored form
fn prepare(mut payload: BookPayload) -> AppResult<BookPayload> {
    payload.validate()?;
    payload.genre = normalize_genre_name(&payload.genre);
    Ok(payload)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Text matched against titles and author names
    pub query: Option<String>,
}

/// Multipart bulk upload form
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct BulkUploadForm {
    /// JSON array of book payloads
    #[schema(value_type = String, format = Binary)]
    pub json_file: Vec<u8>,
}

/// List books with filters, sorting and pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookListParams),
    responses(
        (status = 200, description = "Page of books", body = BookListResponse),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(params): Query<BookListParams>,
) -> AppResult<Json<BookListResponse>> {
    let query = params.into_query(&state.config.catalog)?;
    let page = state.services.catalog.list_books(&query).await?;

    Ok(Json(BookListResponse {
        books: page.books,
        total: page.total,
        page: query.pagination.page,
        size: query.pagination.page_size,
    }))
}

/// Search books by title or author
#[utoipa::path(
    get,
    path = "/books/search",
    tag = "books",
    security(("bearer_auth" = [])),
    params(SearchParams),
    responses(
        (status = 200, description = "Matching books", body = BookSearchResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn search_books(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<BookSearchResponse>> {
    let books = state
        .services
        .catalog
        .search_books(params.query.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(BookSearchResponse { books }))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookPayload,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Genre not found"),
        (status = 409, description = "Book already exists")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Json(payload): Json<BookPayload>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state.services.catalog.create_book(prepare(payload)?).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Replace an existing book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = BookPayload,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book or genre not found"),
        (status = 409, description = "Title used by another book")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(payload): Json<BookPayload>,
) -> AppResult<Json<Book>> {
    let updated = state
        .services
        .catalog
        .update_book(id, prepare(payload)?)
        .await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Import books from an uploaded JSON array.
///
/// The whole document is validated before anything is written. Records are
/// then created in order; the import stops at the first record that fails
/// and keeps the books created before it.
#[utoipa::path(
    post,
    path = "/books/bulk-upload",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body(content = BulkUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Import report", body = ImportReport),
        (status = 400, description = "Malformed upload"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn bulk_upload(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ImportReport>)> {
    let mut document = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some(BULK_UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?;
            document = Some(bytes);
            break;
        }
    }

    let document = document.ok_or_else(|| {
        AppError::BadRequest(format!("Missing multipart field '{}'", BULK_UPLOAD_FIELD))
    })?;

    let payloads: Vec<BookPayload> = serde_json::from_slice(&document)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON document: {}", e)))?;

    let payloads = payloads
        .into_iter()
        .map(prepare)
        .collect::<AppResult<Vec<_>>>()?;

    tracing::info!("Bulk upload: importing {} book(s)", payloads.len());
    let report = state.services.catalog.import_books(payloads).await?;
    Ok((StatusCode::CREATED, Json(report)))
}
