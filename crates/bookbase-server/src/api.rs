//! REST handlers. Each maps one request onto one catalog operation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use bookbase_core::{
    Book, BookFilter, BookHistory, BookId, Borrower, Catalog, CatalogStats, NewBook, StatusFilter,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::ApiResult;

/// Query parameters for `GET /api/books`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub status: Option<StatusFilter>,
    pub favorites: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub borrower: String,
    pub borrower_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteAllResponse {
    pub deleted: usize,
}

/// Run a blocking catalog call off the async runtime.
async fn with_catalog<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Catalog) -> bookbase_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let catalog = Arc::clone(&state.catalog);
    Ok(tokio::task::spawn_blocking(move || f(catalog.as_ref())).await??)
}

fn parse_id(raw: &str) -> ApiResult<BookId> {
    Ok(raw.parse::<BookId>()?)
}

/// GET /api/books
pub async fn list_books(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Book>>> {
    let Query(query) = query?;
    info!("GET /api/books - query: {:?}", query);

    let filter = BookFilter::parse(query.q.as_deref().unwrap_or_default())
        .with_status(query.status.unwrap_or_default())
        .favorites_only(query.favorites.unwrap_or(false));

    let books = with_catalog(&state, move |c| c.search(&filter)).await?;
    Ok(Json(books))
}

/// POST /api/books
pub async fn create_book(
    State(state): State<AppState>,
    body: Result<Json<NewBook>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Book>)> {
    let Json(input) = body?;
    info!("POST /api/books - title: {:?}", input.title);

    let book = with_catalog(&state, move |c| c.create(input)).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /api/books/:id
pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Book>> {
    info!("GET /api/books/{}", id);

    let id = parse_id(&id)?;
    let book = with_catalog(&state, move |c| c.get(&id)).await?;
    Ok(Json(book))
}

/// DELETE /api/books/:id
pub async fn delete_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    info!("DELETE /api/books/{}", id);

    let id = parse_id(&id)?;
    with_catalog(&state, move |c| c.delete(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/books
pub async fn delete_all_books(State(state): State<AppState>) -> ApiResult<Json<DeleteAllResponse>> {
    info!("DELETE /api/books");

    let deleted = with_catalog(&state, |c| c.delete_all()).await?;
    Ok(Json(DeleteAllResponse { deleted }))
}

/// PATCH /api/books/:id/checkout
pub async fn checkout_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<Book>> {
    let Json(request) = body?;
    info!("PATCH /api/books/{}/checkout - borrower: {:?}", id, request.borrower);

    let id = parse_id(&id)?;
    let borrower = Borrower {
        name: request.borrower,
        id: request.borrower_id,
    };
    let book = with_catalog(&state, move |c| c.checkout(&id, borrower)).await?;
    Ok(Json(book))
}

/// PATCH /api/books/:id/checkin
pub async fn checkin_book(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Book>> {
    info!("PATCH /api/books/{}/checkin", id);

    let id = parse_id(&id)?;
    let (book, _) = with_catalog(&state, move |c| c.checkin(&id)).await?;
    Ok(Json(book))
}

/// GET /api/books/:id/history
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BookHistory>> {
    info!("GET /api/books/{}/history", id);

    let id = parse_id(&id)?;
    let history = with_catalog(&state, move |c| c.get_history(&id)).await?;
    Ok(Json(history))
}

/// DELETE /api/books/:id/history
pub async fn clear_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<BookHistory>> {
    info!("DELETE /api/books/{}/history", id);

    let id = parse_id(&id)?;
    let history = with_catalog(&state, move |c| c.clear_history(&id)).await?;
    Ok(Json(history))
}

/// PATCH /api/books/:id/favorite
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Book>> {
    info!("PATCH /api/books/{}/favorite", id);

    let id = parse_id(&id)?;
    let book = with_catalog(&state, move |c| c.toggle_favorite(&id)).await?;
    Ok(Json(book))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<CatalogStats>> {
    info!("GET /api/stats");

    let stats = with_catalog(&state, |c| c.stats()).await?;
    Ok(Json(stats))
}
