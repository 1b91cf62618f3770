//! Bookbase HTTP API: axum routes over the catalog.

pub mod api;
pub mod error;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, patch},
};
use bookbase_core::Catalog;
use bookbase_core::config::ServerConfig;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }
}

/// The `/api` routes, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/books",
            get(api::list_books)
                .post(api::create_book)
                .delete(api::delete_all_books),
        )
        .route("/api/books/:id", get(api::get_book).delete(api::delete_book))
        .route("/api/books/:id/checkout", patch(api::checkout_book))
        .route("/api/books/:id/checkin", patch(api::checkin_book))
        .route(
            "/api/books/:id/history",
            get(api::get_history).delete(api::clear_history),
        )
        .route("/api/books/:id/favorite", patch(api::toggle_favorite))
        .route("/api/stats", get(api::get_stats))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| o.parse::<HeaderValue>().with_context(|| format!("invalid CORS origin: {o}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Bind `config.host:config.port` and serve until the process exits.
pub async fn serve(config: &ServerConfig, catalog: Catalog) -> anyhow::Result<()> {
    let app = router(AppState::new(catalog))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
