use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::takedown::observer::api::{AppState, api_router};
use crate::takedown::observer::config::{CorsConfig, ServerConfig};
use crate::takedown::observer::error::Result;
use crate::takedown::observer::store::AccountStore;

/// Client-side routes of the single-page dashboard. Each serves `index.html`.
pub const SPA_ROUTES: [&str; 4] = ["/", "/dashboard", "/about", "/related-work"];

/// Builds the complete application router: API routes, static assets, SPA
/// entry points, CORS and request tracing.
pub fn build_router(store: Arc<AccountStore>, static_dir: &Path, cors: &CorsConfig) -> Router {
    let index = static_dir.join("index.html");

    let mut router = api_router(AppState::new(store))
        .nest_service("/static", ServeDir::new(static_dir));
    for route in SPA_ROUTES {
        router = router.route_service(route, ServeFile::new(&index));
    }

    router
        .fallback(not_found)
        .layer(create_cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Creates the CORS layer from configuration. Unparsable entries are skipped.
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|method| method.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|name| name.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}

/// Opens the store and serves HTTP until interrupted.
#[instrument(level = "info", skip_all, fields(listen = %config.listen, db = %config.db_path.display()))]
pub async fn serve(config: ServerConfig) -> Result<()> {
    let store = Arc::new(AccountStore::open_with_readers(
        &config.db_path,
        config.read_pool_size,
    )?);
    let router = build_router(store, &config.static_dir, &config.cors);

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %listener.local_addr()?, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server runs until the process is killed.
        std::future::pending::<()>().await;
    }
}
