// Server module - Builds the HTTP router and serves it

use axum::http::HeaderValue;
use axum::Router;
use sea_orm::DatabaseConnection;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::config::Config;

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    // No configured origins means an open API
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let mut origins = Vec::new();
    for origin in allowed_origins {
        match origin.parse::<HeaderValue>() {
            Ok(v) => origins.push(v),
            Err(e) => tracing::error!("Failed to parse CORS origin '{}': {}", origin, e),
        }
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the API router with database connection
pub fn build_router(db: DatabaseConnection, allowed_origins: &[String]) -> Router {
    let api_router = api::api_router(db);

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until the process is stopped.
pub async fn serve(db: DatabaseConnection, config: &Config) -> Result<(), String> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = build_router(db, &config.cors_allowed_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("HTTP server error: {}", e))
}
