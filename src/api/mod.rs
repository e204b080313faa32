pub mod auth;
pub mod book;
pub mod exemplar;
pub mod health;
pub mod lending;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;

use crate::domain::DomainError;

pub fn api_router(db: DatabaseConnection) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        // Books (thin catalog surface)
        .route("/books", get(book::list_books).post(book::create_book))
        .route("/books/:id", get(book::get_book).delete(book::delete_book))
        .route("/books/:id/exemplars", get(exemplar::list_for_book))
        .route(
            "/books/:id/exemplars/available",
            get(exemplar::list_available_for_book),
        )
        // Exemplars
        .route(
            "/exemplars",
            get(exemplar::list_exemplars).post(exemplar::create_exemplar),
        )
        .route("/exemplars/stats", get(exemplar::stats))
        .route(
            "/exemplars/accession/:accession_number",
            get(exemplar::get_by_accession),
        )
        .route(
            "/exemplars/:id",
            get(exemplar::get_exemplar)
                .put(exemplar::update_exemplar)
                .delete(exemplar::delete_exemplar),
        )
        .route("/exemplars/:id/status", put(exemplar::set_status))
        // Lendings
        .route(
            "/lendings",
            get(lending::list_lendings).post(lending::borrow),
        )
        .route("/lendings/overdue", get(lending::list_overdue))
        .route("/lendings/mine", get(lending::my_lendings))
        .route("/lendings/:id", get(lending::get_lending))
        .route("/lendings/:id/return", put(lending::return_lending))
        .with_state(db)
}

// HTTP mapping of the domain error taxonomy. Persistence failures are
// logged with detail and reported as an opaque 500.
impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DomainError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            DomainError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DomainError::InvalidState(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DomainError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            DomainError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            DomainError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            DomainError::Database(msg) => {
                tracing::error!(error = %msg, "persistence failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
