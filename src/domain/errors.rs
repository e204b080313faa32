//! Domain error types
//!
//! These errors are framework-agnostic and represent business-level
//! failures. The HTTP mapping lives in the api layer.

use std::fmt;

#[derive(Debug)]
pub enum DomainError {
    /// Resource missing or soft-deleted
    NotFound,
    /// Missing or malformed input
    BadRequest(String),
    /// Domain rule violation: ineligible book, exemplar unavailable,
    /// already returned, no copies left
    InvalidState(String),
    /// Operation not allowed for this resource (e.g. reference-only book)
    Forbidden(String),
    /// Caller identity missing or invalid
    Unauthenticated,
    /// Duplicate accession number, or a borrow race lost to a concurrent
    /// caller. Retryable from the caller's side.
    Conflict(String),
    /// Database/persistence error
    Database(String),
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::NotFound => write!(f, "Resource not found"),
            DomainError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            DomainError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            DomainError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            DomainError::Unauthenticated => write!(f, "Authentication required"),
            DomainError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            DomainError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}

// Conversion from SeaORM errors (used in the service layer). A violated
// UNIQUE index surfaces as Conflict so that races slipping past the
// pre-checks still map to a retryable class instead of a server fault.
impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        let msg = e.to_string();
        if msg.contains("UNIQUE constraint failed") {
            DomainError::Conflict("unique constraint violated".to_string())
        } else {
            DomainError::Database(msg)
        }
    }
}
