//! Lending eligibility rules for books
//!
//! Pure functions of book state, no side effects. Rules are evaluated in
//! order and the first failure wins, so a soft-deleted reference-only book
//! reports NotFound, not Forbidden.

use crate::models::book;
use crate::models::book::BookStatus;

use super::DomainError;

/// Decide whether a book may be lent at all.
///
/// Returns the book on success so callers can keep working with the
/// validated record.
pub fn check_lendable(book: Option<&book::Model>) -> Result<&book::Model, DomainError> {
    let book = match book {
        Some(b) if !b.is_deleted => b,
        _ => return Err(DomainError::NotFound),
    };

    if !book.circulating {
        return Err(DomainError::Forbidden(
            "book is reference-only and cannot be borrowed".to_string(),
        ));
    }

    if book.status == BookStatus::Damaged {
        return Err(DomainError::InvalidState(
            "book is damaged and cannot be borrowed".to_string(),
        ));
    }

    Ok(book)
}
