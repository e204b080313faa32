//! Lending ledger and borrow/return orchestration
//!
//! Borrow and return are the only paths that flip an exemplar between
//! Available and OnLoan. Each performs its two writes (ledger row +
//! exemplar status) inside a single transaction; the status flip on borrow
//! is a conditional update so that two concurrent borrowers of the same
//! copy cannot both succeed.

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{check_lendable, AuditContext, DomainError};
use crate::models::book::Entity as Book;
use crate::models::exemplar::{self, Entity as Exemplar, ExemplarStatus};
use crate::models::lending::{self, Entity as Lending, LendingStatus};
use crate::models::book;

use super::{exemplar_service, now_stamp, DATE_FMT};

#[derive(Debug)]
pub struct BorrowInput {
    pub book_id: i32,
    pub due_date: String,
    pub note: Option<String>,
    /// Explicit copy request; when absent the registry picks the available
    /// exemplar with the lowest accession number.
    pub exemplar_id: Option<i32>,
}

/// The created lending together with the chosen copy's accession number.
#[derive(Debug, Serialize)]
pub struct BorrowOutcome {
    pub lending: lending::Model,
    pub exemplar_id: i32,
    pub accession_number: String,
}

/// Normalize a caller-supplied due date to the storage format. Accepts a
/// full timestamp or a bare date (which becomes end of that day).
fn parse_due_date(raw: &str) -> Result<String, DomainError> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DATE_FMT) {
        return Ok(dt.format(DATE_FMT).to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(format!("{} 23:59:59", date.format("%Y-%m-%d")));
    }
    Err(DomainError::BadRequest(
        "due date must be YYYY-MM-DD or YYYY-MM-DD HH:MM:SS".to_string(),
    ))
}

/// Borrow a book for a member.
///
/// Validates eligibility and copy availability before any write, then
/// commits the ledger insert and the Available -> OnLoan flip as one
/// transaction. Losing the flip race aborts the whole operation with
/// Conflict; the caller may retry.
pub async fn borrow(
    db: &DatabaseConnection,
    member_id: i32,
    input: BorrowInput,
    audit: &AuditContext,
) -> Result<BorrowOutcome, DomainError> {
    let due_date = parse_due_date(&input.due_date)?;

    let book = Book::find_by_id(input.book_id).one(db).await?;
    let book = check_lendable(book.as_ref())?;

    let selected = match input.exemplar_id {
        Some(exemplar_id) => {
            let exemplar = exemplar_service::find_by_id(db, exemplar_id)
                .await?
                .ok_or(DomainError::NotFound)?;
            if exemplar.status != ExemplarStatus::Available {
                return Err(DomainError::InvalidState(
                    "exemplar is not available for lending".to_string(),
                ));
            }
            if exemplar.book_id != book.id {
                return Err(DomainError::BadRequest(
                    "exemplar does not belong to the requested book".to_string(),
                ));
            }
            exemplar
        }
        None => exemplar_service::find_available(db, book.id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DomainError::InvalidState("no copies available for lending".to_string())
            })?,
    };

    let now = now_stamp();
    let txn = db.begin().await?;

    let new_lending = lending::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        member_id: Set(member_id),
        book_id: Set(book.id),
        exemplar_id: Set(Some(selected.id)),
        loan_date: Set(now.clone()),
        due_date: Set(due_date),
        return_date: Set(None),
        status: Set(LendingStatus::Active),
        note: Set(input.note),
        is_deleted: Set(false),
        created_by: Set(audit.actor.clone()),
        updated_by: Set(audit.actor.clone()),
        created_at: Set(now.clone()),
        updated_at: Set(now.clone()),
    };
    let saved = new_lending.insert(&txn).await?;

    // Conditional flip: only succeeds if the copy is still Available. Zero
    // rows affected means a concurrent borrow won; roll everything back.
    let flipped = Exemplar::update_many()
        .col_expr(exemplar::Column::Status, Expr::value(ExemplarStatus::OnLoan))
        .col_expr(
            exemplar::Column::UpdatedBy,
            Expr::value(audit.actor.clone()),
        )
        .col_expr(exemplar::Column::UpdatedAt, Expr::value(now.clone()))
        .filter(exemplar::Column::Id.eq(selected.id))
        .filter(exemplar::Column::Status.eq(ExemplarStatus::Available))
        .exec(&txn)
        .await?;

    if flipped.rows_affected == 0 {
        txn.rollback().await?;
        tracing::info!(
            exemplar_id = selected.id,
            "borrow lost the race for this exemplar"
        );
        return Err(DomainError::Conflict(
            "exemplar was just borrowed by someone else".to_string(),
        ));
    }

    txn.commit().await?;
    tracing::info!(
        lending_id = %saved.id,
        book_id = book.id,
        exemplar_id = selected.id,
        member_id,
        "lending created"
    );

    Ok(BorrowOutcome {
        lending: saved,
        exemplar_id: selected.id,
        accession_number: selected.accession_number,
    })
}

/// Return a lending.
///
/// The ledger write and the exemplar's OnLoan -> Available flip commit
/// together. Loans recorded at book level only (no exemplar reference)
/// get the ledger write alone.
pub async fn return_lending(
    db: &DatabaseConnection,
    lending_id: &str,
    audit: &AuditContext,
) -> Result<lending::Model, DomainError> {
    let existing = find_by_id(db, lending_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if existing.status == LendingStatus::Returned {
        return Err(DomainError::InvalidState(
            "lending is already returned".to_string(),
        ));
    }

    let now = now_stamp();
    let txn = db.begin().await?;

    // Guard on status so a concurrent return of the same lending cannot
    // apply twice.
    let updated = Lending::update_many()
        .col_expr(
            lending::Column::Status,
            Expr::value(LendingStatus::Returned),
        )
        .col_expr(lending::Column::ReturnDate, Expr::value(Some(now.clone())))
        .col_expr(lending::Column::UpdatedBy, Expr::value(audit.actor.clone()))
        .col_expr(lending::Column::UpdatedAt, Expr::value(now.clone()))
        .filter(lending::Column::Id.eq(lending_id))
        .filter(lending::Column::Status.eq(LendingStatus::Active))
        .exec(&txn)
        .await?;

    if updated.rows_affected == 0 {
        txn.rollback().await?;
        return Err(DomainError::InvalidState(
            "lending is already returned".to_string(),
        ));
    }

    if let Some(exemplar_id) = existing.exemplar_id {
        // Only flip copies that are still OnLoan. A copy withdrawn by the
        // administrative override (Damaged/Lost) keeps that status; the
        // ledger row closes regardless.
        Exemplar::update_many()
            .col_expr(
                exemplar::Column::Status,
                Expr::value(ExemplarStatus::Available),
            )
            .col_expr(
                exemplar::Column::UpdatedBy,
                Expr::value(audit.actor.clone()),
            )
            .col_expr(exemplar::Column::UpdatedAt, Expr::value(now.clone()))
            .filter(exemplar::Column::Id.eq(exemplar_id))
            .filter(exemplar::Column::Status.eq(ExemplarStatus::OnLoan))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    tracing::info!(lending_id = %lending_id, "lending returned");

    find_by_id(db, lending_id)
        .await?
        .ok_or(DomainError::NotFound)
}

pub async fn find_by_id(
    db: &DatabaseConnection,
    id: &str,
) -> Result<Option<lending::Model>, DomainError> {
    let lending = Lending::find_by_id(id)
        .filter(lending::Column::IsDeleted.eq(false))
        .one(db)
        .await?;
    Ok(lending)
}

pub async fn find_by_member(
    db: &DatabaseConnection,
    member_id: i32,
) -> Result<Vec<lending::Model>, DomainError> {
    let lendings = Lending::find()
        .filter(lending::Column::MemberId.eq(member_id))
        .filter(lending::Column::IsDeleted.eq(false))
        .order_by_desc(lending::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(lendings)
}

pub async fn list(
    db: &DatabaseConnection,
    page: u64,
    limit: u64,
) -> Result<(Vec<lending::Model>, u64), DomainError> {
    let total = Lending::find()
        .filter(lending::Column::IsDeleted.eq(false))
        .count(db)
        .await?;

    let offset = page.saturating_sub(1) * limit;
    let lendings = Lending::find()
        .filter(lending::Column::IsDeleted.eq(false))
        .order_by_desc(lending::Column::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    Ok((lendings, total))
}

/// Open lendings past their due date, most overdue first. Computed from
/// the current clock at query time; there is no background sweep marking
/// rows overdue.
pub async fn find_overdue(db: &DatabaseConnection) -> Result<Vec<lending::Model>, DomainError> {
    let now = now_stamp();
    let lendings = Lending::find()
        .filter(lending::Column::DueDate.lt(now))
        .filter(lending::Column::ReturnDate.is_null())
        .filter(lending::Column::IsDeleted.eq(false))
        .order_by_asc(lending::Column::DueDate)
        .all(db)
        .await?;
    Ok(lendings)
}

/// Titles for a batch of lendings, for list responses.
pub async fn book_titles(
    db: &DatabaseConnection,
    lendings: &[lending::Model],
) -> Result<std::collections::HashMap<i32, String>, DomainError> {
    let book_ids: Vec<i32> = lendings.iter().map(|l| l.book_id).collect();
    let mut titles = std::collections::HashMap::new();
    if !book_ids.is_empty() {
        let books = Book::find()
            .filter(book::Column::Id.is_in(book_ids))
            .all(db)
            .await?;
        for b in books {
            titles.insert(b.id, b.title);
        }
    }
    Ok(titles)
}
